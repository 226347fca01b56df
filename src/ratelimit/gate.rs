//! Caller-facing admission decisions and rejection payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::backend::AdmissionControl;

/// Error code carried by every rejection body.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

/// Outcome of passing a request through the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The request may be forwarded
    Admitted,
    /// The request must be turned away
    Rejected(Rejection),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }
}

/// Details handed back to a rejected caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Estimated wait before retrying
    pub retry_after: Duration,
    /// Wall-clock time of the rejection, for the response body
    pub rejected_at: DateTime<Utc>,
}

impl Rejection {
    /// HTTP status for a rejected request (Too Many Requests).
    pub const STATUS_CODE: u16 = 429;

    pub fn retry_after_secs(&self) -> f64 {
        self.retry_after.as_secs_f64()
    }

    /// Value for a `Retry-After` header.
    ///
    /// Whole seconds, rounded up so a client honouring it never retries
    /// before the estimate.
    pub fn retry_after_header(&self) -> String {
        let mut secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs += 1;
        }
        secs.to_string()
    }

    /// Body to send with the rejection.
    pub fn error_body(&self) -> ErrorResponse {
        ErrorResponse {
            message: "Too many requests. Please try again later.".to_string(),
            error_code: RATE_LIMIT_EXCEEDED.to_string(),
            status: ResponseStatus::Error,
            data: RejectionData {
                retry_after_seconds: self.retry_after_secs(),
                timestamp: self.rejected_at.timestamp_millis() as f64 / 1000.0,
            },
        }
    }
}

/// Status marker of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// JSON body returned to rejected callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    pub error_code: String,
    pub status: ResponseStatus,
    pub data: RejectionData,
}

/// Retry hint carried inside [`ErrorResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionData {
    /// Seconds until admission is expected, possibly fractional
    pub retry_after_seconds: f64,
    /// Unix time of the rejection in seconds
    pub timestamp: f64,
}

/// Gate placed in front of request handling.
///
/// Wraps a shared limiter and turns its answers into [`Decision`]s.
pub struct AdmissionGate<B: AdmissionControl + ?Sized> {
    limiter: Arc<B>,
}

impl<B: AdmissionControl + ?Sized> AdmissionGate<B> {
    /// Create a new gate around the given limiter.
    pub fn new(limiter: Arc<B>) -> Self {
        Self { limiter }
    }

    /// Check a request arriving now.
    pub fn check(&self) -> Decision {
        self.check_at(Instant::now())
    }

    /// Check a request arriving at `now`.
    pub fn check_at(&self, now: Instant) -> Decision {
        if self.limiter.allow_at(now) {
            return Decision::Admitted;
        }

        let retry_after = self.limiter.wait_time_at(now);
        debug!(
            retry_after_secs = retry_after.as_secs_f64(),
            "Rejecting request"
        );

        Decision::Rejected(Rejection {
            retry_after,
            rejected_at: Utc::now(),
        })
    }

    /// Get the limiter behind this gate.
    pub fn limiter(&self) -> &Arc<B> {
        &self.limiter
    }
}

impl<B: AdmissionControl + ?Sized> Clone for AdmissionGate<B> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
        }
    }
}
