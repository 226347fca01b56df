//! Admission control trait for abstracting limiter implementations.

use std::time::{Duration, Instant};

/// Trait for admission control implementations.
///
/// This trait lets the [`AdmissionGate`](super::AdmissionGate) and the load
/// driver work against any limiter that can answer "may this call proceed"
/// and "how long until one could".
pub trait AdmissionControl: Send + Sync {
    /// Decide whether a request arriving at `now` may proceed, counting it
    /// if so.
    fn allow_at(&self, now: Instant) -> bool;

    /// Estimate how long after `now` a request would be admitted.
    ///
    /// Best effort: concurrent admissions can invalidate the estimate.
    fn wait_time_at(&self, now: Instant) -> Duration;

    /// Decide admission against the monotonic clock.
    fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Estimate the wait against the monotonic clock.
    fn wait_time(&self) -> Duration {
        self.wait_time_at(Instant::now())
    }
}
