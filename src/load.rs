//! Concurrent load driver.
//!
//! Pushes requests from many tasks through one shared [`AdmissionGate`],
//! the way request handlers of a multiplexed server would. Clients can
//! optionally honour the retry hint of a rejection and try again.

use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::ratelimit::{AdmissionControl, AdmissionGate, Decision};

/// Shortest pause between retries, for hints that round down to zero.
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Shape of a load run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    /// Number of concurrent clients
    pub clients: usize,
    /// Requests each client issues
    pub requests_per_client: usize,
    /// Sleep for the retry hint after a rejection and try again
    pub honor_retry_after: bool,
    /// Retries allowed per request when honouring hints
    pub max_retries: u32,
}

impl Default for LoadPlan {
    fn default() -> Self {
        Self {
            clients: 4,
            requests_per_client: 10,
            honor_retry_after: false,
            max_retries: 3,
        }
    }
}

/// Totals collected by a load run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Requests that got through
    pub admitted: u64,
    /// Requests given up on
    pub rejected: u64,
    /// Retries issued after a rejection
    pub retries: u64,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.admitted += other.admitted;
        self.rejected += other.rejected;
        self.retries += other.retries;
    }
}

/// Current time from the tokio clock.
///
/// Follows paused or advanced time in tests.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Run the plan to completion and return the combined report.
pub async fn run<B>(gate: AdmissionGate<B>, plan: LoadPlan) -> LoadReport
where
    B: AdmissionControl + ?Sized + 'static,
{
    info!(
        clients = plan.clients,
        requests_per_client = plan.requests_per_client,
        honor_retry_after = plan.honor_retry_after,
        "Starting load run"
    );

    let mut tasks = JoinSet::new();
    for client in 0..plan.clients {
        let gate = gate.clone();
        let plan = plan.clone();
        tasks.spawn(async move { drive_client(client, &gate, &plan).await });
    }

    let mut report = LoadReport::default();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(client_report) => report.merge(client_report),
            Err(e) => warn!(error = %e, "Load client task failed"),
        }
    }

    info!(
        admitted = report.admitted,
        rejected = report.rejected,
        retries = report.retries,
        "Load run finished"
    );
    report
}

async fn drive_client<B>(client: usize, gate: &AdmissionGate<B>, plan: &LoadPlan) -> LoadReport
where
    B: AdmissionControl + ?Sized,
{
    let mut report = LoadReport::default();

    for _ in 0..plan.requests_per_client {
        let mut attempts = 0;
        loop {
            match gate.check_at(now()) {
                Decision::Admitted => {
                    report.admitted += 1;
                    break;
                }
                Decision::Rejected(rejection) => {
                    if !plan.honor_retry_after || attempts >= plan.max_retries {
                        report.rejected += 1;
                        break;
                    }

                    attempts += 1;
                    report.retries += 1;
                    debug!(
                        client,
                        attempt = attempts,
                        retry_after_secs = rejection.retry_after_secs(),
                        "Backing off before retry"
                    );
                    tokio::time::sleep(rejection.retry_after.max(MIN_BACKOFF)).await;
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{SlidingWindowLimiter, WindowSettings};
    use std::sync::Arc;

    fn gate(threshold: u64) -> AdmissionGate<SlidingWindowLimiter> {
        let settings = WindowSettings::new(Duration::from_secs(1), Duration::from_secs(4), threshold);
        AdmissionGate::new(Arc::new(
            SlidingWindowLimiter::starting_at(settings, now()).unwrap(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_without_retries_admits_quota() {
        let plan = LoadPlan {
            clients: 4,
            requests_per_client: 3,
            honor_retry_after: false,
            max_retries: 0,
        };

        let report = run(gate(4), plan).await;

        assert_eq!(report.admitted, 4);
        assert_eq!(report.rejected, 8);
        assert_eq!(report.retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_honoring_retry_after_completes_all_requests() {
        let plan = LoadPlan {
            clients: 4,
            requests_per_client: 3,
            honor_retry_after: true,
            max_retries: 50,
        };

        let report = run(gate(4), plan).await;

        assert_eq!(report.admitted, 12);
        assert_eq!(report.rejected, 0);
        assert!(report.retries > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_respected() {
        let plan = LoadPlan {
            clients: 2,
            requests_per_client: 2,
            honor_retry_after: true,
            max_retries: 1,
        };

        let gate = gate(1);
        let report = run(gate.clone(), plan).await;

        assert_eq!(report.admitted + report.rejected, 4);
        assert!(report.admitted >= 1);
        assert!(report.retries <= 4);
        assert!(gate.limiter().snapshot_at(now()).total <= 1);
    }
}
