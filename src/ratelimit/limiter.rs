//! Shared sliding-window limiter.

use parking_lot::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::backend::AdmissionControl;
use super::window::{RateWindow, WindowSettings, WindowSnapshot};
use crate::error::ConfigurationError;

/// Sliding-window limiter enforcing one quota for the whole process.
///
/// Construct it once at startup and hand it out behind an `Arc`. Admission
/// holds the write lock across rotate, check and increment, so concurrent
/// callers can never both observe room for the last slot. Queries take the
/// read lock and work on a rotated copy.
///
/// Time comes from [`Instant`], which is monotonic; wall-clock adjustments
/// cannot rotate buckets early or stall them.
pub struct SlidingWindowLimiter {
    /// Settings the window was built from
    settings: WindowSettings,
    /// Counter ring
    window: RwLock<RateWindow>,
}

impl SlidingWindowLimiter {
    /// Create a limiter whose first bucket starts now.
    pub fn new(settings: WindowSettings) -> Result<Self, ConfigurationError> {
        Self::starting_at(settings, Instant::now())
    }

    /// Create a limiter whose first bucket starts at `start`.
    pub fn starting_at(settings: WindowSettings, start: Instant) -> Result<Self, ConfigurationError> {
        let window = RateWindow::new(&settings, start)?;

        info!(
            bucket_secs = settings.bucket_duration.as_secs_f64(),
            window_secs = settings.window_duration.as_secs_f64(),
            buckets = window.bucket_count(),
            max_threshold = settings.max_threshold,
            "Sliding window limiter initialized"
        );

        Ok(Self {
            settings,
            window: RwLock::new(window),
        })
    }

    /// Admit or deny a request arriving now.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Admit or deny a request arriving at `now`.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut window = self.window.write();
        let advanced = window.rotate(now);
        if advanced > 0 {
            trace!(advanced, cursor = window.cursor(), "Rotated buckets");
        }

        let admitted = window.admit();
        if admitted {
            debug!(
                cursor = window.cursor(),
                total = window.total(),
                max_threshold = window.max_threshold(),
                "Request allowed"
            );
        } else {
            warn!(
                total = window.total(),
                max_threshold = window.max_threshold(),
                "Rate limit exceeded"
            );
        }
        admitted
    }

    /// Estimated wait before a request would be admitted, from now.
    pub fn wait_time(&self) -> Duration {
        self.wait_time_at(Instant::now())
    }

    /// Estimated wait before a request would be admitted, from `now`.
    ///
    /// Zero when there is room. Does not modify the limiter.
    pub fn wait_time_at(&self, now: Instant) -> Duration {
        self.window.read().wait_time(now)
    }

    /// Time from `now` until the next bucket boundary.
    pub fn until_next_rotation_at(&self, now: Instant) -> Duration {
        self.window.read().until_next_rotation(now)
    }

    /// Counters as they would look at `now`, without rotating the limiter.
    pub fn snapshot_at(&self, now: Instant) -> WindowSnapshot {
        self.window.read().projected(now).snapshot()
    }

    /// Get the settings this limiter was built from.
    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }
}

impl AdmissionControl for SlidingWindowLimiter {
    fn allow_at(&self, now: Instant) -> bool {
        SlidingWindowLimiter::allow_at(self, now)
    }

    fn wait_time_at(&self, now: Instant) -> Duration {
        SlidingWindowLimiter::wait_time_at(self, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn settings(bucket: u64, window: u64, threshold: u64) -> WindowSettings {
        WindowSettings::new(
            Duration::from_secs(bucket),
            Duration::from_secs(window),
            threshold,
        )
    }

    #[test]
    fn test_limiter_rejects_invalid_settings() {
        assert_eq!(
            SlidingWindowLimiter::new(settings(5, 21, 4)).err(),
            Some(ConfigurationError::UnevenWindow {
                window: Duration::from_secs(21),
                bucket: Duration::from_secs(5),
            })
        );
        assert_eq!(
            SlidingWindowLimiter::new(settings(5, 20, 0)).err(),
            Some(ConfigurationError::ZeroThreshold)
        );
    }

    #[test]
    fn test_boundary_four_of_four() {
        let start = Instant::now();
        let limiter = SlidingWindowLimiter::starting_at(settings(5, 20, 4), start).unwrap();

        let results: Vec<bool> = (0..4).map(|_| limiter.allow_at(start)).collect();
        assert_eq!(results, vec![true, true, true, true]);
        assert!(!limiter.allow_at(start));
    }

    #[test]
    fn test_admissions_within_one_window_never_exceed_threshold() {
        let start = Instant::now();
        let limiter = SlidingWindowLimiter::starting_at(settings(5, 20, 7), start).unwrap();

        // one request every 250ms across 20s
        let admitted = (0..80)
            .filter(|i| limiter.allow_at(start + Duration::from_millis(250 * i)))
            .count();
        assert_eq!(admitted, 7);
    }

    #[test]
    fn test_wait_then_allow() {
        let start = Instant::now();
        let limiter = SlidingWindowLimiter::starting_at(settings(5, 20, 4), start).unwrap();
        for _ in 0..4 {
            assert!(limiter.allow_at(start));
        }

        let wait = limiter.wait_time_at(start);
        assert!(wait >= limiter.settings().bucket_duration);
        assert!(wait <= limiter.settings().window_duration);
        assert!(limiter.allow_at(start + wait));
    }

    #[test]
    fn test_queries_leave_state_alone() {
        let start = Instant::now();
        let limiter = SlidingWindowLimiter::starting_at(settings(5, 20, 4), start).unwrap();
        limiter.allow_at(start);

        let later = start + Duration::from_secs(30);
        assert_eq!(limiter.snapshot_at(later).total, 0);
        assert_eq!(limiter.wait_time_at(later), Duration::ZERO);
        assert_eq!(limiter.until_next_rotation_at(start), Duration::from_secs(5));

        // unrotated view still holds the admission
        assert_eq!(limiter.snapshot_at(start).total, 1);
    }

    #[test]
    fn test_full_window_aging() {
        let start = Instant::now();
        let limiter = SlidingWindowLimiter::starting_at(settings(5, 20, 4), start).unwrap();
        for i in 0..4 {
            limiter.allow_at(start + Duration::from_secs(i * 5));
        }

        let later = start + Duration::from_secs(15 + 20);
        assert!(limiter.allow_at(later));
        let snapshot = limiter.snapshot_at(later);
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.remaining(), 3);
    }

    #[test]
    fn test_concurrent_access() {
        // window long enough that no rotation happens during the test
        let limiter = Arc::new(SlidingWindowLimiter::new(settings(60, 600, 100)).unwrap());
        let mut handles = vec![];

        // Spawn 8 threads each trying the full quota
        for _ in 0..8 {
            let limiter_clone = Arc::clone(&limiter);
            let handle = std::thread::spawn(move || {
                let mut admitted = 0u64;
                for _ in 0..100 {
                    if limiter_clone.allow() {
                        admitted += 1;
                    }
                }
                admitted
            });
            handles.push(handle);
        }

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total, 100);
        assert!(limiter.wait_time() > Duration::ZERO);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_rejection_logged_at_warn() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let start = Instant::now();
            let limiter = SlidingWindowLimiter::starting_at(settings(5, 20, 1), start).unwrap();
            assert!(limiter.allow_at(start));
            assert!(!limiter.allow_at(start));
        });

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("Rate limit exceeded"));
        assert!(!output.contains("Request allowed"));
    }

    #[test]
    fn test_rotation_happens_once_per_admission() {
        let start = Instant::now();
        let limiter = SlidingWindowLimiter::starting_at(settings(5, 20, 4), start).unwrap();
        limiter.allow_at(start);

        assert!(limiter.allow_at(start + Duration::from_secs(7)));
        let snapshot = limiter.snapshot_at(start + Duration::from_secs(7));
        assert_eq!(snapshot.cursor, 1);
        assert_eq!(snapshot.buckets, vec![1, 1, 0, 0]);
        // boundary now counts from the 7s rotation
        assert_eq!(
            limiter.until_next_rotation_at(start + Duration::from_secs(10)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_trait_object_dispatch() {
        let start = Instant::now();
        let limiter: Arc<dyn AdmissionControl> =
            Arc::new(SlidingWindowLimiter::starting_at(settings(1, 2, 1), start).unwrap());

        assert!(limiter.allow_at(start));
        assert!(!limiter.allow_at(start));
        assert_eq!(limiter.wait_time_at(start), Duration::from_secs(2));
    }
}
