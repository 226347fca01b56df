//! Bucketed sliding-window state.
//!
//! A [`RateWindow`] splits a window into equal buckets arranged in a ring.
//! The cursor marks the bucket that receives new admissions; advancing it
//! clears the bucket it lands on, which is always the oldest slot of the
//! window. All time arithmetic is done against caller-supplied [`Instant`]s.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::error::ConfigurationError;

/// Upper bound on buckets per window; every operation walks the whole ring.
pub const MAX_BUCKETS: usize = 10_000;

/// Durations and quota that shape a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    /// Time span covered by one bucket
    pub bucket_duration: Duration,
    /// Total span of the sliding window
    pub window_duration: Duration,
    /// Maximum admissions summed across the whole window
    pub max_threshold: u64,
}

impl WindowSettings {
    /// Create a new set of window settings.
    pub fn new(bucket_duration: Duration, window_duration: Duration, max_threshold: u64) -> Self {
        Self {
            bucket_duration,
            window_duration,
            max_threshold,
        }
    }

    /// Check the settings and return the number of buckets they describe.
    pub fn bucket_count(&self) -> Result<usize, ConfigurationError> {
        if self.bucket_duration.is_zero() {
            return Err(ConfigurationError::ZeroBucketDuration);
        }
        if self.window_duration.is_zero() {
            return Err(ConfigurationError::ZeroWindowDuration);
        }
        if self.window_duration.as_nanos() % self.bucket_duration.as_nanos() != 0 {
            return Err(ConfigurationError::UnevenWindow {
                window: self.window_duration,
                bucket: self.bucket_duration,
            });
        }
        if self.max_threshold == 0 {
            return Err(ConfigurationError::ZeroThreshold);
        }

        let count = self.window_duration.as_nanos() / self.bucket_duration.as_nanos();
        usize::try_from(count)
            .ok()
            .filter(|&n| n <= MAX_BUCKETS)
            .ok_or(ConfigurationError::TooManyBuckets {
                count,
                max: MAX_BUCKETS,
            })
    }
}

/// Point-in-time copy of the window counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSnapshot {
    /// Admission count per bucket, in ring order
    pub buckets: Vec<u64>,
    /// Index of the bucket representing "now"
    pub cursor: usize,
    /// Sum of all buckets
    pub total: u64,
    /// Configured quota
    pub max_threshold: u64,
}

impl WindowSnapshot {
    /// Admissions still available in the current window.
    pub fn remaining(&self) -> u64 {
        self.max_threshold.saturating_sub(self.total)
    }
}

/// Ring of admission counters covering one sliding window.
///
/// Not synchronized; see [`SlidingWindowLimiter`](super::SlidingWindowLimiter)
/// for the shared form.
#[derive(Debug, Clone)]
pub struct RateWindow {
    bucket_duration: Duration,
    window_duration: Duration,
    max_threshold: u64,
    buckets: Vec<u64>,
    cursor: usize,
    last_rotation: Instant,
}

impl RateWindow {
    /// Create an empty window whose first bucket starts at `now`.
    pub fn new(settings: &WindowSettings, now: Instant) -> Result<Self, ConfigurationError> {
        let bucket_count = settings.bucket_count()?;

        Ok(Self {
            bucket_duration: settings.bucket_duration,
            window_duration: settings.window_duration,
            max_threshold: settings.max_threshold,
            buckets: vec![0; bucket_count],
            cursor: 0,
            last_rotation: now,
        })
    }

    /// Advance the cursor past every bucket boundary crossed since the last
    /// rotation, clearing each bucket it lands on.
    ///
    /// Returns the number of buckets advanced. `last_rotation` only moves
    /// when at least one bucket was advanced, so partial progress toward
    /// the next boundary carries over between calls. Timestamps older than
    /// the last rotation count as no elapsed time.
    pub fn rotate(&mut self, now: Instant) -> usize {
        let elapsed = now.saturating_duration_since(self.last_rotation);
        let whole = elapsed.as_nanos() / self.bucket_duration.as_nanos();
        let steps = whole.min(self.buckets.len() as u128) as usize;

        for _ in 0..steps {
            self.cursor = (self.cursor + 1) % self.buckets.len();
            self.buckets[self.cursor] = 0;
        }

        if steps > 0 {
            self.last_rotation = now;
        }

        steps
    }

    /// Rotate, then admit one request if the window is below its quota.
    ///
    /// A denied request is never counted.
    pub fn try_admit(&mut self, now: Instant) -> bool {
        self.rotate(now);
        self.admit()
    }

    /// Admit one request into the current bucket if the window is below its
    /// quota. Does not rotate; callers rotate first.
    pub fn admit(&mut self) -> bool {
        if self.total() >= self.max_threshold {
            return false;
        }

        self.buckets[self.cursor] += 1;
        true
    }

    /// Copy of this window rotated forward to `now`.
    pub fn projected(&self, now: Instant) -> Self {
        let mut view = self.clone();
        view.rotate(now);
        view
    }

    /// Time until a request would be admitted, assuming no other admissions
    /// happen meanwhile.
    ///
    /// Zero when the window has room. Otherwise one bucket duration for
    /// every bucket, oldest first, that has to rotate out before one more
    /// request fits. Does not modify the window.
    pub fn wait_time(&self, now: Instant) -> Duration {
        self.projected(now).aging_wait().unwrap_or(Duration::ZERO)
    }

    /// Like [`wait_time`](Self::wait_time), minus the time already spent in
    /// the current bucket: the instant the needed buckets actually rotate
    /// out, as seen from `now`.
    pub fn until_admissible(&self, now: Instant) -> Duration {
        let view = self.projected(now);
        match view.aging_wait() {
            Some(waited) => waited.saturating_sub(view.elapsed_in_bucket(now)),
            None => Duration::ZERO,
        }
    }

    /// Whole buckets to age out before a request fits, `None` when it fits now.
    fn aging_wait(&self) -> Option<Duration> {
        let total = self.total();
        if total < self.max_threshold {
            return None;
        }

        let mut excess = total - self.max_threshold + 1;
        let mut waited = Duration::ZERO;
        let count = self.buckets.len();

        // oldest bucket sits just after the cursor
        for step in 1..=count {
            waited += self.bucket_duration;
            excess = excess.saturating_sub(self.buckets[(self.cursor + step) % count]);
            if excess == 0 {
                break;
            }
        }

        Some(waited)
    }

    /// Time until the next bucket boundary, as seen from `now`.
    pub fn until_next_rotation(&self, now: Instant) -> Duration {
        let view = self.projected(now);
        view.bucket_duration - view.elapsed_in_bucket(now)
    }

    fn elapsed_in_bucket(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_rotation);
        Duration::from_nanos((elapsed.as_nanos() % self.bucket_duration.as_nanos()) as u64)
    }

    /// Sum of admissions across all buckets.
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// Number of buckets in the ring.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Index of the current bucket.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn bucket_duration(&self) -> Duration {
        self.bucket_duration
    }

    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }

    pub fn max_threshold(&self) -> u64 {
        self.max_threshold
    }

    /// Copy the counters out.
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            buckets: self.buckets.clone(),
            cursor: self.cursor,
            total: self.total(),
            max_threshold: self.max_threshold,
        }
    }
}
