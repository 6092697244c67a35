//! The Rate Limiter (spec §4.1): token-bucket style pacing in front of the
//! MediaWiki API client. `wait()` blocks the caller until the next outbound
//! request is permitted, enforcing a minimum interval of `1/R` between
//! consecutive releases for a configured rate `R` (requests per second).
//!
//! Thread-safe: concurrent `wait()` callers serialize on a single mutex, so
//! at most one release happens per interval regardless of how many threads
//! are contending.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Paces outbound requests to at most `requests_per_second`.
pub struct RateLimiter {
    min_interval: Duration,
    last_release: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Construct a limiter that permits at most `requests_per_second`
    /// releases per second. A rate of zero (or non-positive) is treated as
    /// unlimited — `wait()` never blocks.
    pub fn new(requests_per_second: f64) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self {
            min_interval,
            last_release: Mutex::new(None),
        }
    }

    /// Construct a limiter with an explicit minimum interval between
    /// releases, bypassing the requests-per-second conversion.
    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_release: Mutex::new(None),
        }
    }

    /// Block the calling thread until the next request is permitted.
    ///
    /// Holds the internal mutex for the full wait so concurrent callers
    /// serialize: at most one release happens per `min_interval`, and each
    /// waiting thread observes a `last_release` that already accounts for
    /// every caller ahead of it.
    pub fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last_release = self.last_release.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if let Some(previous) = *last_release {
            let elapsed = now.duration_since(previous);
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last_release = Some(Instant::now());
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unlimited_rate_never_blocks() {
        let limiter = RateLimiter::new(0.0);
        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn enforces_minimum_interval_between_releases() {
        let limiter = RateLimiter::new(20.0); // 50ms interval
        let start = Instant::now();
        limiter.wait();
        limiter.wait();
        limiter.wait();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(90), "elapsed={elapsed:?}");
    }

    #[test]
    fn concurrent_waiters_serialize_to_one_release_per_interval() {
        let limiter = Arc::new(RateLimiter::new(50.0)); // 20ms interval
        let start = Instant::now();
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || limiter.wait())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // 5 releases at 20ms apart => at least 80ms total, regardless of
        // how the threads interleaved.
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[test]
    fn with_min_interval_constructs_directly() {
        let limiter = RateLimiter::with_min_interval(Duration::from_millis(10));
        assert_eq!(limiter.min_interval(), Duration::from_millis(10));
    }
}
