//! src/network/rate_limit.rs
//!
//! Per-operation sliding-window rate limiting.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Keyed limiter allowing `operations` per `window` for each key independently.
///
/// Keeps the admission times of the last window per key, so any interval of length
/// `window` holds at most `operations` admitted calls.
pub struct RateLimiter<K: Hash + Eq + Clone> {
    log: Arc<Mutex<HashMap<K, VecDeque<Instant>>>>,
    max: usize,
    window: Duration,
}

impl<K: Hash + Eq + Clone> Clone for RateLimiter<K> {
    fn clone(&self) -> Self {
        Self { log: Arc::clone(&self.log), max: self.max, window: self.window }
    }
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    /// Zero operations or a zero window are clamped to one.
    pub fn new(operations: u32, window: Duration) -> Self {
        Self {
            log: Arc::new(Mutex::new(HashMap::new())),
            max: operations.max(1) as usize,
            window: window.max(Duration::from_millis(1)),
        }
    }

    /// Records one call for `key`; `false` when the window is already full.
    pub fn allow(&self, key: &K) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &K, now: Instant) -> bool {
        let mut log = self.log.lock();
        let admitted = log.entry(key.clone()).or_default();
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
        if admitted.len() >= self.max {
            return false;
        }
        admitted.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_slides_from_oldest_admission() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.allow_at(&"sign", start));
        assert!(limiter.allow_at(&"sign", start + Duration::from_secs(6)));
        assert!(!limiter.allow_at(&"sign", start + Duration::from_secs(9)));
        // The first admission has left the window; the second has not.
        assert!(limiter.allow_at(&"sign", start + Duration::from_secs(10)));
        assert!(!limiter.allow_at(&"sign", start + Duration::from_secs(15)));
        assert!(limiter.allow_at(&"sign", start + Duration::from_secs(16)));
    }

    #[test]
    fn test_steady_calls_never_exceed_maximum_per_window() {
        let limiter = RateLimiter::new(10, Duration::from_secs(1));
        let start = Instant::now();
        let allowed = (0..198u64)
            .filter(|i| limiter.allow_at(&"sign", start + Duration::from_millis(5 * *i)))
            .count();
        assert_eq!(allowed, 10);
    }
}
