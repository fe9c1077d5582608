//! tests/network_rate_limit_tests.rs
//!
//! Tests for `src/network/rate_limit.rs`
//! - basic allow/deny behaviour per key
//! - keys are limited independently
//! - cloned limiters share state

use headless_wallet::network::rate_limit::RateLimiter;
use std::time::Duration;

#[test]
fn test_rate_limiter_new_and_initial_allow() {
    let limiter = RateLimiter::new(10, Duration::from_secs(1));
    assert!(limiter.allow(&"sign"), "First request should be allowed");
}

#[test]
fn test_rate_limiter_exceeds_limit() {
    // One operation per minute: the second call inside the window must fail.
    let limiter = RateLimiter::new(1, Duration::from_secs(60));
    assert!(limiter.allow(&"sign"), "The first request should be allowed");
    assert!(!limiter.allow(&"sign"), "The second request should be denied as it exceeds the rate limit");
}

#[test]
fn test_rate_limiter_burst_matches_configured_maximum() {
    let limiter = RateLimiter::new(5, Duration::from_secs(60));
    let allowed = (0..10).filter(|_| limiter.allow(&"connect")).count();
    assert_eq!(allowed, 5, "Exactly the configured number of operations fits in one window");
}

#[test]
fn test_rate_limiter_keys_are_independent() {
    let limiter = RateLimiter::new(1, Duration::from_secs(60));
    assert!(limiter.allow(&"sign"));
    assert!(!limiter.allow(&"sign"));
    assert!(limiter.allow(&"network"), "A different operation class has its own quota");
}

#[test]
fn test_rate_limiter_clone_shares_state() {
    let limiter1 = RateLimiter::new(1, Duration::from_secs(60));
    let limiter2 = limiter1.clone();
    assert!(limiter1.allow(&1u8), "First request on limiter1 should be allowed");
    assert!(!limiter2.allow(&1u8), "Request on cloned limiter2 should be denied as the quota is used");
}

#[test]
fn test_rate_limiter_full_window_stays_closed_until_it_slides() {
    let limiter = RateLimiter::new(3, Duration::from_millis(300));
    let allowed = (0..3).filter(|_| limiter.allow(&"sign")).count();
    assert_eq!(allowed, 3);

    std::thread::sleep(Duration::from_millis(150));
    assert!(!limiter.allow(&"sign"), "Half a window later the quota must still be spent");

    std::thread::sleep(Duration::from_millis(200));
    assert!(limiter.allow(&"sign"), "Once the window has slid past the burst, calls resume");
}
