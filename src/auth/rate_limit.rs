//! Fixed-window rate limiting for login throttling.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub trait RateLimiter: Send + Sync {
    /// Register an attempt under `key` and report whether it is allowed.
    ///
    /// The counter check happens before the increment, so the attempt that
    /// reaches exactly `max_attempts` is the last one allowed and the next
    /// one is refused.
    fn allow(&self, key: &str, max_attempts: u32, window: Duration) -> bool;
}

/// Limiter that never refuses; used to disable throttling in tests.
#[derive(Clone, Copy, Debug)]
pub struct NoopLimiter;

impl RateLimiter for NoopLimiter {
    fn allow(&self, _key: &str, _max_attempts: u32, _window: Duration) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
    window: Duration,
}

/// Keyed fixed-window counter.
///
/// A window resets whenever `now - start > window`; within a live window the
/// count grows monotonically. Expired windows are purged lazily on access.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allow_at(&self, now: Instant, key: &str, max_attempts: u32, window: Duration) -> bool {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        windows.retain(|_, entry| now.duration_since(entry.start) <= entry.window);

        match windows.get_mut(key) {
            None => {
                windows.insert(
                    key.to_string(),
                    Window {
                        start: now,
                        count: 1,
                        window,
                    },
                );
                true
            }
            Some(entry) => {
                let before = entry.count;
                entry.count = entry.count.saturating_add(1);
                before < max_attempts
            }
        }
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn allow(&self, key: &str, max_attempts: u32, window: Duration) -> bool {
        self.allow_at(Instant::now(), key, max_attempts, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn allows_up_to_limit_then_refuses() {
        let limiter = FixedWindowLimiter::new();
        let now = Instant::now();

        let results: Vec<bool> = (0..6)
            .map(|_| limiter.allow_at(now, "login:student:k", 5, WINDOW))
            .collect();

        assert_eq!(results, vec![true, true, true, true, true, false]);
    }

    #[test]
    fn refusal_persists_within_window() {
        let limiter = FixedWindowLimiter::new();
        let now = Instant::now();

        for _ in 0..6 {
            limiter.allow_at(now, "k", 5, WINDOW);
        }
        assert!(!limiter.allow_at(now + Duration::from_secs(299), "k", 5, WINDOW));
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = FixedWindowLimiter::new();
        let now = Instant::now();

        for _ in 0..6 {
            limiter.allow_at(now, "k", 5, WINDOW);
        }
        assert!(limiter.allow_at(now + Duration::from_secs(301), "k", 5, WINDOW));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = FixedWindowLimiter::new();
        let now = Instant::now();

        assert!(limiter.allow_at(now, "a", 1, WINDOW));
        assert!(!limiter.allow_at(now, "a", 1, WINDOW));
        assert!(limiter.allow_at(now, "b", 1, WINDOW));
    }

    #[test]
    fn expired_windows_are_purged() {
        let limiter = FixedWindowLimiter::new();
        let now = Instant::now();

        limiter.allow_at(now, "old", 5, WINDOW);
        limiter.allow_at(now + Duration::from_secs(301), "fresh", 5, WINDOW);

        let windows = limiter.windows.lock().expect("lock");
        assert!(!windows.contains_key("old"));
        assert!(windows.contains_key("fresh"));
    }

    #[test]
    fn noop_limiter_always_allows() {
        let limiter = NoopLimiter;
        for _ in 0..100 {
            assert!(limiter.allow("k", 1, WINDOW));
        }
    }
}
