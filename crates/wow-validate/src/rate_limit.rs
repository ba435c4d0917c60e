//! Fixed-window rate limiter (Section 4.6 of the design).
//!
//! Keyed generically by `&str` — the pipeline decides whether the key is a
//! `client_id` or a `remote_ip` (Section 9 of the design flags the spec's
//! client_id-only keying as a bug-smell and asks for both to be supported).

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Window length for the fixed-window counter.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Maximum requests accepted within one window.
pub const MAX_REQUESTS: u32 = 60;

struct WindowEntry {
    count: u32,
    window_start: Instant,
    last_seen: Instant,
}

/// A `dashmap`-backed fixed-window rate limiter with a background sweep
/// for idle entries (Section 5: "background sweep evicts entries idle >
/// 2 × window").
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    table: DashMap<String, WindowEntry>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(WINDOW, MAX_REQUESTS)
    }

    pub fn with_limits(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            table: DashMap::new(),
        }
    }

    /// Record one request for `key`; returns `true` if it is within the
    /// window's budget, `false` if the window has overflowed.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.table.entry(key.to_string()).or_insert_with(|| WindowEntry {
            count: 0,
            window_start: now,
            last_seen: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.last_seen = now;
        entry.count <= self.max_requests
    }

    /// Evict entries idle for more than `2 * window` (Section 5).
    pub fn sweep(&self) {
        let now = Instant::now();
        let idle_ceiling = self.window * 2;
        self.table.retain(|_, entry| now.duration_since(entry.last_seen) < idle_ceiling);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max_requests() {
        let limiter = RateLimiter::with_limits(Duration::from_secs(60), 3);
        assert!(limiter.check("client-a"));
        assert!(limiter.check("client-a"));
        assert!(limiter.check("client-a"));
    }

    #[test]
    fn test_rejects_the_overflow_request() {
        let limiter = RateLimiter::with_limits(Duration::from_secs(60), 3);
        for _ in 0..3 {
            assert!(limiter.check("client-a"));
        }
        assert!(!limiter.check("client-a"));
    }

    #[test]
    fn test_different_keys_have_independent_budgets() {
        let limiter = RateLimiter::with_limits(Duration::from_secs(60), 1);
        assert!(limiter.check("client-a"));
        assert!(limiter.check("client-b"));
    }

    #[test]
    fn test_window_resets_allow_further_requests() {
        let limiter = RateLimiter::with_limits(Duration::from_millis(10), 1);
        assert!(limiter.check("client-a"));
        assert!(!limiter.check("client-a"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("client-a"));
    }

    #[test]
    fn test_sweep_evicts_idle_entries() {
        let limiter = RateLimiter::with_limits(Duration::from_millis(5), 1);
        limiter.check("client-a");
        std::thread::sleep(Duration::from_millis(15));
        limiter.sweep();
        assert!(limiter.is_empty());
    }
}
