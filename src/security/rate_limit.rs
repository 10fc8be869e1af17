// src/security/rate_limit.rs — Sliding-window rate limiting per source

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-source sliding window: at most `limit` calls within any `interval`.
pub struct RateLimiter {
    limit: usize,
    interval: Duration,
    sources: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, interval: Duration) -> Self {
        Self {
            limit,
            interval,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Record and allow the call if the window has room; deny otherwise.
    pub fn allow(&self, source: &str) -> bool {
        self.allow_at(source, Instant::now())
    }

    fn allow_at(&self, source: &str, now: Instant) -> bool {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        let window = sources.entry(source.to_string()).or_default();
        prune(window, now, self.interval);
        if window.len() < self.limit {
            window.push(now);
            true
        } else {
            false
        }
    }

    /// Calls still available to `source` in the current window.
    pub fn remaining(&self, source: &str) -> usize {
        self.remaining_at(source, Instant::now())
    }

    fn remaining_at(&self, source: &str, now: Instant) -> usize {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        match sources.get_mut(source) {
            Some(window) => {
                prune(window, now, self.interval);
                self.limit.saturating_sub(window.len())
            }
            None => self.limit,
        }
    }

    /// Forget a source's history entirely.
    pub fn reset(&self, source: &str) {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        sources.remove(source);
    }

    /// Drop sources whose newest timestamp has aged out of the window.
    /// Caller-driven sweep; returns how many sources were removed.
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    fn cleanup_at(&self, now: Instant) -> usize {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        let before = sources.len();
        let interval = self.interval;
        sources.retain(|_, window| {
            window
                .last()
                .map(|newest| now.duration_since(*newest) < interval)
                .unwrap_or(false)
        });
        before - sources.len()
    }
}

fn prune(window: &mut Vec<Instant>, now: Instant, interval: Duration) {
    window.retain(|t| now.duration_since(*t) < interval);
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Sliding window ─────────────────────────────────────────

    #[test]
    fn test_limit_within_window() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(rl.allow_at("user-1", t0));
        assert!(rl.allow_at("user-1", t0 + Duration::from_secs(1)));
        assert!(rl.allow_at("user-1", t0 + Duration::from_secs(2)));
        assert!(!rl.allow_at("user-1", t0 + Duration::from_secs(3)));
    }

    #[test]
    fn test_window_slides() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        for i in 0..3 {
            assert!(rl.allow_at("u", t0 + Duration::from_secs(i)));
        }
        assert!(!rl.allow_at("u", t0 + Duration::from_secs(30)));
        // The first call ages out after a minute; room opens up.
        assert!(rl.allow_at("u", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_sources_independent() {
        let rl = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(rl.allow_at("a", t0));
        assert!(rl.allow_at("b", t0));
        assert!(!rl.allow_at("a", t0));
    }

    // ─── Introspection ──────────────────────────────────────────

    #[test]
    fn test_remaining() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        assert_eq!(rl.remaining_at("u", t0), 3);
        rl.allow_at("u", t0);
        rl.allow_at("u", t0);
        assert_eq!(rl.remaining_at("u", t0), 1);
        // Window slide restores capacity.
        assert_eq!(rl.remaining_at("u", t0 + Duration::from_secs(61)), 3);
    }

    #[test]
    fn test_reset() {
        let rl = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(rl.allow_at("u", t0));
        assert!(!rl.allow_at("u", t0));
        rl.reset("u");
        assert!(rl.allow_at("u", t0));
    }

    #[test]
    fn test_cleanup_drops_stale_sources() {
        let rl = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        rl.allow_at("stale", t0);
        rl.allow_at("fresh", t0 + Duration::from_secs(59));

        assert_eq!(rl.cleanup_at(t0 + Duration::from_secs(61)), 1);
        // The stale source starts over with a full window.
        assert_eq!(rl.remaining_at("stale", t0 + Duration::from_secs(61)), 2);
        assert_eq!(rl.remaining_at("fresh", t0 + Duration::from_secs(61)), 1);
    }
}
