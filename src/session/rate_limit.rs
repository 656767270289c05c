//! Rate limiter (C16, supplemental): per-team token bucket.
//!
//! Grounded on this codebase's per-IP sliding-window limiter, generalized
//! from IP-keyed to team-keyed and from a sliding window to a token bucket —
//! the vocabulary §4.10/§9 actually specifies ("token-bucket at roughly
//! 10 actions/s/team").

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default sustained rate and bucket capacity (§4.10, §9).
pub const DEFAULT_RATE_PER_SEC: f64 = 10.0;
pub const DEFAULT_BUCKET_CAPACITY: f64 = 10.0;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Clone)]
pub struct RateLimitConfig {
    pub rate_per_sec: f64,
    pub capacity: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: DEFAULT_RATE_PER_SEC,
            capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to spend one token for `team_name`. Returns `true` if the action
    /// is admitted, `false` if the bucket is empty (RATE_LIMIT_EXCEEDED).
    pub fn try_acquire(&self, team_name: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let bucket = buckets.entry(team_name.to_string()).or_insert_with(|| Bucket {
            tokens: self.config.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.rate_per_sec).min(self.config.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Periodic cleanup of buckets that have been idle long enough to have
    /// fully refilled — keeps the map from growing unbounded across a long
    /// session's churn of reconnecting teams.
    pub fn cleanup(&self, idle_for: Duration) {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        buckets.retain(|_, b| now.duration_since(b.last_refill) < idle_for);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_admits_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate_per_sec: 10.0,
            capacity: 3.0,
        });
        assert!(limiter.try_acquire("A"));
        assert!(limiter.try_acquire("A"));
        assert!(limiter.try_acquire("A"));
        assert!(!limiter.try_acquire("A"));
    }

    #[test]
    fn buckets_are_independent_per_team() {
        let limiter = RateLimiter::new(RateLimitConfig {
            rate_per_sec: 10.0,
            capacity: 1.0,
        });
        assert!(limiter.try_acquire("A"));
        assert!(!limiter.try_acquire("A"));
        assert!(limiter.try_acquire("B"));
    }
}
