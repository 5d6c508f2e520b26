// crates/agent-gate-server/src/ratelimit.rs
// ============================================================================
// Module: Per-Principal Rate Limiter
// Description: In-memory minute-bucket counters keyed by principal.
// Purpose: Bound admitted request volume per caller per UTC minute.
// Dependencies: agent-gate-core
// ============================================================================

//! ## Overview
//! A fixed-window limiter: one bucket per principal, keyed by the UTC
//! minute. Buckets reset when the minute key rolls. The map lives behind a
//! mutex; concurrent increments never lose updates, and a poisoned lock
//! denies rather than admits.

use std::collections::HashMap;
use std::sync::Mutex;

use agent_gate_core::minute_key;
use time::OffsetDateTime;

/// Rolling state for a single principal.
struct MinuteBucket {
    /// Current minute key.
    key: String,
    /// Requests admitted in the current minute.
    count: u32,
}

/// Fixed-window per-principal rate limiter.
pub struct MinuteRateLimiter {
    /// Admitted requests allowed per principal per minute.
    limit: u32,
    /// Per-principal buckets.
    buckets: Mutex<HashMap<String, MinuteBucket>>,
}

impl MinuteRateLimiter {
    /// Creates a limiter with the given per-minute cap.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admits or rejects a request for `principal`, incrementing on admit.
    #[must_use]
    pub fn check_and_increment(&self, principal: &str, now: OffsetDateTime) -> bool {
        let key = minute_key(now);
        let Ok(mut buckets) = self.buckets.lock() else {
            return false;
        };
        let bucket = buckets.entry(principal.to_string()).or_insert_with(|| MinuteBucket {
            key: key.clone(),
            count: 0,
        });
        if bucket.key != key {
            bucket.key = key;
            bucket.count = 0;
        }
        if bucket.count >= self.limit {
            return false;
        }
        bucket.count += 1;
        true
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::MinuteRateLimiter;

    #[test]
    fn limit_applies_per_principal_per_minute() {
        let limiter = MinuteRateLimiter::new(2);
        let now = OffsetDateTime::now_utc();
        assert!(limiter.check_and_increment("agent-1", now));
        assert!(limiter.check_and_increment("agent-1", now));
        assert!(!limiter.check_and_increment("agent-1", now));
        assert!(limiter.check_and_increment("agent-2", now));
    }

    #[test]
    fn buckets_reset_on_minute_roll() {
        let limiter = MinuteRateLimiter::new(1);
        let now = OffsetDateTime::now_utc();
        assert!(limiter.check_and_increment("agent-1", now));
        assert!(!limiter.check_and_increment("agent-1", now));
        assert!(limiter.check_and_increment("agent-1", now + time::Duration::minutes(1)));
    }
}
