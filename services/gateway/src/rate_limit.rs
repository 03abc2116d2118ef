use crate::error::AppError;
use dashmap::DashMap;
use std::time::Instant;

/// Bucket size and refill rate for one endpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

impl Limit {
    pub const fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
        }
    }
}

/// Driver devices report every few seconds; allow bursts after reconnects.
pub const LOCATION_UPDATE: Limit = Limit::new(30, 5.0);
pub const CHECKOUT: Limit = Limit::new(20, 1.0);
pub const TRANSFER: Limit = Limit::new(10, 0.5);
pub const WS_CONNECT: Limit = Limit::new(10, 1.0);

#[derive(Clone)]
struct Bucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(limit: Limit) -> Self {
        Self {
            capacity: limit.capacity,
            tokens: limit.capacity as f64,
            refill_rate: limit.refill_per_sec,
            last_update: Instant::now(),
        }
    }

    fn allow_request(&mut self, tokens: u32) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = f64::min(
            self.capacity as f64,
            self.tokens + elapsed * self.refill_rate,
        );
        self.last_update = now;

        if self.tokens >= tokens as f64 {
            self.tokens -= tokens as f64;
            true
        } else {
            false
        }
    }
}

/// Token buckets keyed by `"<subject>:<endpoint>"`
#[derive(Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a live bucket.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    pub fn check_rate_limit(&self, key: &str, limit: Limit) -> Result<(), AppError> {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(limit));

        if bucket.allow_request(1) {
            Ok(())
        } else {
            tracing::warn!(key, "Rate limit exceeded");
            Err(AppError::RateLimitExceeded(format!("Rate limit for {}", key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_exhausts_then_rejects() {
        let limiter = RateLimiter::new();
        let limit = Limit::new(3, 0.0);
        for _ in 0..3 {
            limiter.check_rate_limit("driver:7:update_location", limit).unwrap();
        }
        assert!(matches!(
            limiter.check_rate_limit("driver:7:update_location", limit),
            Err(AppError::RateLimitExceeded(_))
        ));
        // Other keys have their own bucket.
        limiter.check_rate_limit("driver:8:update_location", limit).unwrap();
        assert_eq!(limiter.tracked_keys(), 2);
    }
}
