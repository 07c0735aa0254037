//! Token-bucket admission gate.
//!
//! Capacity is `requests_per_minute`, refilled at `capacity / 60` tokens per
//! second. Refill is lazy: computed from elapsed time whenever [`RateLimiter::allow`]
//! runs, so there's no background timer. `allow` never waits.

use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a full bucket. A non-positive rate disables limiting.
    pub fn new(requests_per_minute: i64) -> Self {
        let capacity = requests_per_minute.max(0) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0.0
    }

    /// Takes one token if available. Returns false immediately otherwise.
    pub fn allow(&self) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available (after refill).
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut bucket);
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refilled = bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec;
        bucket.tokens = refilled.min(self.capacity);
        bucket.last_refill = now;
    }
}
