//! Token bucket shared by every sender of outbound messages.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::Clock;

struct Bucket {
    /// May go negative: each unit below zero is a slot already promised to
    /// a waiting caller.
    tokens: f64,
    refilled_at: Instant,
}

/// Reservation-style token bucket.
///
/// [`reserve`](Self::reserve) always succeeds and returns how long the
/// caller must wait before its send fits under the limit. Callers sleep
/// for that duration outside the lock.
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    per_second: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// A bucket refilling `per_second` tokens per second with a burst of
    /// the same size.
    pub fn new(per_second: u32, clock: Arc<dyn Clock>) -> Self {
        let per_second = f64::from(per_second.max(1));
        let refilled_at = clock.instant();
        Self {
            clock,
            per_second,
            capacity: per_second,
            bucket: Mutex::new(Bucket {
                tokens: per_second,
                refilled_at,
            }),
        }
    }

    pub fn reserve(&self) -> Duration {
        let now = self.clock.instant();
        let mut bucket = match self.bucket.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.per_second).min(self.capacity);
        bucket.refilled_at = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.per_second)
        }
    }

    /// Refills the bucket and forgets outstanding reservations.
    pub fn reset(&self) {
        let now = self.clock.instant();
        let mut bucket = match self.bucket.lock() {
            Ok(b) => b,
            Err(poisoned) => poisoned.into_inner(),
        };
        bucket.tokens = self.capacity;
        bucket.refilled_at = now;
    }
}
