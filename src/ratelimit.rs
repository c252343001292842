//! Token bucket rate limiter shared by all outbound tenant requests.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Interval between polls while waiting for a token.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// A token bucket: up to `capacity` permits, one added every `refill_interval`.
///
/// Safe to share between concurrently running jobs; the bucket state is
/// guarded by a single mutex.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    refill_interval: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    ///
    /// A zero `refill_interval` is clamped up to one nanosecond, which
    /// refills the bucket faster than it can drain: the limiter never
    /// throttles.
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval: refill_interval.max(Duration::from_nanos(1)),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes a token if one is available. Returns false when the bucket is empty.
    pub fn allow(&self) -> bool {
        let mut bucket = self.bucket.lock().expect("rate limiter lock poisoned");

        self.refill(&mut bucket);

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Adds tokens for the time elapsed since the last refill, capped at capacity.
    ///
    /// `last_refill` only advances when at least one token was added, so
    /// progress through a partial refill interval is never lost.
    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        let to_add = (elapsed.as_nanos() / self.refill_interval.as_nanos()) as u32;

        if to_add > 0 {
            bucket.tokens = bucket.tokens.saturating_add(to_add).min(self.capacity);
            bucket.last_refill = now;
        }
    }

    /// Blocks (cooperatively) until a token is available.
    ///
    /// Polls `allow` on a short interval. There is no built-in cancellation;
    /// callers that need one should wrap this in a timeout.
    pub async fn wait(&self) {
        while !self.allow() {
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}
