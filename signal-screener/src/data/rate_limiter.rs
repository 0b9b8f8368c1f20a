//! Token bucket rate limiter for provider requests.
//!
//! The bucket holds up to one second's worth of requests and refills
//! continuously, so bursts are bounded while the per-minute budget holds.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A token bucket rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    /// Tokens added per second
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
    name: String,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_minute` requests per minute.
    pub fn new(name: impl Into<String>, requests_per_minute: u32) -> Self {
        let refill_per_sec = requests_per_minute.max(1) as f64 / 60.0;
        let capacity = refill_per_sec.ceil().max(1.0);

        Self {
            capacity,
            refill_per_sec,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            name: name.into(),
        }
    }

    /// Acquire a token, waiting until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.take_or_wait() {
                None => return,
                Some(wait) => wait,
            };

            debug!(
                limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limited, waiting for token"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.take_or_wait().is_none()
    }

    /// Take a token, or report how long until the next one.
    fn take_or_wait(&self) -> Option<Duration> {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return None;
        }

        let missing = 1.0 - bucket.tokens;
        let wait_secs = missing / self.refill_per_sec;
        Some(Duration::from_secs_f64(wait_secs).max(Duration::from_millis(1)))
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            bucket.last_refill = now;
        }
    }

    /// Current available tokens (for monitoring).
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.refill(&mut bucket);
        bucket.tokens
    }

    /// Get the configured burst capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }
}

/// Shared rate limiter that can be cloned.
pub type SharedRateLimiter = Arc<RateLimiter>;

/// Create a shared rate limiter.
pub fn shared_limiter(name: impl Into<String>, requests_per_minute: u32) -> SharedRateLimiter {
    Arc::new(RateLimiter::new(name, requests_per_minute))
}

// ============================================================================
// Tests
// ============================================================================
