//! Token Bucket Rate Limiter
//!
//! Bounds how often a polling loop may hit the Kubernetes API:
//! - Configurable rate (admissions per second)
//! - Burst capacity (max tokens in bucket)
//! - `accept()` waits for a token instead of rejecting
//!
//! Algorithm: https://en.wikipedia.org/wiki/Token_bucket
//!
//! Example:
//! ```rust,ignore
//! let limiter = TokenBucket::new(0.1, 1); // one cycle every 10s
//!
//! loop {
//!     limiter.accept().await;
//!     poll_api().await;
//! }
//! ```

use crate::apis::metrics::record_rate_limiter_wait;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Safe RwLock read helper that recovers from poisoning
#[inline]
fn safe_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during read, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Safe RwLock write helper that recovers from poisoning
#[inline]
fn safe_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during write, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Token bucket for loop admission
///
/// Clocked on `tokio::time::Instant` so paused-time tests can drive it.
#[derive(Debug)]
pub struct TokenBucket {
    /// Loop name (metrics label)
    name: String,
    /// Maximum tokens (burst capacity)
    capacity: f64,
    /// Current tokens available
    tokens: RwLock<f64>,
    /// Refill rate (tokens per second)
    refill_rate: f64,
    /// Last refill timestamp
    last_refill: RwLock<Instant>,
}

impl TokenBucket {
    /// Create a new token bucket
    ///
    /// # Arguments
    /// * `rate` - Tokens per second (e.g., 0.1 = one admission every 10s)
    /// * `burst` - Maximum burst capacity (tokens)
    ///
    /// The bucket starts full, so the first `burst` admissions are immediate.
    pub fn new(rate: f64, burst: u64) -> Self {
        Self::named("default", rate, burst)
    }

    /// Create a bucket whose waits are reported under `name`
    pub fn named(name: &str, rate: f64, burst: u64) -> Self {
        let capacity = burst as f64;
        Self {
            name: name.to_string(),
            capacity,
            tokens: RwLock::new(capacity),
            refill_rate: rate,
            last_refill: RwLock::new(Instant::now()),
        }
    }

    /// Try to acquire a token
    ///
    /// Returns true if a token was taken, false if the caller must wait
    pub fn try_acquire(&self) -> bool {
        self.refill();

        let mut tokens = safe_write(&self.tokens);
        if *tokens >= 1.0 {
            *tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available, then take it
    pub async fn accept(&self) {
        let mut waited = Duration::ZERO;

        while !self.try_acquire() {
            let wait = self.time_until_available();
            debug!(limiter = %self.name, wait_ms = wait.as_millis() as u64, "Waiting for rate limiter");
            tokio::time::sleep(wait).await;
            waited += wait;
        }

        if !waited.is_zero() {
            record_rate_limiter_wait(&self.name, waited.as_secs_f64());
        }
    }

    /// Time until one full token has accumulated
    fn time_until_available(&self) -> Duration {
        let deficit = (1.0 - *safe_read(&self.tokens)).max(0.0);
        Duration::try_from_secs_f64(deficit / self.refill_rate)
            .unwrap_or(Duration::from_secs(1))
            .max(Duration::from_millis(1))
    }

    /// Refill tokens based on elapsed time
    fn refill(&self) {
        let now = Instant::now();
        let mut last_refill = safe_write(&self.last_refill);
        let elapsed = now.duration_since(*last_refill);

        let tokens_to_add = elapsed.as_secs_f64() * self.refill_rate;

        if tokens_to_add > 0.0 {
            let mut tokens = safe_write(&self.tokens);
            *tokens = (*tokens + tokens_to_add).min(self.capacity);
            *last_refill = now;
        }
    }

    /// Get current token count (for testing/metrics)
    pub fn available_tokens(&self) -> f64 {
        self.refill();
        *safe_read(&self.tokens)
    }
}
