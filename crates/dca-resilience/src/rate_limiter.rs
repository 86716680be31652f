//! Token bucket rate limiting for venue calls.
//!
//! Refill is lazy and counts whole elapsed seconds only: a bucket refilling at
//! 10 tokens/s gains nothing 900ms after its last refill and 10 tokens after
//! 1000ms. The sub-second remainder is discarded when a refill happens. This
//! under-refills compared to a continuous bucket and is kept as-is because
//! callers size their budgets around it.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Cancelled, ResilienceError, ResilienceResult};

/// Fixed buffer added to every computed wait to absorb timer jitter.
const WAIT_BUFFER: Duration = Duration::from_millis(50);

/// Token bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Maximum tokens held. Default: 10.
    #[serde(default = "default_capacity")]
    pub capacity: u64,
    /// Tokens added per whole elapsed second. Default: 10.
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: u64,
}

fn default_capacity() -> u64 {
    10
}

fn default_refill_per_sec() -> u64 {
    10
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// Token bucket rate limiter, internally synchronized.
#[derive(Debug)]
pub struct TokenBucket {
    name: String,
    capacity: u64,
    refill_per_sec: u64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(name: impl Into<String>, config: &TokenBucketConfig) -> Self {
        Self {
            name: name.into(),
            capacity: config.capacity,
            refill_per_sec: config.refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Take one token if available.
    pub fn allow(&self) -> bool {
        self.allow_n(1)
    }

    /// Take `n` tokens if all are available; takes nothing otherwise.
    pub fn allow_n(&self, n: u64) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());

        if state.tokens >= n {
            state.tokens -= n;
            trace!(limiter = %self.name, remaining = state.tokens, "Tokens taken");
            true
        } else {
            false
        }
    }

    /// Tokens currently available (after a lazy refill).
    pub fn available(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    /// Estimated wait before `n` tokens could be available.
    pub fn wait_time(&self, n: u64) -> Duration {
        let tokens = self.available();
        if tokens >= n {
            return Duration::ZERO;
        }
        if self.refill_per_sec == 0 {
            return Duration::from_secs(1) + WAIT_BUFFER;
        }
        let shortfall = n - tokens;
        Duration::from_secs_f64(shortfall as f64 / self.refill_per_sec as f64) + WAIT_BUFFER
    }

    /// Wait until `n` tokens are taken or `cancel` fires.
    pub async fn wait_n(&self, cancel: &CancellationToken, n: u64) -> ResilienceResult<()> {
        if n > self.capacity {
            return Err(ResilienceError::ExceedsCapacity {
                name: self.name.clone(),
                requested: n,
                capacity: self.capacity,
            });
        }

        loop {
            if self.allow_n(n) {
                return Ok(());
            }
            let wait = self.wait_time(n);
            debug!(limiter = %self.name, wait_ms = wait.as_millis() as u64, "Waiting for tokens");

            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                () = cancel.cancelled() => return Err(Cancelled.into()),
            }
        }
    }

    /// Refill to capacity.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = self.capacity;
        state.last_refill = Instant::now();
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let whole_secs = now.saturating_duration_since(state.last_refill).as_secs();
        if whole_secs == 0 {
            return;
        }
        let added = whole_secs.saturating_mul(self.refill_per_sec);
        state.tokens = state.tokens.saturating_add(added).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn bucket(capacity: u64, refill_per_sec: u64) -> TokenBucket {
        TokenBucket::new(
            "test",
            &TokenBucketConfig {
                capacity,
                refill_per_sec,
            },
        )
    }

    #[test]
    fn test_capacity_then_exhausted() {
        let limiter = bucket(10, 10);
        for _ in 0..10 {
            assert!(limiter.allow());
        }
        assert!(!limiter.allow());
    }

    #[tokio::test]
    async fn test_refills_after_whole_second() {
        let limiter = bucket(10, 10);
        for _ in 0..10 {
            assert!(limiter.allow());
        }
        tokio::time::sleep(Duration::from_millis(1050)).await;
        assert!(limiter.allow());
    }

    #[tokio::test]
    async fn test_sub_second_elapsed_adds_nothing() {
        let limiter = bucket(5, 100);
        assert!(limiter.allow_n(5));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(limiter.available(), 0);
    }

    #[test]
    fn test_allow_n_is_all_or_nothing() {
        let limiter = bucket(3, 1);
        assert!(!limiter.allow_n(4));
        assert_eq!(limiter.available(), 3);
        assert!(limiter.allow_n(3));
    }

    #[test]
    fn test_wait_time_includes_buffer() {
        let limiter = bucket(2, 4);
        assert_eq!(limiter.wait_time(1), Duration::ZERO);
        assert!(limiter.allow_n(2));
        assert_eq!(limiter.wait_time(2), Duration::from_millis(500) + WAIT_BUFFER);
    }

    #[tokio::test]
    async fn test_wait_n_succeeds_after_refill() {
        let limiter = bucket(1, 1);
        assert!(limiter.allow());
        let cancel = CancellationToken::new();
        let result = tokio::time::timeout(Duration::from_secs(3), limiter.wait_n(&cancel, 1)).await;
        assert_ok!(assert_ok!(result));
    }

    #[tokio::test]
    async fn test_wait_n_cancelled() {
        let limiter = bucket(1, 0);
        assert!(limiter.allow());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = assert_err!(limiter.wait_n(&cancel, 1).await);
        assert!(matches!(err, ResilienceError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_wait_n_over_capacity_rejected() {
        let limiter = bucket(2, 1);
        let cancel = CancellationToken::new();
        assert!(matches!(
            limiter.wait_n(&cancel, 3).await,
            Err(ResilienceError::ExceedsCapacity { .. })
        ));
    }
}
