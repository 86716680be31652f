//! Circuit breaker state machine.
//!
//! One breaker exists per operation class (trading, market data, account data)
//! and lives for the whole process; it is reset, never destroyed.
//!
//! ```text
//!            failure_threshold consecutive failures
//!            (or max_failures in window: timeout x2)
//!   Closed ─────────────────────────────────────────▶ Open
//!     ▲                                                │
//!     │ success_threshold                              │ timeout elapsed
//!     │ consecutive successes                          ▼
//!     └──────────────────────────────────────────── HalfOpen
//!                                 any failure: back to Open
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ResilienceError, ResilienceResult};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls execute normally.
    Closed,
    /// Calls are rejected without being invoked.
    Open,
    /// Calls are admitted to probe whether the dependency recovered.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker. Default: 5.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker. Default: 2.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Time spent open before probing (ms). Default: 30,000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Failures within one reset window that force the breaker open with a
    /// doubled timeout, even when failures were not consecutive.
    /// 0 disables the window check. Default: 10.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Length of the failure-counting window (ms). Default: 60,000.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_failures() -> u32 {
    10
}

fn default_reset_timeout_ms() -> u64 {
    60_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            timeout_ms: default_timeout_ms(),
            max_failures: default_max_failures(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// A breaker state transition, delivered to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub name: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Observer invoked on every state transition.
///
/// Runs on a spawned task, never inline with the state machine.
pub type StateChangeObserver = Arc<dyn Fn(StateChange) + Send + Sync>;

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker rejected the call; the wrapped function was not invoked.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String, retry_in: Duration },
    /// The wrapped function ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub window_failures: u32,
    pub open_count: u64,
    /// Remaining open time, when open.
    pub retry_in: Option<Duration>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    window_failures: u32,
    window_started: Instant,
    next_retry_at: Option<Instant>,
    open_count: u64,
}

/// Circuit breaker guarding one operation class.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    observer: Option<StateChangeObserver>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                window_failures: 0,
                window_started: Instant::now(),
                next_retry_at: None,
                open_count: 0,
            }),
            observer: None,
        }
    }

    /// Attach a state-change observer.
    #[must_use]
    pub fn with_observer(mut self, observer: StateChangeObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, applying the open-to-half-open timeout if it has elapsed.
    pub fn state(&self) -> CircuitState {
        let (state, change) = {
            let mut inner = self.inner.lock();
            let change = self.maybe_half_open(&mut inner, Instant::now());
            (inner.state, change)
        };
        self.notify(change);
        state
    }

    /// Execute `f` if the breaker admits calls, recording the outcome.
    ///
    /// Every `Err` from `f` counts as a failure. Callers that need to exclude
    /// some errors (e.g. business rejections) use [`try_acquire`] together with
    /// [`record_success`]/[`record_failure`] instead.
    ///
    /// [`try_acquire`]: Self::try_acquire
    /// [`record_success`]: Self::record_success
    /// [`record_failure`]: Self::record_failure
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(ResilienceError::CircuitOpen { name, retry_in }) = self.try_acquire() {
            return Err(CallError::Open { name, retry_in });
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CallError::Inner(e))
            }
        }
    }

    /// Check whether a call may proceed.
    ///
    /// Open breakers whose timeout has elapsed move to half-open and admit the call.
    pub fn try_acquire(&self) -> ResilienceResult<()> {
        let now = Instant::now();
        let (result, change) = {
            let mut inner = self.inner.lock();
            let change = self.maybe_half_open(&mut inner, now);
            let result = match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
                CircuitState::Open => {
                    let retry_in = inner
                        .next_retry_at
                        .map(|at| at.saturating_duration_since(now))
                        .unwrap_or_default();
                    Err(ResilienceError::CircuitOpen {
                        name: self.name.clone(),
                        retry_in,
                    })
                }
            };
            (result, change)
        };
        self.notify(change);
        result
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let change = {
            let mut inner = self.inner.lock();
            inner.consecutive_failures = 0;
            match inner.state {
                CircuitState::HalfOpen => {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.config.success_threshold {
                        inner.consecutive_successes = 0;
                        inner.window_failures = 0;
                        inner.next_retry_at = None;
                        Some(self.transition(&mut inner, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                CircuitState::Closed | CircuitState::Open => None,
            }
        };
        self.notify(change);
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let change = {
            let mut inner = self.inner.lock();

            if now.duration_since(inner.window_started) >= self.config.reset_timeout() {
                inner.window_failures = 0;
                inner.window_started = now;
            }
            inner.window_failures += 1;
            inner.consecutive_successes = 0;

            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    let window_exceeded = self.config.max_failures > 0
                        && inner.window_failures > self.config.max_failures;

                    if window_exceeded {
                        warn!(
                            breaker = %self.name,
                            window_failures = inner.window_failures,
                            max_failures = self.config.max_failures,
                            "Failure window exceeded, opening with doubled timeout"
                        );
                        Some(self.open(&mut inner, now, self.config.timeout() * 2))
                    } else if inner.consecutive_failures >= self.config.failure_threshold {
                        Some(self.open(&mut inner, now, self.config.timeout()))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    inner.consecutive_failures += 1;
                    Some(self.open(&mut inner, now, self.config.timeout()))
                }
                // A call admitted before the breaker opened; the deadline stands.
                CircuitState::Open => None,
            }
        };
        self.notify(change);
    }

    /// Force the breaker back to closed and clear all counters.
    pub fn reset(&self) {
        let change = {
            let mut inner = self.inner.lock();
            inner.consecutive_failures = 0;
            inner.consecutive_successes = 0;
            inner.window_failures = 0;
            inner.window_started = Instant::now();
            inner.next_retry_at = None;
            if inner.state == CircuitState::Closed {
                None
            } else {
                Some(self.transition(&mut inner, CircuitState::Closed))
            }
        };
        info!(breaker = %self.name, "Circuit breaker reset");
        self.notify(change);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let (snapshot, change) = {
            let mut inner = self.inner.lock();
            let change = self.maybe_half_open(&mut inner, now);
            let snapshot = BreakerSnapshot {
                name: self.name.clone(),
                state: inner.state,
                consecutive_failures: inner.consecutive_failures,
                consecutive_successes: inner.consecutive_successes,
                window_failures: inner.window_failures,
                open_count: inner.open_count,
                retry_in: (inner.state == CircuitState::Open)
                    .then(|| inner.next_retry_at.map(|at| at.saturating_duration_since(now)))
                    .flatten(),
            };
            (snapshot, change)
        };
        self.notify(change);
        snapshot
    }

    fn maybe_half_open(&self, inner: &mut BreakerInner, now: Instant) -> Option<StateChange> {
        if inner.state != CircuitState::Open {
            return None;
        }
        match inner.next_retry_at {
            Some(at) if now >= at => {
                inner.consecutive_successes = 0;
                Some(self.transition(inner, CircuitState::HalfOpen))
            }
            _ => None,
        }
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant, timeout: Duration) -> StateChange {
        inner.next_retry_at = Some(now + timeout);
        inner.consecutive_successes = 0;
        inner.open_count += 1;
        self.transition(inner, CircuitState::Open)
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) -> StateChange {
        let from = inner.state;
        inner.state = to;
        StateChange {
            name: self.name.clone(),
            from,
            to,
        }
    }

    /// Log the transition and hand it to the observer off the calling task.
    fn notify(&self, change: Option<StateChange>) {
        let Some(change) = change else {
            return;
        };

        match change.to {
            CircuitState::Open => warn!(
                breaker = %change.name,
                from = %change.from,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(breaker = %change.name, "Circuit breaker half-open"),
            CircuitState::Closed => info!(
                breaker = %change.name,
                from = %change.from,
                "Circuit breaker closed"
            ),
        }

        let Some(observer) = self.observer.clone() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { observer(change) });
            }
            Err(_) => {
                debug!("No runtime for breaker observer, using a thread");
                std::thread::spawn(move || observer(change));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout_ms: 50,
            max_failures: 0,
            reset_timeout_ms: 60_000,
        }
    }

    async fn fail(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), CallError<&'static str>> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), CallError<&'static str>> {
        breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<(), &'static str>(())
            })
            .await
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects_without_invoking() {
        let breaker = CircuitBreaker::new("trading", test_config());
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            assert!(matches!(fail(&breaker, &calls).await, Err(CallError::Inner(_))));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result = succeed(&breaker, &calls).await;
        assert!(matches!(result, Err(CallError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "4th call must not run");
    }

    #[tokio::test]
    async fn test_half_open_then_closes_after_successes() {
        let breaker = CircuitBreaker::new("market_data", test_config());
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let _ = fail(&breaker, &calls).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;

        assert!(succeed(&breaker, &calls).await.is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(succeed(&breaker, &calls).await.is_ok());
        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.consecutive_successes, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("account_data", test_config());
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let _ = fail(&breaker, &calls).await;
        }
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = fail(&breaker, &calls).await;
        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.open_count, 2);
        assert!(snap.retry_in.is_some());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("trading", test_config());
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_window_exceeded_opens_with_doubled_timeout() {
        let config = CircuitBreakerConfig {
            failure_threshold: 100,
            max_failures: 3,
            timeout_ms: 10_000,
            ..test_config()
        };
        let breaker = CircuitBreaker::new("trading", config);

        // Interleaved successes keep the consecutive count low.
        for _ in 0..4 {
            breaker.record_failure();
            breaker.record_success();
        }
        let snap = breaker.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        let retry_in = snap.retry_in.unwrap();
        assert!(retry_in > Duration::from_secs(10), "timeout should be doubled: {retry_in:?}");
    }

    #[test]
    fn test_reset_closes() {
        let breaker = CircuitBreaker::new("trading", test_config());
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.try_acquire().is_err());
        breaker.reset();
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.snapshot().window_failures, 0);
    }

    #[tokio::test]
    async fn test_observer_receives_transitions() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let observer: StateChangeObserver = Arc::new(move |change| {
            let _ = tx.send(change);
        });
        let breaker = CircuitBreaker::new("trading", test_config()).with_observer(observer);

        for _ in 0..3 {
            breaker.record_failure();
        }

        let change = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.from, CircuitState::Closed);
        assert_eq!(change.to, CircuitState::Open);
        assert_eq!(change.name, "trading");
    }
}
