//! Categorized retry with backoff.
//!
//! Every failure of a wrapped operation is categorized and recorded in a
//! process-wide rolling window. Before each retry the manager checks, in order:
//! 1. the category is not retryable
//! 2. the per-category retry budget (or the hard attempt cap) is spent
//! 3. the category is looping hot in the recent window
//! 4. a cross-category danger pattern is present (credential or order storms)
//!
//! The statistical stops are independent of the circuit breakers' per-call gating.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Cancelled;

/// Minimum window sample before the credential danger pattern applies.
const CREDENTIAL_DANGER_MIN_SAMPLE: usize = 4;
/// Credential share of the window above which retries stop.
const CREDENTIAL_DANGER_RATE: f64 = 0.5;
/// Minimum window sample before the order danger pattern applies.
const ORDER_DANGER_MIN_SAMPLE: usize = 10;
/// Order-error share of the window above which retries stop.
const ORDER_DANGER_RATE: f64 = 0.8;

/// Error taxonomy for venue-facing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    Temporary,
    RateLimit,
    Order,
    Position,
    Strategy,
    Credentials,
    Fatal,
}

impl ErrorCategory {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network
                | Self::Timeout
                | Self::Temporary
                | Self::RateLimit
                | Self::Order
                | Self::Position
        )
    }

    /// Retries allowed for this category within one operation.
    pub fn retry_budget(self) -> u32 {
        match self {
            Self::Network => 5,
            Self::RateLimit => 5,
            Self::Timeout => 3,
            Self::Temporary => 3,
            Self::Order => 2,
            Self::Position => 2,
            Self::Strategy | Self::Credentials | Self::Fatal => 0,
        }
    }

    /// Whether errors of this category say something about venue health,
    /// as opposed to the venue rejecting a specific request.
    pub fn is_infrastructure(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Temporary | Self::RateLimit
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Temporary => "temporary",
            Self::RateLimit => "rate_limit",
            Self::Order => "order",
            Self::Position => "position",
            Self::Strategy => "strategy",
            Self::Credentials => "credentials",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Errors that know their category.
pub trait Categorize {
    fn category(&self) -> ErrorCategory;
}

/// Categorize a free-form error message by keyword.
///
/// Used for venue messages that arrive without a structured code.
pub fn categorize_message(message: &str) -> ErrorCategory {
    let msg = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

    if has(&["api key", "api-key", "signature", "unauthorized", "permission denied", "forbidden"]) {
        ErrorCategory::Credentials
    } else if has(&["rate limit", "too many requests", "too many visits", "429"]) {
        ErrorCategory::RateLimit
    } else if has(&["timeout", "timed out", "deadline exceeded"]) {
        ErrorCategory::Timeout
    } else if has(&["connection", "network", "dns", "broken pipe", "eof", "unreachable"]) {
        ErrorCategory::Network
    } else if has(&["service unavailable", "503", "502", "try again", "busy", "maintenance"]) {
        ErrorCategory::Temporary
    } else if has(&["insufficient", "order", "qty", "quantity", "price", "reduce-only"]) {
        ErrorCategory::Order
    } else if has(&["position", "leverage", "margin"]) {
        ErrorCategory::Position
    } else if has(&["strategy", "signal", "indicator"]) {
        ErrorCategory::Strategy
    } else {
        ErrorCategory::Fatal
    }
}

/// Retry delay strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// base * 2^(attempt-1)
    #[default]
    Exponential,
    /// base * attempt
    Linear,
    /// base
    Fixed,
}

/// Recovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Hard cap on attempts per operation, across categories. Default: 5.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Base delay (ms). Default: 500.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay (ms). Default: 30,000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Add up to 20% random jitter. Default: true.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    /// Fixed delay for rate-limit errors regardless of strategy (ms). Default: 5,000.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    /// Errors retained in the rolling window. Default: 50.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Occurrences of one category in the window that stop retrying. Default: 10.
    #[serde(default = "default_hot_loop_threshold")]
    pub hot_loop_threshold: usize,
    /// Age after which a recorded error leaves the window (ms). 0 keeps
    /// errors until displaced by newer ones. Default: 600,000.
    #[serde(default = "default_window_ttl_ms")]
    pub window_ttl_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

fn default_rate_limit_delay_ms() -> u64 {
    5_000
}

fn default_window_size() -> usize {
    50
}

fn default_hot_loop_threshold() -> usize {
    10
}

fn default_window_ttl_ms() -> u64 {
    600_000
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: BackoffStrategy::default(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            window_size: default_window_size(),
            hot_loop_threshold: default_hot_loop_threshold(),
            window_ttl_ms: default_window_ttl_ms(),
        }
    }
}

/// Cross-category pattern that makes further retries unsafe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DangerPattern {
    CredentialStorm { rate: f64 },
    OrderStorm { rate: f64 },
}

impl fmt::Display for DangerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialStorm { rate } => write!(f, "credential errors at {:.0}%", rate * 100.0),
            Self::OrderStorm { rate } => write!(f, "order errors at {:.0}%", rate * 100.0),
        }
    }
}

/// Why a retry sequence stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    NotRetryable,
    BudgetExhausted { budget: u32 },
    AttemptCapReached { cap: u32 },
    HotLoop { occurrences: usize },
    Danger(DangerPattern),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRetryable => write!(f, "not retryable"),
            Self::BudgetExhausted { budget } => write!(f, "category budget of {budget} exhausted"),
            Self::AttemptCapReached { cap } => write!(f, "attempt cap of {cap} reached"),
            Self::HotLoop { occurrences } => {
                write!(f, "hot loop ({occurrences} in recent window)")
            }
            Self::Danger(pattern) => write!(f, "danger pattern: {pattern}"),
        }
    }
}

/// Per-invocation retry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryContext {
    /// 1-based attempt that just failed.
    pub attempt: u32,
    pub category: ErrorCategory,
    /// Delay before the next attempt.
    pub delay: Duration,
}

/// Rolling-window statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryStats {
    pub total: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub danger: Option<DangerPattern>,
}

#[derive(Debug, Clone)]
struct ErrorRecord {
    component: String,
    category: ErrorCategory,
    at: Instant,
}

/// Categorized retry executor.
#[derive(Debug)]
pub struct RecoveryManager {
    config: RecoveryConfig,
    window: Mutex<VecDeque<ErrorRecord>>,
    cancel: CancellationToken,
}

impl RecoveryManager {
    pub fn new(config: RecoveryConfig, cancel: CancellationToken) -> Self {
        let capacity = config.window_size;
        Self {
            config,
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            cancel,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Run `f`, retrying categorized failures with backoff.
    ///
    /// Returns the last error once a stop condition holds. A fired stop signal
    /// during a backoff sleep returns `E::from(Cancelled)`.
    pub async fn execute_with_recovery<T, E, F, Fut>(
        &self,
        component: &str,
        operation: &str,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Categorize + fmt::Display + From<Cancelled>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(component, operation, attempt, "Operation recovered");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            let category = err.category();
            self.record(component, category);

            let mut ctx = RecoveryContext {
                attempt,
                category,
                delay: Duration::ZERO,
            };
            if let Some(reason) = self.stop_reason(&ctx) {
                warn!(
                    component,
                    operation,
                    attempt,
                    category = %category,
                    reason = %reason,
                    error = %err,
                    "Giving up on operation"
                );
                return Err(err);
            }

            ctx.delay = self.compute_delay(category, attempt);
            warn!(
                component,
                operation,
                attempt,
                category = %category,
                delay_ms = ctx.delay.as_millis() as u64,
                error = %err,
                "Operation failed, retrying"
            );

            tokio::select! {
                () = tokio::time::sleep(ctx.delay) => {}
                () = self.cancel.cancelled() => return Err(E::from(Cancelled)),
            }
        }
    }

    /// First stop condition that holds for `ctx`, if any.
    pub fn stop_reason(&self, ctx: &RecoveryContext) -> Option<StopReason> {
        if !ctx.category.is_retryable() {
            return Some(StopReason::NotRetryable);
        }

        // attempt N failed; N-1 retries have already happened.
        let retries_done = ctx.attempt.saturating_sub(1);
        let budget = ctx.category.retry_budget();
        if retries_done >= budget {
            return Some(StopReason::BudgetExhausted { budget });
        }
        if ctx.attempt >= self.config.max_attempts {
            return Some(StopReason::AttemptCapReached {
                cap: self.config.max_attempts,
            });
        }

        let mut window = self.window.lock();
        self.evict_expired(&mut window);
        let occurrences = window.iter().filter(|r| r.category == ctx.category).count();
        if occurrences >= self.config.hot_loop_threshold {
            return Some(StopReason::HotLoop { occurrences });
        }

        Self::detect_danger(&window).map(StopReason::Danger)
    }

    /// Delay before the retry following a failed `attempt`.
    pub fn compute_delay(&self, category: ErrorCategory, attempt: u32) -> Duration {
        let base = self.config.base_delay_ms;
        let max = self.config.max_delay_ms;

        let delay_ms = if category == ErrorCategory::RateLimit {
            self.config.rate_limit_delay_ms
        } else {
            match self.config.strategy {
                BackoffStrategy::Exponential => {
                    let exponent = attempt.saturating_sub(1).min(16);
                    base.saturating_mul(1u64 << exponent)
                }
                BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt.max(1))),
                BackoffStrategy::Fixed => base,
            }
        };
        let delay_ms = delay_ms.min(max);

        let jitter = if self.config.jitter {
            rand_jitter(delay_ms / 5)
        } else {
            0
        };
        Duration::from_millis(delay_ms + jitter)
    }

    /// Current rolling-window statistics.
    pub fn stats(&self) -> RecoveryStats {
        let mut window = self.window.lock();
        self.evict_expired(&mut window);
        let mut by_category = BTreeMap::new();
        for record in window.iter() {
            *by_category.entry(record.category).or_insert(0) += 1;
        }
        RecoveryStats {
            total: window.len(),
            by_category,
            danger: Self::detect_danger(&window),
        }
    }

    /// Components with errors recorded in the last `within`.
    pub fn recent_components(&self, within: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut components: Vec<String> = self
            .window
            .lock()
            .iter()
            .filter(|r| now.duration_since(r.at) <= within)
            .map(|r| r.component.clone())
            .collect();
        components.sort();
        components.dedup();
        components
    }

    /// Forget all recorded errors.
    pub fn clear(&self) {
        self.window.lock().clear();
    }

    fn record(&self, component: &str, category: ErrorCategory) {
        let mut window = self.window.lock();
        self.evict_expired(&mut window);
        while window.len() >= self.config.window_size.max(1) {
            window.pop_front();
        }
        window.push_back(ErrorRecord {
            component: component.to_string(),
            category,
            at: Instant::now(),
        });
    }

    /// Drop records older than the window TTL. Records are in arrival order.
    fn evict_expired(&self, window: &mut VecDeque<ErrorRecord>) {
        if self.config.window_ttl_ms == 0 {
            return;
        }
        let ttl = Duration::from_millis(self.config.window_ttl_ms);
        let now = Instant::now();
        while window
            .front()
            .is_some_and(|r| now.duration_since(r.at) > ttl)
        {
            window.pop_front();
        }
    }

    fn detect_danger(window: &VecDeque<ErrorRecord>) -> Option<DangerPattern> {
        let total = window.len();
        if total == 0 {
            return None;
        }
        let count = |c: ErrorCategory| window.iter().filter(|r| r.category == c).count();

        let credential_rate = count(ErrorCategory::Credentials) as f64 / total as f64;
        if total >= CREDENTIAL_DANGER_MIN_SAMPLE && credential_rate > CREDENTIAL_DANGER_RATE {
            return Some(DangerPattern::CredentialStorm {
                rate: credential_rate,
            });
        }

        let order_rate = count(ErrorCategory::Order) as f64 / total as f64;
        if total >= ORDER_DANGER_MIN_SAMPLE && order_rate > ORDER_DANGER_RATE {
            return Some(DangerPattern::OrderStorm { rate: order_rate });
        }

        None
    }
}

/// Random jitter in `0..=max` ms without an RNG dependency.
fn rand_jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % (max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("categorized: {0}")]
        Categorized(ErrorCategory),
        #[error("cancelled")]
        Cancelled,
    }

    impl Categorize for TestError {
        fn category(&self) -> ErrorCategory {
            match self {
                Self::Categorized(c) => *c,
                Self::Cancelled => ErrorCategory::Fatal,
            }
        }
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            Self::Cancelled
        }
    }

    fn fast_config() -> RecoveryConfig {
        RecoveryConfig {
            base_delay_ms: 1,
            max_delay_ms: 5,
            rate_limit_delay_ms: 2,
            jitter: false,
            ..RecoveryConfig::default()
        }
    }

    fn manager(config: RecoveryConfig) -> RecoveryManager {
        RecoveryManager::new(config, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let manager = manager(fast_config());
        let calls = AtomicU32::new(0);

        let result: Result<u32, TestError> = manager
            .execute_with_recovery("test", "fetch", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(TestError::Categorized(ErrorCategory::Network))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(manager.stats().total, 2);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let manager = manager(fast_config());
        let calls = AtomicU32::new(0);

        let result: Result<(), TestError> = manager
            .execute_with_recovery("test", "place", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Categorized(ErrorCategory::Credentials))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_category_budget_limits_attempts() {
        let manager = manager(fast_config());
        let calls = AtomicU32::new(0);

        let _: Result<(), TestError> = manager
            .execute_with_recovery("test", "place", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Categorized(ErrorCategory::Order))
            })
            .await;

        // Order budget is 2 retries: 3 attempts total.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_cap_applies_across_budget() {
        let config = RecoveryConfig {
            max_attempts: 2,
            ..fast_config()
        };
        let manager = manager(config);
        let calls = AtomicU32::new(0);

        let _: Result<(), TestError> = manager
            .execute_with_recovery("test", "fetch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Categorized(ErrorCategory::Network))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_hot_loop_stops_retry() {
        let manager = manager(RecoveryConfig {
            hot_loop_threshold: 3,
            ..fast_config()
        });
        for _ in 0..3 {
            manager.record("venue", ErrorCategory::Timeout);
        }
        let ctx = RecoveryContext {
            attempt: 1,
            category: ErrorCategory::Timeout,
            delay: Duration::ZERO,
        };
        assert_eq!(
            manager.stop_reason(&ctx),
            Some(StopReason::HotLoop { occurrences: 3 })
        );
    }

    #[test]
    fn test_credential_danger_pattern() {
        let manager = manager(fast_config());
        manager.record("venue", ErrorCategory::Network);
        for _ in 0..3 {
            manager.record("venue", ErrorCategory::Credentials);
        }
        let stats = manager.stats();
        assert!(matches!(stats.danger, Some(DangerPattern::CredentialStorm { .. })));

        // A retryable category is still stopped by the danger pattern.
        let ctx = RecoveryContext {
            attempt: 1,
            category: ErrorCategory::Network,
            delay: Duration::ZERO,
        };
        assert!(matches!(
            manager.stop_reason(&ctx),
            Some(StopReason::Danger(DangerPattern::CredentialStorm { .. }))
        ));
    }

    #[test]
    fn test_order_danger_needs_sample() {
        let manager = manager(RecoveryConfig {
            hot_loop_threshold: 100,
            ..fast_config()
        });
        for _ in 0..5 {
            manager.record("orders", ErrorCategory::Order);
        }
        assert_eq!(manager.stats().danger, None);

        for _ in 0..6 {
            manager.record("orders", ErrorCategory::Order);
        }
        assert!(matches!(
            manager.stats().danger,
            Some(DangerPattern::OrderStorm { .. })
        ));
    }

    #[tokio::test]
    async fn test_expired_errors_leave_the_window() {
        let manager = manager(RecoveryConfig {
            window_ttl_ms: 100,
            ..fast_config()
        });
        for _ in 0..4 {
            manager.record("venue", ErrorCategory::Credentials);
        }
        assert!(manager.stats().danger.is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.stats().total, 0);

        // An old credential burst no longer blocks retrying a network error.
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = manager
            .execute_with_recovery("test", "fetch", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 {
                    Err(TestError::Categorized(ErrorCategory::Network))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_window_is_bounded() {
        let manager = manager(RecoveryConfig {
            window_size: 4,
            ..fast_config()
        });
        for _ in 0..10 {
            manager.record("venue", ErrorCategory::Network);
        }
        assert_eq!(manager.stats().total, 4);
    }

    #[test]
    fn test_compute_delay_strategies() {
        let base = RecoveryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            rate_limit_delay_ms: 700,
            jitter: false,
            ..RecoveryConfig::default()
        };

        let exp = manager(base.clone());
        assert_eq!(exp.compute_delay(ErrorCategory::Network, 1), Duration::from_millis(100));
        assert_eq!(exp.compute_delay(ErrorCategory::Network, 3), Duration::from_millis(400));
        assert_eq!(exp.compute_delay(ErrorCategory::Network, 10), Duration::from_millis(1_000));

        let linear = manager(RecoveryConfig {
            strategy: BackoffStrategy::Linear,
            ..base.clone()
        });
        assert_eq!(linear.compute_delay(ErrorCategory::Timeout, 3), Duration::from_millis(300));

        let fixed = manager(RecoveryConfig {
            strategy: BackoffStrategy::Fixed,
            ..base
        });
        assert_eq!(fixed.compute_delay(ErrorCategory::Timeout, 4), Duration::from_millis(100));
        assert_eq!(fixed.compute_delay(ErrorCategory::RateLimit, 1), Duration::from_millis(700));
    }

    #[test]
    fn test_jitter_bounded() {
        let manager = manager(RecoveryConfig {
            base_delay_ms: 100,
            jitter: true,
            strategy: BackoffStrategy::Fixed,
            ..RecoveryConfig::default()
        });
        let delay = manager.compute_delay(ErrorCategory::Network, 1);
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let manager = RecoveryManager::new(
            RecoveryConfig {
                base_delay_ms: 10_000,
                max_delay_ms: 10_000,
                jitter: false,
                ..RecoveryConfig::default()
            },
            cancel.clone(),
        );
        cancel.cancel();

        let result: Result<(), TestError> = manager
            .execute_with_recovery("test", "fetch", || async {
                Err(TestError::Categorized(ErrorCategory::Network))
            })
            .await;
        assert!(matches!(result, Err(TestError::Cancelled)));
    }

    #[test]
    fn test_categorize_message() {
        assert_eq!(categorize_message("Invalid API key"), ErrorCategory::Credentials);
        assert_eq!(categorize_message("Too many requests"), ErrorCategory::RateLimit);
        assert_eq!(categorize_message("request timed out"), ErrorCategory::Timeout);
        assert_eq!(categorize_message("connection reset by peer"), ErrorCategory::Network);
        assert_eq!(categorize_message("insufficient balance"), ErrorCategory::Order);
        assert_eq!(categorize_message("something odd"), ErrorCategory::Fatal);
    }
}
