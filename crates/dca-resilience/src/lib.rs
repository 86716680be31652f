//! Resilience primitives for venue calls.
//!
//! - [`CircuitBreaker`]: closed/open/half-open call gating per operation class
//! - [`TokenBucket`]: whole-second refill token bucket with cancellable waits
//! - [`RecoveryManager`]: categorized retry with backoff, hot-loop and
//!   danger-pattern stops over a rolling error window
//! - [`ResilienceRegistry`]: get-or-create sharing of breakers and limiters by name

pub mod circuit_breaker;
pub mod error;
pub mod rate_limiter;
pub mod recovery;
pub mod registry;

pub use circuit_breaker::{
    BreakerSnapshot, CallError, CircuitBreaker, CircuitBreakerConfig, CircuitState, StateChange,
    StateChangeObserver,
};
pub use error::{Cancelled, ResilienceError, ResilienceResult};
pub use rate_limiter::{TokenBucket, TokenBucketConfig};
pub use recovery::{
    categorize_message, BackoffStrategy, Categorize, DangerPattern, ErrorCategory,
    RecoveryConfig, RecoveryContext, RecoveryManager, RecoveryStats, StopReason,
};
pub use registry::{ClassConfig, OperationClass, ResilienceConfig, ResilienceRegistry};
