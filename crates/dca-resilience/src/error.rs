//! Resilience error types.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("Circuit breaker '{name}' is open, retry in {retry_in:?}")]
    CircuitOpen { name: String, retry_in: Duration },

    #[error("Requested {requested} tokens exceeds bucket '{name}' capacity {capacity}")]
    ExceedsCapacity {
        name: String,
        requested: u64,
        capacity: u64,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// The stop signal fired while an operation was waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

pub type ResilienceResult<T> = Result<T, ResilienceError>;
