//! Venue error types.

use std::time::Duration;

use dca_core::{CoreError, OrderId};
use dca_resilience::{categorize_message, Cancelled, Categorize, ErrorCategory, ResilienceError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VenueError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Venue temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Position error: {0}")]
    Position(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Circuit breaker '{name}' is open, retry in {retry_in:?}")]
    CircuitOpen { name: String, retry_in: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Categorize for VenueError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::RateLimited(_) => ErrorCategory::RateLimit,
            Self::Unavailable(_) | Self::CircuitOpen { .. } => ErrorCategory::Temporary,
            Self::Rejected(_) | Self::InsufficientBalance(_) | Self::OrderNotFound(_) => {
                ErrorCategory::Order
            }
            Self::Position(_) => ErrorCategory::Position,
            Self::InvalidCredentials(_) => ErrorCategory::Credentials,
            Self::InvalidResponse(_) | Self::Cancelled => ErrorCategory::Fatal,
            Self::Other(message) => categorize_message(message),
        }
    }
}

impl From<Cancelled> for VenueError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<ResilienceError> for VenueError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::CircuitOpen { name, retry_in } => Self::CircuitOpen { name, retry_in },
            ResilienceError::Cancelled(_) => Self::Cancelled,
            other @ ResilienceError::ExceedsCapacity { .. } => Self::Other(other.to_string()),
        }
    }
}

impl From<CoreError> for VenueError {
    fn from(err: CoreError) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

pub type VenueResult<T> = Result<T, VenueError>;
