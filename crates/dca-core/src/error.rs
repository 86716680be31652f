//! Error types for dca-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid numeric field {field}: {value:?}")]
    InvalidNumber { field: String, value: String },

    #[error("Invalid trading constraints: {0}")]
    InvalidConstraints(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
