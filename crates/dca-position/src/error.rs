//! Position error types.

use dca_resilience::{Categorize, ErrorCategory};
use dca_venue::VenueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Position fetch failed after {attempts} attempts: {source}")]
    FetchFailed {
        attempts: u32,
        #[source]
        source: VenueError,
    },

    #[error("Balance fetch failed: {0}")]
    Balance(#[source] VenueError),

    #[error("Position sync cancelled")]
    Cancelled,
}

impl Categorize for PositionError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::FetchFailed { source, .. } | Self::Balance(source) => source.category(),
            Self::Cancelled => ErrorCategory::Fatal,
        }
    }
}

pub type PositionResult<T> = Result<T, PositionError>;
