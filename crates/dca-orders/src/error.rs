//! Order lifecycle error types.

use dca_position::PositionError;
use dca_resilience::{Categorize, ErrorCategory};
use dca_venue::VenueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("No take-profit leg placed ({skipped} skipped, {failed} failed)")]
    NonePlaced { skipped: u32, failed: u32 },

    #[error("Invalid take-profit configuration: {0}")]
    InvalidConfig(String),
}

impl Categorize for OrderError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Venue(e) => e.category(),
            Self::Position(e) => e.category(),
            Self::NonePlaced { .. } => ErrorCategory::Order,
            Self::InvalidConfig(_) => ErrorCategory::Fatal,
        }
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
