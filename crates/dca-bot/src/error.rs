//! Application error types.

use dca_orders::OrderError;
use dca_position::PositionError;
use dca_resilience::{Categorize, ErrorCategory};
use dca_risk::RiskError;
use dca_telemetry::TelemetryError;
use dca_venue::VenueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Order error: {0}")]
    Orders(#[from] OrderError),

    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Halted after {failures} consecutive credential failures")]
    CredentialHalt { failures: u32 },
}

impl Categorize for AppError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Venue(e) => e.category(),
            Self::Position(e) => e.category(),
            Self::Orders(e) => e.category(),
            Self::Risk(_) => ErrorCategory::Strategy,
            Self::CredentialHalt { .. } => ErrorCategory::Credentials,
            Self::Config(_) | Self::ConfigLoad(_) | Self::Telemetry(_) => ErrorCategory::Fatal,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
