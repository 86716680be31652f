//! DCA bot application.
//!
//! Wires the components together and drives them on an aligned interval:
//! - [`Coordinator`]: the cycle loop and bounded two-phase shutdown
//! - [`AppConfig`]: TOML plus `DCA__` environment configuration
//! - [`ErrorReporter`]: bounded error queue feeding the credential watchdog

pub mod config;
pub mod coordinator;
pub mod error;
pub mod reporting;

pub use config::AppConfig;
pub use coordinator::{
    guard_venue, next_boundary_delay, Coordinator, CycleOutcome, CycleSummary, ShutdownOutcome,
    ShutdownReport,
};
pub use error::{AppError, AppResult};
pub use reporting::{CredentialWatchdog, CycleEvent, ErrorReport, ErrorReporter};
