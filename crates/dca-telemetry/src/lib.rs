//! Prometheus metrics and structured logging for the DCA bot.
//!
//! Metrics are recorded into the default Prometheus registry. Nothing serves
//! them over HTTP; [`Metrics::render`] returns the text exposition for logs and tests.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
