//! Entry gating for the DCA bot.
//!
//! - [`EntryGate`]: blocks layered entries until price has fallen far enough
//!   below the average entry, and caps the number of layers
//! - [`SpacingStrategy`]: supplies the required drop per DCA level
//! - [`SignalSource`]: seam for an external buy signal generator

pub mod error;
pub mod gate;
pub mod signal;
pub mod spacing;

pub use error::{RiskError, RiskResult};
pub use gate::{EntryGate, EntryGateInput, GateResult};
pub use signal::{AlwaysBuy, Signal, SignalSource};
pub use spacing::{
    spacing_from_config, FixedSpacing, ScaledSpacing, SpacingConfig, SpacingInput,
    SpacingStrategy,
};
