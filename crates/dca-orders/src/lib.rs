//! Take-profit leg lifecycle.
//!
//! One consistent set of N limit-sell legs covers the open position. The whole
//! set is cancelled and re-placed whenever the average entry price moves; legs
//! are never patched individually.
//!
//! # Key Components
//!
//! - [`TakeProfitManager`]: place, update, fill detection and cancellation
//! - [`distribute_quantity`]: per-leg quantity split with step rounding
//! - [`TakeProfitClassifier`]: decides whether a venue order looks like one of our legs
//! - [`TakeProfitPercentSource`]: fixed or volatility-derived target distance

pub mod classifier;
pub mod distribution;
pub mod error;
pub mod leg;
pub mod manager;
pub mod percent;

pub use classifier::{ClassifierConfig, ClassifyContext, TakeProfitClassifier};
pub use distribution::distribute_quantity;
pub use error::{OrderError, OrderResult};
pub use leg::{LegStatus, TakeProfitLeg};
pub use manager::{
    CancelReport, CancelSource, PlacementReport, TakeProfitConfig, TakeProfitManager,
};
pub use percent::{FixedPercent, TakeProfitPercentSource, VolatilityPercent};
