//! External buy signal seam.

use dca_core::Price;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Hold,
}

/// Buy signal generator consulted before the entry gate.
///
/// Implementations see the latest price and recent closes (oldest first).
/// The entry gate still has the final say on every `Buy`.
pub trait SignalSource: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, current_price: Price, history: &[Price]) -> Signal;
}

/// Signals `Buy` on every tick, leaving the entry gate as the only filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysBuy;

impl SignalSource for AlwaysBuy {
    fn name(&self) -> &str {
        "always_buy"
    }

    fn evaluate(&self, _current_price: Price, _history: &[Price]) -> Signal {
        Signal::Buy
    }
}
