//! Market identification and venue trading constraints.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::{Price, Size};
use crate::error::CoreError;

/// Product category on the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Spot,
    /// USDT-margined perpetuals.
    #[default]
    Linear,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// Trading symbol (e.g., "BTCUSDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset, assuming a USDT/USDC/USD quote suffix.
    pub fn base_asset(&self) -> &str {
        for quote in ["USDT", "USDC", "USD"] {
            if let Some(base) = self.0.strip_suffix(quote) {
                if !base.is_empty() {
                    return base;
                }
            }
        }
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Venue-imposed order constraints for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingConstraints {
    /// Minimum order quantity.
    pub min_order_qty: Size,
    /// Quantity step; every order quantity must be a multiple of it.
    pub qty_step: Size,
    /// Minimum order notional value in quote currency.
    pub min_order_value: Decimal,
    /// Price tick size.
    pub tick_size: Price,
    /// Maximum leverage allowed.
    pub max_leverage: Decimal,
}

impl TradingConstraints {
    /// Validate that step and tick are usable for rounding.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.qty_step.is_positive() {
            return Err(CoreError::InvalidConstraints(format!(
                "qty_step must be positive, got {}",
                self.qty_step
            )));
        }
        if !self.tick_size.is_positive() {
            return Err(CoreError::InvalidConstraints(format!(
                "tick_size must be positive, got {}",
                self.tick_size
            )));
        }
        if self.min_order_qty.inner().is_sign_negative() {
            return Err(CoreError::InvalidConstraints(
                "min_order_qty must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether an order of `qty` at `price` satisfies both venue minimums.
    pub fn meets_minimums(&self, qty: Size, price: Price) -> bool {
        qty >= self.min_order_qty && qty.is_positive() && qty.notional(price) >= self.min_order_value
    }
}

impl Default for TradingConstraints {
    fn default() -> Self {
        Self {
            min_order_qty: Size::new(Decimal::new(1, 3)),
            qty_step: Size::new(Decimal::new(1, 3)),
            min_order_value: Decimal::from(5),
            tick_size: Price::new(Decimal::new(1, 2)),
            max_leverage: Decimal::from(10),
        }
    }
}
