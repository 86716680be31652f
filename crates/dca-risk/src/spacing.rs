//! DCA spacing strategies.
//!
//! A strategy answers one question: how far below the average entry must the
//! price be, as a fraction, before another layer is allowed.

use dca_core::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// Inputs available to a spacing strategy.
#[derive(Debug, Clone, Copy)]
pub struct SpacingInput<'a> {
    pub dca_level: u32,
    pub avg_price: Price,
    pub current_price: Price,
    /// Recent closes, oldest first.
    pub history: &'a [Price],
}

pub trait SpacingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Required drop below the average entry, as a fraction (0.03 = 3%).
    fn required_threshold(&self, input: &SpacingInput<'_>) -> Decimal;
}

/// Same threshold at every level.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpacing {
    pub threshold: Decimal,
}

impl SpacingStrategy for FixedSpacing {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn required_threshold(&self, _input: &SpacingInput<'_>) -> Decimal {
        self.threshold
    }
}

/// `base * multiplier^(level - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ScaledSpacing {
    pub base: Decimal,
    pub multiplier: Decimal,
    pub max: Decimal,
}

impl SpacingStrategy for ScaledSpacing {
    fn name(&self) -> &'static str {
        "scaled"
    }

    fn required_threshold(&self, input: &SpacingInput<'_>) -> Decimal {
        let mut threshold = self.base;
        for _ in 1..input.dca_level {
            threshold *= self.multiplier;
            if threshold >= self.max {
                return self.max;
            }
        }
        threshold.min(self.max)
    }
}

/// Spacing strategy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpacingConfig {
    /// "fixed" or "scaled". Default: "fixed".
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Threshold at level 1, as a fraction. Default: 0.02.
    #[serde(default = "default_base_threshold")]
    pub base_threshold: Decimal,
    /// Growth per level for "scaled". Default: 1.5.
    #[serde(default = "default_multiplier")]
    pub multiplier: Decimal,
    /// Cap for "scaled". Default: 0.20.
    #[serde(default = "default_max_threshold")]
    pub max_threshold: Decimal,
}

fn default_strategy() -> String {
    "fixed".to_string()
}

fn default_base_threshold() -> Decimal {
    Decimal::new(2, 2)
}

fn default_multiplier() -> Decimal {
    Decimal::new(15, 1)
}

fn default_max_threshold() -> Decimal {
    Decimal::new(20, 2)
}

impl Default for SpacingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            base_threshold: default_base_threshold(),
            multiplier: default_multiplier(),
            max_threshold: default_max_threshold(),
        }
    }
}

/// Build the strategy named in `config`.
pub fn spacing_from_config(config: &SpacingConfig) -> RiskResult<Box<dyn SpacingStrategy>> {
    if config.base_threshold < Decimal::ZERO {
        return Err(RiskError::ConfigError(
            "base_threshold must not be negative".to_string(),
        ));
    }
    match config.strategy.trim().to_ascii_lowercase().as_str() {
        "fixed" => Ok(Box::new(FixedSpacing {
            threshold: config.base_threshold,
        })),
        "scaled" => {
            if config.multiplier < Decimal::ONE {
                return Err(RiskError::ConfigError(format!(
                    "scaled spacing multiplier must be >= 1, got {}",
                    config.multiplier
                )));
            }
            Ok(Box::new(ScaledSpacing {
                base: config.base_threshold,
                multiplier: config.multiplier,
                max: config.max_threshold,
            }))
        }
        other => Err(RiskError::UnknownStrategy(other.to_string())),
    }
}
