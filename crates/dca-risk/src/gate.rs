//! Entry gate.
//!
//! The gate is the last check before a layered entry is submitted. It
//! overrides any upstream buy signal: when it blocks, no entry is made.
//!
//! Gates, in order:
//! 1. MaxLevels: the position already holds `max_dca_levels` layers
//! 2. Spacing: price has not dropped far enough below the average entry
//!
//! A flat position (level 0, no average price) always passes; the first
//! entry of a cycle has nothing to be spaced from.

use dca_core::Price;
use rust_decimal::Decimal;
use tracing::debug;

use crate::spacing::{SpacingInput, SpacingStrategy};

/// Gate check result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    /// Entry allowed.
    Pass,
    /// Entry blocked by `gate`.
    Block { gate: &'static str, reason: String },
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Short gate name for metrics labels, `None` on pass.
    pub fn gate(&self) -> Option<&'static str> {
        match self {
            Self::Pass => None,
            Self::Block { gate, .. } => Some(gate),
        }
    }
}

/// Point-in-time inputs for one gate decision.
#[derive(Debug, Clone, Copy)]
pub struct EntryGateInput<'a> {
    pub dca_level: u32,
    /// Average entry price, `None` when flat.
    pub avg_price: Option<Price>,
    pub current_price: Price,
    pub history: &'a [Price],
}

pub struct EntryGate {
    spacing: Box<dyn SpacingStrategy>,
    max_dca_levels: u32,
}

impl EntryGate {
    pub fn new(spacing: Box<dyn SpacingStrategy>, max_dca_levels: u32) -> Self {
        Self {
            spacing,
            max_dca_levels,
        }
    }

    pub fn spacing_name(&self) -> &'static str {
        self.spacing.name()
    }

    pub fn max_dca_levels(&self) -> u32 {
        self.max_dca_levels
    }

    /// `(avg - current) / avg`. Positive when price is below the average entry.
    pub fn price_change(avg_price: Price, current_price: Price) -> Option<Decimal> {
        if !avg_price.is_positive() {
            return None;
        }
        Some((avg_price.inner() - current_price.inner()) / avg_price.inner())
    }

    pub fn check(&self, input: &EntryGateInput<'_>) -> GateResult {
        let avg_price = match input.avg_price {
            Some(avg) if input.dca_level > 0 && avg.is_positive() => avg,
            _ => return GateResult::Pass,
        };

        if input.dca_level >= self.max_dca_levels {
            return GateResult::Block {
                gate: "max_levels",
                reason: format!(
                    "DCA level {} reached max {}",
                    input.dca_level, self.max_dca_levels
                ),
            };
        }

        let required = self.spacing.required_threshold(&SpacingInput {
            dca_level: input.dca_level,
            avg_price,
            current_price: input.current_price,
            history: input.history,
        });
        let change = Self::price_change(avg_price, input.current_price).unwrap_or(Decimal::ZERO);

        debug!(
            level = input.dca_level,
            avg_price = %avg_price,
            current_price = %input.current_price,
            price_change = %change,
            required = %required,
            strategy = self.spacing.name(),
            "Entry gate evaluated"
        );

        if change < required {
            return GateResult::Block {
                gate: "spacing",
                reason: format!("price change {change} below required {required}"),
            };
        }
        GateResult::Pass
    }
}

impl std::fmt::Debug for EntryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryGate")
            .field("spacing", &self.spacing.name())
            .field("max_dca_levels", &self.max_dca_levels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spacing::{FixedSpacing, ScaledSpacing};
    use rust_decimal_macros::dec;

    fn gate(threshold: Decimal) -> EntryGate {
        EntryGate::new(Box::new(FixedSpacing { threshold }), 10)
    }

    fn input(level: u32, avg: Option<Decimal>, current: Decimal) -> EntryGateInput<'static> {
        EntryGateInput {
            dca_level: level,
            avg_price: avg.map(Price::new),
            current_price: Price::new(current),
            history: &[],
        }
    }

    #[test]
    fn test_spacing_threshold() {
        let gate = gate(dec!(0.03));
        assert_eq!(gate.check(&input(1, Some(dec!(100)), dec!(96))), GateResult::Pass);

        let blocked = gate.check(&input(1, Some(dec!(100)), dec!(98)));
        assert_eq!(blocked.gate(), Some("spacing"));
    }

    #[test]
    fn test_exact_threshold_passes() {
        let gate = gate(dec!(0.03));
        assert!(gate.check(&input(2, Some(dec!(100)), dec!(97))).is_pass());
    }

    #[test]
    fn test_price_above_average_blocks() {
        let gate = gate(dec!(0));
        assert_eq!(
            EntryGate::price_change(Price::new(dec!(100)), Price::new(dec!(101))),
            Some(dec!(-0.01))
        );
        assert!(!gate.check(&input(1, Some(dec!(100)), dec!(101))).is_pass());
    }

    #[test]
    fn test_flat_position_passes() {
        let gate = gate(dec!(0.5));
        assert!(gate.check(&input(0, None, dec!(100))).is_pass());
        assert!(gate.check(&input(0, Some(dec!(100)), dec!(100))).is_pass());
    }

    #[test]
    fn test_max_levels_blocks_before_spacing() {
        let gate = EntryGate::new(Box::new(FixedSpacing { threshold: dec!(0.01) }), 3);
        let result = gate.check(&input(3, Some(dec!(100)), dec!(50)));
        assert_eq!(result.gate(), Some("max_levels"));
    }

    #[test]
    fn test_scaled_spacing_tightens_with_level() {
        let gate = EntryGate::new(
            Box::new(ScaledSpacing {
                base: dec!(0.02),
                multiplier: dec!(2),
                max: dec!(0.2),
            }),
            10,
        );
        // level 1 requires 2%, level 3 requires 8%
        assert!(gate.check(&input(1, Some(dec!(100)), dec!(97))).is_pass());
        assert!(!gate.check(&input(3, Some(dec!(100)), dec!(97))).is_pass());
        assert!(gate.check(&input(3, Some(dec!(100)), dec!(92))).is_pass());
    }
}
