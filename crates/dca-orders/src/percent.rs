//! Take-profit distance sources.
//!
//! A source returns the distance of the top leg above the average entry, as a
//! fraction. Leg `i` of `N` targets `i/N` of it.

use dca_core::Price;
use rust_decimal::{Decimal, MathematicalOps};

pub trait TakeProfitPercentSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Top-leg distance for the given close history (oldest first).
    fn percent(&self, history: &[Price]) -> Decimal;
}

/// Constant distance.
#[derive(Debug, Clone, Copy)]
pub struct FixedPercent(pub Decimal);

impl TakeProfitPercentSource for FixedPercent {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn percent(&self, _history: &[Price]) -> Decimal {
        self.0
    }
}

/// Distance proportional to the standard deviation of close-to-close returns,
/// clamped to `[min, max]`. Falls back to `fallback` with fewer than two returns.
#[derive(Debug, Clone, Copy)]
pub struct VolatilityPercent {
    pub multiplier: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    pub fallback: Decimal,
}

impl VolatilityPercent {
    fn returns(history: &[Price]) -> Vec<Decimal> {
        history
            .windows(2)
            .filter_map(|w| w[1].fraction_above(w[0]))
            .collect()
    }
}

impl TakeProfitPercentSource for VolatilityPercent {
    fn name(&self) -> &'static str {
        "volatility"
    }

    fn percent(&self, history: &[Price]) -> Decimal {
        let returns = Self::returns(history);
        if returns.len() < 2 {
            return self.fallback.clamp(self.min, self.max);
        }

        let n = Decimal::from(returns.len() as u64);
        let mean = returns.iter().sum::<Decimal>() / n;
        let variance = returns
            .iter()
            .map(|r| (*r - mean) * (*r - mean))
            .sum::<Decimal>()
            / n;
        let stddev = variance.sqrt().unwrap_or(Decimal::ZERO);

        (stddev * self.multiplier).clamp(self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn prices(values: &[Decimal]) -> Vec<Price> {
        values.iter().copied().map(Price::new).collect()
    }

    fn volatility() -> VolatilityPercent {
        VolatilityPercent {
            multiplier: dec!(2),
            min: dec!(0.01),
            max: dec!(0.10),
            fallback: dec!(0.03),
        }
    }

    #[test]
    fn test_fixed() {
        assert_eq!(FixedPercent(dec!(0.03)).percent(&[]), dec!(0.03));
    }

    #[test]
    fn test_volatility_fallback_on_short_history() {
        assert_eq!(volatility().percent(&prices(&[dec!(100), dec!(101)])), dec!(0.03));
    }

    #[test]
    fn test_flat_history_clamps_to_min() {
        let history = prices(&[dec!(100); 10]);
        assert_eq!(volatility().percent(&history), dec!(0.01));
    }

    #[test]
    fn test_alternating_history() {
        // Returns alternate +2% / -1.96%: stddev ~0.0198, x2 ~0.0396
        let history = prices(&[dec!(100), dec!(102), dec!(100), dec!(102), dec!(100)]);
        let pct = volatility().percent(&history);
        assert!(pct > dec!(0.039) && pct < dec!(0.040), "{pct}");
    }

    #[test]
    fn test_wild_history_clamps_to_max() {
        let history = prices(&[dec!(100), dec!(150), dec!(80), dec!(160), dec!(70)]);
        assert_eq!(volatility().percent(&history), dec!(0.10));
    }
}
