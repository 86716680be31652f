//! Per-leg quantity distribution.

use dca_core::{Size, TradingConstraints};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Split `total` across `levels` legs.
///
/// Each leg gets `total * fraction`, clamped up to the venue minimum and rounded
/// down to the quantity step. When all legs can be funded the step-rounded
/// leftover goes to the last leg. Otherwise as many legs as possible are funded
/// at the minimum, any remainder is spread evenly over them (step-rounded) and
/// what is left after that goes to the last funded leg.
///
/// Always returns `levels` entries; unfunded legs are zero. The sum never
/// exceeds `total`.
pub fn distribute_quantity(
    total: Size,
    levels: u32,
    fraction: Decimal,
    constraints: &TradingConstraints,
) -> Vec<Size> {
    let n = levels as usize;
    let mut legs = vec![Size::ZERO; n];
    if n == 0 || !total.is_positive() {
        return legs;
    }

    let step = constraints.qty_step;
    let min_leg = ceil_to_step(constraints.min_order_qty, step).max(step);
    let base = (total * fraction).max(min_leg).round_to_step(step);
    let count = Decimal::from(levels);

    if base.inner() * count <= total.inner() {
        legs.fill(base);
        let leftover = (total - base * count).round_to_step(step);
        legs[n - 1] = legs[n - 1] + leftover;
        return legs;
    }

    let unit = if min_leg.is_positive() { min_leg } else { base };
    if !unit.is_positive() {
        return legs;
    }
    let funded = (total.inner() / unit.inner())
        .floor()
        .min(count)
        .to_usize()
        .unwrap_or(0);
    if funded == 0 {
        return legs;
    }

    let funded_count = Decimal::from(funded as u64);
    let remainder = total - unit * funded_count;
    let share = (remainder / funded_count).round_to_step(step);
    for leg in legs.iter_mut().take(funded) {
        *leg = unit + share;
    }
    let extra = (remainder - share * funded_count).round_to_step(step);
    legs[funded - 1] = legs[funded - 1] + extra;
    legs
}

fn ceil_to_step(value: Size, step: Size) -> Size {
    if !step.is_positive() {
        return value;
    }
    Size::new((value.inner() / step.inner()).ceil() * step.inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn constraints(min_qty: Decimal, step: Decimal) -> TradingConstraints {
        TradingConstraints {
            min_order_qty: Size::new(min_qty),
            qty_step: Size::new(step),
            ..TradingConstraints::default()
        }
    }

    fn sizes(values: &[Decimal]) -> Vec<Size> {
        values.iter().copied().map(Size::new).collect()
    }

    fn sum(legs: &[Size]) -> Decimal {
        legs.iter().map(|s| s.inner()).sum()
    }

    #[test]
    fn test_even_split_without_remainder() {
        let legs = distribute_quantity(
            Size::new(dec!(1.000)),
            5,
            dec!(0.20),
            &constraints(dec!(0.001), dec!(0.001)),
        );
        assert_eq!(legs, sizes(&[dec!(0.2); 5]));
    }

    #[test]
    fn test_remainder_folded_into_last_leg() {
        let legs = distribute_quantity(
            Size::new(dec!(1.003)),
            5,
            dec!(0.20),
            &constraints(dec!(0.001), dec!(0.001)),
        );
        assert_eq!(
            legs,
            sizes(&[dec!(0.2), dec!(0.2), dec!(0.2), dec!(0.2), dec!(0.203)])
        );
    }

    #[test]
    fn test_unaligned_total_never_exceeded() {
        let total = Size::new(dec!(1.0037));
        let legs = distribute_quantity(total, 3, dec!(0.3333), &constraints(dec!(0.01), dec!(0.01)));
        assert_eq!(legs, sizes(&[dec!(0.33), dec!(0.33), dec!(0.34)]));
        assert!(sum(&legs) <= total.inner());
    }

    #[test]
    fn test_small_total_funds_fewer_legs() {
        let total = Size::new(dec!(0.0025));
        let legs = distribute_quantity(total, 5, dec!(0.2), &constraints(dec!(0.001), dec!(0.001)));
        assert_eq!(
            legs,
            sizes(&[dec!(0.001), dec!(0.001), dec!(0), dec!(0), dec!(0)])
        );
        assert!(sum(&legs) <= total.inner());
    }

    #[test]
    fn test_small_total_spreads_remainder_over_funded_legs() {
        let total = Size::new(dec!(0.0070));
        let legs = distribute_quantity(total, 5, dec!(0.2), &constraints(dec!(0.002), dec!(0.0005)));
        // 3 legs at 0.002; the 0.001 remainder is under one step per leg and goes to leg 3.
        assert_eq!(sum(&legs), dec!(0.0070));
        assert_eq!(legs.iter().filter(|s| s.is_positive()).count(), 3);
        assert!(legs.iter().take(3).all(|s| *s >= Size::new(dec!(0.002))));
    }

    #[test]
    fn test_below_minimum_funds_nothing() {
        let legs = distribute_quantity(
            Size::new(dec!(0.0005)),
            4,
            dec!(0.25),
            &constraints(dec!(0.001), dec!(0.001)),
        );
        assert_eq!(legs, vec![Size::ZERO; 4]);
    }

    #[test]
    fn test_zero_levels() {
        assert!(distribute_quantity(Size::new(dec!(1)), 0, dec!(0.2), &TradingConstraints::default()).is_empty());
    }
}
