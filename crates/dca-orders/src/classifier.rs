//! Take-profit order classifier.
//!
//! Orders on the venue are not all ours: a restarted process inherits its old
//! legs, and operators place manual orders. An order is treated as a
//! take-profit leg only when it is a sell limit for the tracked symbol, priced
//! inside the profit band above the average entry, and sized like a partial exit.

use std::collections::HashSet;

use dca_core::{OrderId, OrderSide, OrderType, Price, Size, Symbol};
use dca_venue::OpenOrder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum distance above the average entry, as a fraction. Default: 0.001.
    #[serde(default = "default_min_profit")]
    pub min_profit: Decimal,
    /// Maximum distance above the average entry, as a fraction. Default: 0.15.
    #[serde(default = "default_max_profit")]
    pub max_profit: Decimal,
    /// Largest share of the position one leg may carry. Default: 0.70.
    #[serde(default = "default_max_position_share")]
    pub max_position_share: Decimal,
}

fn default_min_profit() -> Decimal {
    Decimal::new(1, 3)
}

fn default_max_profit() -> Decimal {
    Decimal::new(15, 2)
}

fn default_max_position_share() -> Decimal {
    Decimal::new(70, 2)
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_profit: default_min_profit(),
            max_profit: default_max_profit(),
            max_position_share: default_max_position_share(),
        }
    }
}

/// What the classifier knows about the current position.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext<'a> {
    pub symbol: &'a Symbol,
    /// `None` when the average entry is unknown.
    pub avg_price: Option<Price>,
    pub position_size: Size,
    pub tracked: &'a HashSet<OrderId>,
}

#[derive(Debug, Clone, Default)]
pub struct TakeProfitClassifier {
    config: ClassifierConfig,
}

impl TakeProfitClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_take_profit_order(&self, order: &OpenOrder, ctx: &ClassifyContext<'_>) -> bool {
        if order.side != OrderSide::Sell
            || order.order_type != OrderType::Limit
            || order.symbol != *ctx.symbol
        {
            return false;
        }

        let Some(avg_price) = ctx.avg_price.filter(|p| p.is_positive()) else {
            return ctx.tracked.contains(&order.order_id);
        };

        let in_band = order
            .price
            .fraction_above(avg_price)
            .is_some_and(|f| {
                f > Decimal::ZERO && f >= self.config.min_profit && f <= self.config.max_profit
            });
        if !in_band {
            return false;
        }

        order.qty.inner() <= ctx.position_size.inner() * self.config.max_position_share
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: OrderSide, price: Decimal, qty: Decimal) -> OpenOrder {
        OpenOrder {
            order_id: OrderId::new("o-1"),
            symbol: Symbol::new("BTCUSDT"),
            side,
            order_type: OrderType::Limit,
            price: Price::new(price),
            qty: Size::new(qty),
        }
    }

    fn classify(order: &OpenOrder, avg: Option<Decimal>, tracked: &HashSet<OrderId>) -> bool {
        let symbol = Symbol::new("BTCUSDT");
        let ctx = ClassifyContext {
            symbol: &symbol,
            avg_price: avg.map(Price::new),
            position_size: Size::new(dec!(1)),
            tracked,
        };
        TakeProfitClassifier::default().is_take_profit_order(order, &ctx)
    }

    #[test]
    fn test_leg_inside_band_accepted() {
        let tracked = HashSet::new();
        assert!(classify(&order(OrderSide::Sell, dec!(105), dec!(0.3)), Some(dec!(100)), &tracked));
    }

    #[test]
    fn test_price_above_band_rejected() {
        let tracked = HashSet::new();
        assert!(!classify(&order(OrderSide::Sell, dec!(120), dec!(0.3)), Some(dec!(100)), &tracked));
    }

    #[test]
    fn test_price_below_band_rejected() {
        let tracked = HashSet::new();
        assert!(!classify(&order(OrderSide::Sell, dec!(100.05), dec!(0.3)), Some(dec!(100)), &tracked));
        assert!(!classify(&order(OrderSide::Sell, dec!(99), dec!(0.3)), Some(dec!(100)), &tracked));
    }

    #[test]
    fn test_buy_rejected() {
        let tracked = HashSet::new();
        assert!(!classify(&order(OrderSide::Buy, dec!(105), dec!(0.3)), Some(dec!(100)), &tracked));
    }

    #[test]
    fn test_full_exit_size_rejected() {
        let tracked = HashSet::new();
        assert!(!classify(&order(OrderSide::Sell, dec!(105), dec!(0.9)), Some(dec!(100)), &tracked));
    }

    #[test]
    fn test_other_symbol_and_market_rejected() {
        let tracked = HashSet::new();
        let mut other = order(OrderSide::Sell, dec!(105), dec!(0.3));
        other.symbol = Symbol::new("ETHUSDT");
        assert!(!classify(&other, Some(dec!(100)), &tracked));

        let mut market = order(OrderSide::Sell, dec!(105), dec!(0.3));
        market.order_type = OrderType::Market;
        assert!(!classify(&market, Some(dec!(100)), &tracked));
    }

    #[test]
    fn test_unknown_average_trusts_tracked_only() {
        let leg = order(OrderSide::Sell, dec!(105), dec!(0.3));
        assert!(!classify(&leg, None, &HashSet::new()));

        let tracked = HashSet::from([OrderId::new("o-1")]);
        assert!(classify(&leg, None, &tracked));
        assert!(classify(&leg, Some(dec!(0)), &tracked));
    }
}
