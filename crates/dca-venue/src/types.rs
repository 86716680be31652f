//! Records exchanged with a venue.

use dca_core::{
    parse_venue_decimal, Category, CoreError, OrderId, OrderLinkId, OrderSide, OrderType, Price,
    Size, Symbol,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A position record as reported by the venue.
///
/// Numeric fields stay as the venue's strings; they are parsed by the consumer
/// with [`parse_venue_decimal`] so malformed values are rejected, not zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePosition {
    pub symbol: String,
    /// "Buy", "Sell", or "" when flat.
    pub side: String,
    pub size: String,
    pub position_value: String,
    pub avg_price: String,
    pub mark_price: String,
    pub unrealised_pnl: String,
}

impl VenuePosition {
    pub fn size(&self) -> Result<Decimal, CoreError> {
        parse_venue_decimal("size", &self.size)
    }

    pub fn notional(&self) -> Result<Decimal, CoreError> {
        parse_venue_decimal("positionValue", &self.position_value)
    }

    pub fn avg_price(&self) -> Result<Decimal, CoreError> {
        parse_venue_decimal("avgPrice", &self.avg_price)
    }

    pub fn is_sell(&self) -> bool {
        self.side.eq_ignore_ascii_case("sell")
    }
}

/// An order currently resting on the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Price,
    pub qty: Size,
}

/// Order submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    pub category: Category,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Size,
    /// Required for limit orders, ignored for market orders.
    pub price: Option<Price>,
    pub reduce_only: bool,
    pub link_id: OrderLinkId,
}

impl PlaceOrderRequest {
    pub fn market(
        category: Category,
        symbol: Symbol,
        side: OrderSide,
        qty: Size,
        link_prefix: &str,
    ) -> Self {
        Self {
            category,
            symbol,
            side,
            order_type: OrderType::Market,
            qty,
            price: None,
            reduce_only: false,
            link_id: OrderLinkId::new(link_prefix),
        }
    }

    pub fn limit(
        category: Category,
        symbol: Symbol,
        side: OrderSide,
        qty: Size,
        price: Price,
        link_prefix: &str,
    ) -> Self {
        Self {
            category,
            symbol,
            side,
            order_type: OrderType::Limit,
            qty,
            price: Some(price),
            reduce_only: false,
            link_id: OrderLinkId::new(link_prefix),
        }
    }

    #[must_use]
    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// Venue acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub status: String,
    pub cum_exec_qty: Size,
    pub cum_exec_value: Decimal,
    pub avg_price: Price,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_fields_reject_malformed() {
        let record = VenuePosition {
            symbol: "BTCUSDT".into(),
            side: "Buy".into(),
            size: "0.5".into(),
            position_value: "  ".into(),
            avg_price: "NaN".into(),
            mark_price: "100".into(),
            unrealised_pnl: "".into(),
        };
        assert_eq!(record.size().unwrap(), dec!(0.5));
        assert!(record.notional().is_err());
        assert!(record.avg_price().is_err());
        assert!(!record.is_sell());
    }

    #[test]
    fn test_limit_request() {
        let req = PlaceOrderRequest::limit(
            Category::Linear,
            Symbol::new("BTCUSDT"),
            OrderSide::Sell,
            Size::new(dec!(0.1)),
            Price::new(dec!(101)),
            "tp1",
        )
        .reduce_only();
        assert_eq!(req.order_type, OrderType::Limit);
        assert!(req.reduce_only);
        assert!(req.link_id.as_str().starts_with("tp1_"));
    }
}
