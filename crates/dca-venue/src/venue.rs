//! The venue contract.
//!
//! Any adapter implementing [`Venue`] can drive the bot; no wire format is
//! assumed. Methods return boxed futures so the trait stays dyn-compatible.

use std::pin::Pin;
use std::sync::Arc;

use dca_core::{Category, OrderId, Price, Symbol, TradingConstraints};
use rust_decimal::Decimal;

use crate::error::VenueResult;
use crate::types::{OpenOrder, OrderAck, PlaceOrderRequest, VenuePosition};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub trait Venue: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &str;

    fn get_positions<'a>(
        &'a self,
        category: Category,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<Vec<VenuePosition>>>;

    fn get_open_orders<'a>(
        &'a self,
        category: Category,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<Vec<OpenOrder>>>;

    fn place_order(&self, request: PlaceOrderRequest) -> BoxFuture<'_, VenueResult<OrderAck>>;

    fn cancel_order<'a>(
        &'a self,
        category: Category,
        symbol: &'a Symbol,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, VenueResult<()>>;

    fn get_latest_price<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, VenueResult<Price>>;

    fn get_trading_constraints<'a>(
        &'a self,
        category: Category,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, VenueResult<TradingConstraints>>;

    /// Available balance of `coin`.
    fn get_balance<'a>(&'a self, coin: &'a str) -> BoxFuture<'a, VenueResult<Decimal>>;

    /// The last `limit` close prices, oldest first.
    fn get_klines<'a>(
        &'a self,
        symbol: &'a Symbol,
        limit: usize,
    ) -> BoxFuture<'a, VenueResult<Vec<Price>>>;

    /// Whether calls already retry failures internally, so callers should not
    /// add their own retry loop on top.
    fn retries_calls(&self) -> bool {
        false
    }

    /// Release connections. Default: nothing to release.
    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

/// Arc wrapper for Venue trait objects.
pub type DynVenue = Arc<dyn Venue>;
