//! Core domain types for the DCA take-profit bot.
//!
//! This crate provides fundamental types used throughout the trading system:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `parse_venue_decimal`: Strict parsing of venue-reported numeric strings
//! - `TradingConstraints`: Venue minimums, quantity step and tick size
//! - `OrderSide`, `OrderType`, `OrderId`: Trading enums and identifiers

pub mod decimal;
pub mod error;
pub mod market;
pub mod order;

pub use decimal::{parse_venue_decimal, Price, Size};
pub use error::{CoreError, Result};
pub use market::{Category, Symbol, TradingConstraints};
pub use order::{OrderId, OrderLinkId, OrderSide, OrderType};
