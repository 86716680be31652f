//! Precision-safe decimal types for trading.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. Prices and quantities get
//! distinct newtypes so a quantity can never be passed where a price is expected.
//! Venue responses carry numbers as strings; [`parse_venue_decimal`] is the only
//! sanctioned way to turn them into values.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

use crate::error::CoreError;

/// Tokens some venues emit in place of a number.
const INVALID_TOKENS: &[&str] = &[
    "nan",
    "-nan",
    "inf",
    "-inf",
    "infinity",
    "-infinity",
    "null",
    "none",
    "undefined",
    "n/a",
    "-",
];

/// Parse a numeric field reported by the venue.
///
/// Rejects empty strings, whitespace-only values and sentinel tokens such as
/// `"NaN"` or `"null"` instead of letting them default to zero.
pub fn parse_venue_decimal(field: &str, raw: &str) -> Result<Decimal, CoreError> {
    let trimmed = raw.trim();
    let invalid = || CoreError::InvalidNumber {
        field: field.to_string(),
        value: raw.to_string(),
    };

    if trimmed.is_empty() {
        return Err(invalid());
    }
    let lowered = trimmed.to_ascii_lowercase();
    if INVALID_TOKENS.contains(&lowered.as_str()) {
        return Err(invalid());
    }

    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| invalid())
}

macro_rules! decimal_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Decimal);

        impl $name {
            pub const ZERO: Self = Self(Decimal::ZERO);

            #[inline]
            pub fn new(value: Decimal) -> Self {
                Self(value)
            }

            #[inline]
            pub fn inner(&self) -> Decimal {
                self.0
            }

            #[inline]
            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            #[inline]
            pub fn is_positive(&self) -> bool {
                self.0 > Decimal::ZERO
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.normalize())
            }
        }

        impl FromStr for $name {
            type Err = rust_decimal::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<Decimal> for $name {
            fn from(d: Decimal) -> Self {
                Self(d)
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul<Decimal> for $name {
            type Output = Self;

            fn mul(self, rhs: Decimal) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<Decimal> for $name {
            type Output = Self;

            fn div(self, rhs: Decimal) -> Self::Output {
                Self(self.0 / rhs)
            }
        }
    };
}

decimal_newtype!(
    /// Price in quote currency with exact decimal precision.
    Price
);

decimal_newtype!(
    /// Quantity in base currency with exact decimal precision.
    Size
);

impl Price {
    /// Round down to the venue tick size.
    #[inline]
    pub fn round_to_tick(&self, tick_size: Price) -> Self {
        if !tick_size.is_positive() {
            return *self;
        }
        Self((self.0 / tick_size.0).floor() * tick_size.0)
    }

    /// Relative distance from `reference`, as a fraction (0.01 = 1%).
    ///
    /// Returns `None` when the reference is not positive.
    #[inline]
    pub fn fraction_above(&self, reference: Price) -> Option<Decimal> {
        if !reference.is_positive() {
            return None;
        }
        Some((self.0 - reference.0) / reference.0)
    }
}

impl Size {
    /// Round down to the venue quantity step.
    #[inline]
    pub fn round_to_step(&self, step: Size) -> Self {
        if !step.is_positive() {
            return *self;
        }
        Self((self.0 / step.0).floor() * step.0)
    }

    /// Notional value: size * price.
    #[inline]
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_rejects_empty_and_whitespace() {
        assert!(parse_venue_decimal("size", "").is_err());
        assert!(parse_venue_decimal("size", "   ").is_err());
        assert!(parse_venue_decimal("size", "\t\n").is_err());
    }

    #[test]
    fn test_parse_rejects_sentinel_tokens() {
        for raw in ["NaN", "null", "undefined", "Infinity", "-", "N/A"] {
            assert!(parse_venue_decimal("avgPrice", raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn test_parse_accepts_padded_and_scientific() {
        assert_eq!(parse_venue_decimal("size", " 0.015 ").unwrap(), dec!(0.015));
        assert_eq!(parse_venue_decimal("size", "1e-3").unwrap(), dec!(0.001));
    }

    #[test]
    fn test_price_round_to_tick() {
        let price = Price::new(dec!(101.23456));
        assert_eq!(price.round_to_tick(Price::new(dec!(0.01))).inner(), dec!(101.23));
        assert_eq!(price.round_to_tick(Price::ZERO), price);
    }

    #[test]
    fn test_size_round_to_step() {
        let size = Size::new(dec!(0.20349));
        assert_eq!(size.round_to_step(Size::new(dec!(0.001))).inner(), dec!(0.203));
    }

    #[test]
    fn test_fraction_above() {
        let tp = Price::new(dec!(105));
        assert_eq!(tp.fraction_above(Price::new(dec!(100))), Some(dec!(0.05)));
        assert_eq!(tp.fraction_above(Price::ZERO), None);
    }

    #[test]
    fn test_display_is_normalized() {
        assert_eq!(Size::new(dec!(0.2000)).to_string(), "0.2");
    }
}
