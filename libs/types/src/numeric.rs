//! Exact integer amounts and price points
//!
//! Token amounts are integers scaled by token decimals and price points are
//! integers scaled by a pair-specific multiplier, so no arithmetic here ever
//! touches floating point. Every operation is checked and reports
//! [`ArithmeticError`] instead of wrapping.
//!
//! On the wire both types are decimal strings (big-integer JSON convention).
//! Deserialization also accepts plain JSON integers. Negative or fractional
//! input fails to decode.

use crate::errors::ArithmeticError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! integer_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(u128);

        impl $name {
            pub const ZERO: Self = Self(0);

            pub const fn new(value: u128) -> Self {
                Self(value)
            }

            pub const fn as_u128(&self) -> u128 {
                self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == 0
            }

            pub fn checked_add(self, rhs: Self) -> Result<Self, ArithmeticError> {
                self.0.checked_add(rhs.0).map(Self).ok_or(ArithmeticError::Overflow)
            }

            pub fn checked_sub(self, rhs: Self) -> Result<Self, ArithmeticError> {
                self.0.checked_sub(rhs.0).map(Self).ok_or(ArithmeticError::Underflow)
            }

            /// Big-endian bytes used in canonical hash preimages.
            pub fn to_be_bytes(&self) -> [u8; 16] {
                self.0.to_be_bytes()
            }
        }

        impl From<u128> for $name {
            fn from(value: u128) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ArithmeticError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_unsigned(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(UnsignedVisitor).map(Self)
            }
        }
    };
}

integer_newtype!(
    /// Base or quote token quantity in the token's smallest unit.
    Amount
);

integer_newtype!(
    /// Price scaled by the pair's pricepoint multiplier.
    PricePoint
);

impl Amount {
    /// Smaller of two amounts; the fill size of a crossing pair.
    pub fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }
}

/// `value * numerator / denominator` in exact integer arithmetic (floor).
pub fn checked_mul_div(
    value: u128,
    numerator: u128,
    denominator: u128,
) -> Result<u128, ArithmeticError> {
    if denominator == 0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    value
        .checked_mul(numerator)
        .map(|product| product / denominator)
        .ok_or(ArithmeticError::Overflow)
}

/// Quote-token consideration for `amount` base tokens at `pricepoint`.
pub fn quote_amount(
    amount: Amount,
    pricepoint: PricePoint,
    multiplier: u128,
) -> Result<Amount, ArithmeticError> {
    checked_mul_div(amount.as_u128(), pricepoint.as_u128(), multiplier).map(Amount::new)
}

fn parse_unsigned(s: &str) -> Result<u128, ArithmeticError> {
    let trimmed = s.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ArithmeticError::InvalidNumber(s.to_owned()));
    }
    trimmed
        .parse::<u128>()
        .map_err(|_| ArithmeticError::Overflow)
}

struct UnsignedVisitor;

impl<'de> Visitor<'de> for UnsignedVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a non-negative integer or decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
        Ok(u128::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
        u128::try_from(v).map_err(|_| E::custom(format!("negative value {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
        parse_unsigned(v).map_err(E::custom)
    }
}
