//! Decimal money arithmetic.
//!
//! Amounts are held as a count of ten-thousandths of a dollar, matching the
//! `DECIMAL(10,4)` columns on the order backend. Every operation is integer
//! arithmetic on that scaled value, so summing a thousand two-decimal prices
//! lands exactly where it should.

use std::{
    fmt,
    iter::Sum,
    ops::{Add, Sub},
    str::FromStr,
};

use decimal_percentage::Percentage;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use rusty_money::{Money, iso};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-point scale: one dollar is 10,000 units.
pub const SCALE: i64 = 10_000;

/// Decimal places carried by [`Amount`].
pub const SCALE_DP: u32 = 4;

/// Decimal places shown to customers.
pub const DISPLAY_DP: u32 = 2;

/// Errors converting into an [`Amount`].
#[derive(Debug, Error, PartialEq)]
pub enum AmountError {
    /// The value does not fit in the scaled representation.
    #[error("amount {0} is out of range")]
    OutOfRange(Decimal),

    /// The text is not a decimal number.
    #[error("invalid amount: {0}")]
    Parse(#[from] rust_decimal::Error),
}

/// The singapore GST rate (9%).
pub fn gst_rate() -> Percentage {
    Percentage::from(Decimal::new(9, 2))
}

/// A monetary amount in SGD, exact to four decimal places.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount {
    scaled: i64,
}

impl Amount {
    /// Zero dollars.
    pub const ZERO: Self = Self { scaled: 0 };

    /// Wrap an already-scaled value (ten-thousandths of a dollar).
    pub const fn from_scaled(scaled: i64) -> Self {
        Self { scaled }
    }

    /// Build an amount from whole cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self {
            scaled: cents.saturating_mul(SCALE / 100),
        }
    }

    /// Convert a decimal, rounding half away from zero to four places.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::OutOfRange`] when the scaled value overflows `i64`.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        value
            .checked_mul(Decimal::from(SCALE))
            .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|scaled| scaled.to_i64())
            .map(Self::from_scaled)
            .ok_or(AmountError::OutOfRange(value))
    }

    /// The scaled integer value.
    pub const fn scaled(self) -> i64 {
        self.scaled
    }

    /// The amount as a decimal with four places.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.scaled, SCALE_DP)
    }

    /// Whole cents, rounding half away from zero.
    pub fn to_cents(self) -> i64 {
        self.round_dp(DISPLAY_DP).scaled / (SCALE / 100)
    }

    /// Multiply by a line quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self {
            scaled: self.scaled.saturating_mul(i64::from(quantity)),
        }
    }

    /// Multiply by an arbitrary factor, rounding the scaled result to the
    /// nearest unit.
    #[must_use]
    pub fn multiply(self, factor: Decimal) -> Self {
        let product = Decimal::from(self.scaled)
            .checked_mul(factor)
            .map(|scaled| scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|scaled| scaled.to_i64());

        match product {
            Some(scaled) => Self { scaled },
            None if factor.is_sign_negative() == (self.scaled < 0) => Self { scaled: i64::MAX },
            None => Self { scaled: i64::MIN },
        }
    }

    /// GST on this amount, rounded to four decimal places.
    #[must_use]
    pub fn gst(self) -> Self {
        // `Percentage` keeps its decimal private; multiplying by one exposes it.
        self.multiply(gst_rate() * Decimal::ONE)
    }

    /// This amount plus GST, rounded to cents for display.
    #[must_use]
    pub fn with_gst_for_display(self) -> Self {
        (self + self.gst()).round_dp(DISPLAY_DP)
    }

    /// Round to `dp` decimal places (at most four).
    #[must_use]
    pub fn round_dp(self, dp: u32) -> Self {
        let rounded = self
            .to_decimal()
            .round_dp_with_strategy(dp.min(SCALE_DP), RoundingStrategy::MidpointAwayFromZero);

        Self::from_decimal(rounded).unwrap_or(self)
    }

    /// Render as currency for customers, e.g. `$6.76`.
    pub fn format(self) -> String {
        Money::from_minor(self.to_cents(), iso::SGD).to_string()
    }

    /// Whether the amount is zero.
    pub const fn is_zero(self) -> bool {
        self.scaled == 0
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            scaled: self.scaled.saturating_add(rhs.scaled),
        }
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            scaled: self.scaled.saturating_sub(rhs.scaled),
        }
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.to_decimal()
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_decimal(Decimal::from_str(value.trim())?)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_decimal(), f)
    }
}
