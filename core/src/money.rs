//! Money value object.
//!
//! Amounts are held in cents so that fee and balance arithmetic never touches
//! floating point. Serialized as a plain integer number of cents.

use crate::error::MarketplaceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units with overflow checking
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Creates a `Money` value from whole currency units, saturating on overflow
    #[must_use]
    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(100))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the whole units (rounded down)
    #[must_use]
    pub const fn units(&self) -> u64 {
        self.0 / 100
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two money amounts, saturating at the maximum
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts two money amounts (returns None if result would be negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Subtracts, clamping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Percentage of this amount, rounded half-up to the nearest cent.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub const fn checked_percent(self, percent: u32) -> Option<Self> {
        match self.0.checked_mul(percent as u64) {
            Some(product) => match product.checked_add(50) {
                Some(rounded) => Some(Self(rounded / 100)),
                None => None,
            },
            None => None,
        }
    }

    /// Parses an amount typed by a caller (`"120"`, `"120.5"`, `"120.50"`).
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::InvalidAmount`] when the input is empty,
    /// non-numeric, negative, zero, or carries more than two decimals.
    pub fn parse_amount(input: &str) -> Result<Self, MarketplaceError> {
        let trimmed = input.trim();
        let invalid = || MarketplaceError::InvalidAmount(format!("'{trimmed}' is not a valid amount"));

        if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.starts_with('+') {
            return Err(invalid());
        }

        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
            || fraction.len() > 2
        {
            return Err(invalid());
        }

        let units: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        let amount = units
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents))
            .map(Self)
            .ok_or_else(invalid)?;

        if amount.is_zero() {
            return Err(MarketplaceError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        Ok(amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.units(), self.0 % 100)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}
