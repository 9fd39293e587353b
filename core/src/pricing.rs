//! Booking policy and checkout pricing.

use crate::error::MarketplaceError;
use crate::money::Money;
use serde::{Deserialize, Serialize};

/// Marketplace-wide booking rules, injected from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPolicy {
    /// Platform fee charged on top of the service price, in percent.
    pub service_fee_percent: u32,
    /// Reject checkouts for a chosen provider outside their weekly schedule.
    pub enforce_availability: bool,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            service_fee_percent: 10,
            enforce_availability: false,
        }
    }
}

/// Price breakdown of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// Service price, what the provider earns.
    pub price: Money,
    /// Platform fee.
    pub service_fee: Money,
    /// What the customer pays.
    pub total: Money,
}

impl BookingPolicy {
    /// Price a service at checkout.
    ///
    /// The fee is `price * percent / 100`, rounded half-up to the cent.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] if the arithmetic overflows.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::money::Money;
    /// use marketplace_core::pricing::BookingPolicy;
    ///
    /// let quote = BookingPolicy::default().quote(Money::from_units(100)).unwrap();
    /// assert_eq!(quote.service_fee, Money::from_units(10));
    /// assert_eq!(quote.total, Money::from_units(110));
    /// ```
    pub fn quote(&self, price: Money) -> Result<PriceQuote, MarketplaceError> {
        let overflow = || MarketplaceError::validation(format!("price {price} is too large"));
        let service_fee = price
            .checked_percent(self.service_fee_percent)
            .ok_or_else(overflow)?;
        let total = price.checked_add(service_fee).ok_or_else(overflow)?;
        Ok(PriceQuote {
            price,
            service_fee,
            total,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_fee_is_ten_percent() {
        let quote = BookingPolicy::default().quote(Money::from_units(100)).unwrap();
        assert_eq!(quote.price, Money::from_units(100));
        assert_eq!(quote.service_fee, Money::from_units(10));
        assert_eq!(quote.total, Money::from_units(110));
    }

    #[test]
    fn fee_rounds_to_nearest_cent() {
        let policy = BookingPolicy {
            service_fee_percent: 15,
            enforce_availability: false,
        };
        // 15% of 3.33 = 0.4995
        let quote = policy.quote(Money::from_cents(333)).unwrap();
        assert_eq!(quote.service_fee, Money::from_cents(50));
        assert_eq!(quote.total, Money::from_cents(383));
    }

    #[test]
    fn zero_percent_means_no_fee() {
        let policy = BookingPolicy {
            service_fee_percent: 0,
            enforce_availability: false,
        };
        let quote = policy.quote(Money::from_units(80)).unwrap();
        assert!(quote.service_fee.is_zero());
        assert_eq!(quote.total, quote.price);
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let result = BookingPolicy::default().quote(Money::from_cents(u64::MAX));
        assert!(matches!(result, Err(MarketplaceError::Validation(_))));
    }
}
