//! Provider rating math.
//!
//! The provider's `rating` and `reviewCount` fields are a cache. The truth is
//! the set of reviews, and [`RatingSummary::from_ratings`] recomputes it.

use crate::error::MarketplaceError;
use serde::{Deserialize, Serialize};

/// Largest drift between cached and computed average that is tolerated.
pub const RECONCILE_TOLERANCE: f64 = 0.05;

/// Lowest allowed star rating.
pub const MIN_RATING: u8 = 1;

/// Highest allowed star rating.
pub const MAX_RATING: u8 = 5;

/// Average rating and review count of a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Average stars, rounded to one decimal; 0 when there are no reviews.
    pub average: f64,
    /// Number of reviews.
    pub count: u32,
}

/// Round to one decimal place.
#[must_use]
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl RatingSummary {
    /// Compute the summary of a set of star ratings.
    ///
    /// # Examples
    ///
    /// ```
    /// use marketplace_core::rating::RatingSummary;
    ///
    /// let summary = RatingSummary::from_ratings([5, 4, 3]);
    /// assert_eq!(summary.average, 4.0);
    /// assert_eq!(summary.count, 3);
    /// assert_eq!(RatingSummary::from_ratings([]).label(), "New");
    /// ```
    #[must_use]
    pub fn from_ratings(ratings: impl IntoIterator<Item = u8>) -> Self {
        let (sum, count) = ratings
            .into_iter()
            .fold((0_u64, 0_u32), |(sum, count), r| {
                (sum + u64::from(r), count.saturating_add(1))
            });
        if count == 0 {
            return Self::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let average = sum as f64 / f64::from(count);
        Self {
            average: round1(average),
            count,
        }
    }

    /// Whether the cached values have drifted from this computed summary.
    #[must_use]
    pub fn differs_from(&self, stored_average: f64, stored_count: u32) -> bool {
        (stored_average - self.average).abs() > RECONCILE_TOLERANCE || stored_count != self.count
    }

    /// Display label: `"New"` without reviews, else the average with one decimal.
    #[must_use]
    pub fn label(&self) -> String {
        if self.count == 0 {
            "New".to_string()
        } else {
            format!("{:.1}", self.average)
        }
    }
}

/// Check a submitted star rating.
///
/// # Errors
///
/// Returns [`MarketplaceError::Validation`] unless `1 <= rating <= 5`.
pub fn validate_rating(rating: u8) -> Result<u8, MarketplaceError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(MarketplaceError::validation(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
        )))
    }
}
