//! Reviews and provider rating reconciliation.
//!
//! A provider's `rating` / `reviewCount` are a cache over the reviews
//! collection. Submitting a review refreshes the cache best effort; the
//! refresh can fail without failing the review, and
//! [`RatingService::reconcile_provider_rating`] (run from the dashboard and
//! the background reconciler) heals any drift later.

use crate::MarketplaceEnvironment;
use crate::metrics::RatingMetrics;
use crate::repository::Repository;
use marketplace_core::document::{Collection, Query};
use marketplace_core::environment::Clock;
use marketplace_core::error::{MarketplaceError, Result};
use marketplace_core::rating::{RatingSummary, validate_rating};
use marketplace_core::types::{BookingId, BookingStatus, Review, ReviewId, UserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest accepted review comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 2000;

/// Result of reconciling one provider.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// Provider checked.
    pub provider_id: UserId,
    /// Summary computed from the provider's reviews.
    pub summary: RatingSummary,
    /// Whether the cached fields had drifted and were rewritten.
    pub corrected: bool,
}

/// Submits reviews and keeps provider ratings in line with them.
#[derive(Clone)]
pub struct RatingService {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RatingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatingService").finish_non_exhaustive()
    }
}

impl RatingService {
    /// Build the service from the shared environment.
    #[must_use]
    pub fn new(env: &MarketplaceEnvironment) -> Self {
        Self {
            repo: env.repository(),
            clock: Arc::clone(&env.clock),
        }
    }

    /// Review a completed booking.
    ///
    /// The review and the booking's `isReviewed` flag are written in one
    /// batch guarded by the booking's version, so neither can exist without
    /// the other. The provider's cached rating is refreshed afterwards; a
    /// failure there is logged and does not fail the review.
    ///
    /// # Errors
    ///
    /// - `NotFound`: the booking does not exist
    /// - `NotPermitted`: the caller is not the booking's customer
    /// - `InvalidTransition`: the booking is not completed
    /// - `Conflict`: the booking was already reviewed, or changed meanwhile
    /// - `Validation`: the rating is outside 1..=5 or the comment is too long
    #[tracing::instrument(skip(self, comment), fields(booking = %booking_id, customer = %customer_id, rating))]
    pub async fn submit_review(
        &self,
        booking_id: BookingId,
        customer_id: UserId,
        rating: u8,
        comment: String,
    ) -> Result<Review> {
        let booking = self.repo.booking(booking_id).await?;
        if booking.record.customer_id != customer_id {
            return Err(MarketplaceError::not_permitted(format!(
                "only the customer may review booking {booking_id}"
            )));
        }
        if booking.record.status != BookingStatus::Completed {
            return Err(MarketplaceError::InvalidTransition {
                from: booking.record.status.to_string(),
                action: "review".to_string(),
            });
        }
        if booking.record.is_reviewed || self.review_exists(booking_id).await? {
            return Err(MarketplaceError::conflict(format!(
                "booking {booking_id} has already been reviewed"
            )));
        }
        let rating = validate_rating(rating)?;
        let comment = comment.trim().to_string();
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return Err(MarketplaceError::validation(format!(
                "comment must be at most {MAX_COMMENT_CHARS} characters"
            )));
        }
        let provider_id = booking.record.provider_id.ok_or_else(|| {
            MarketplaceError::Persistence(format!("completed booking {booking_id} has no provider"))
        })?;

        let now = self.clock.now();
        let review = Review {
            id: ReviewId::new(),
            booking_id,
            provider_id,
            customer_id,
            customer_name: booking.record.customer_name.clone(),
            service_name: booking.record.service_name.clone(),
            rating,
            comment,
            created_at: now,
        };
        let mut reviewed = booking.record.clone();
        reviewed.is_reviewed = true;
        reviewed.updated_at = now;

        self.repo
            .batch(vec![
                Repository::create_op(Collection::Reviews, &review)?,
                Repository::update_op(Collection::Bookings, &reviewed, booking.version)?,
            ])
            .await?;

        RatingMetrics::record_review();
        info!(review = %review.id, provider = %provider_id, rating, "Review submitted");

        if let Err(e) = self.reconcile_provider_rating(provider_id).await {
            warn!(provider = %provider_id, error = %e, "Rating refresh after review failed");
        }
        Ok(review)
    }

    async fn review_exists(&self, booking_id: BookingId) -> Result<bool> {
        let existing: Vec<Review> = self
            .repo
            .query_records(
                Collection::Reviews,
                Query::all().eq("bookingId", booking_id.to_string()),
            )
            .await?;
        Ok(!existing.is_empty())
    }

    /// Summary computed from a provider's reviews.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure.
    pub async fn computed_rating(&self, provider_id: UserId) -> Result<RatingSummary> {
        let reviews = self.reviews_of(provider_id).await?;
        Ok(RatingSummary::from_ratings(reviews.iter().map(|r| r.rating)))
    }

    /// Recompute a provider's rating from reviews and rewrite the cached
    /// fields when they drifted.
    ///
    /// # Errors
    ///
    /// - `NotFound` / `NotPermitted`: no such provider
    /// - `Conflict`: the profile changed while being corrected
    /// - `Persistence`: the store failed
    #[tracing::instrument(skip(self), fields(provider = %provider_id))]
    pub async fn reconcile_provider_rating(&self, provider_id: UserId) -> Result<Reconciliation> {
        let result = self.reconcile(provider_id).await;
        match &result {
            Ok(r) if r.corrected => RatingMetrics::record_reconciliation("corrected"),
            Ok(_) => RatingMetrics::record_reconciliation("unchanged"),
            Err(_) => RatingMetrics::record_reconciliation("failed"),
        }
        result
    }

    async fn reconcile(&self, provider_id: UserId) -> Result<Reconciliation> {
        let provider = self.repo.provider(provider_id).await?;
        let summary = self.computed_rating(provider_id).await?;

        let mut user = provider.record;
        let Some(profile) = user.provider.as_mut() else {
            return Err(MarketplaceError::not_permitted(format!(
                "user {provider_id} is not a provider"
            )));
        };
        if !summary.differs_from(profile.rating, profile.review_count) {
            debug!(average = summary.average, count = summary.count, "Rating up to date");
            return Ok(Reconciliation {
                provider_id,
                summary,
                corrected: false,
            });
        }

        let (stale_average, stale_count) = (profile.rating, profile.review_count);
        profile.rating = summary.average;
        profile.review_count = summary.count;
        self.repo
            .replace(Collection::Users, &user, provider.version)
            .await?;

        info!(
            stale_average,
            stale_count,
            average = summary.average,
            count = summary.count,
            "Provider rating corrected"
        );
        Ok(Reconciliation {
            provider_id,
            summary,
            corrected: true,
        })
    }

    /// A provider's reviews, newest first.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure.
    #[tracing::instrument(skip(self), fields(provider = %provider_id))]
    pub async fn list_provider_reviews(&self, provider_id: UserId) -> Result<Vec<Review>> {
        let mut reviews = self.reviews_of(provider_id).await?;
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(reviews)
    }

    async fn reviews_of(&self, provider_id: UserId) -> Result<Vec<Review>> {
        self.repo
            .query_records(
                Collection::Reviews,
                Query::all().eq("providerId", provider_id.to_string()),
            )
            .await
    }
}
