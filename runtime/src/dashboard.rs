//! Provider home screen.

use crate::MarketplaceEnvironment;
use crate::bookings::BookingService;
use crate::ratings::RatingService;
use crate::repository::Repository;
use marketplace_core::dashboard::ProviderDashboard;
use marketplace_core::error::Result;
use marketplace_core::rating::RatingSummary;
use marketplace_core::types::UserId;
use tracing::warn;

/// Assembles the provider dashboard.
#[derive(Clone, Debug)]
pub struct DashboardService {
    repo: Repository,
    bookings: BookingService,
    ratings: RatingService,
}

impl DashboardService {
    /// Build the service from the shared environment.
    #[must_use]
    pub fn new(env: &MarketplaceEnvironment) -> Self {
        Self {
            repo: env.repository(),
            bookings: BookingService::new(env),
            ratings: RatingService::new(env),
        }
    }

    /// Earnings, job counts, request count, the next few jobs and the
    /// rating.
    ///
    /// Loading the dashboard reconciles the provider's cached rating. If
    /// that fails the cached values are shown and the failure is only
    /// logged.
    ///
    /// # Errors
    ///
    /// `NotFound` / `NotPermitted` if the caller is not a provider,
    /// `Persistence` if the jobs cannot be read.
    #[tracing::instrument(skip(self), fields(provider = %provider_id))]
    pub async fn provider_dashboard(&self, provider_id: UserId) -> Result<ProviderDashboard> {
        let provider = self.repo.provider(provider_id).await?.record;
        let (jobs, requests) = futures::try_join!(
            self.repo.provider_bookings(provider_id),
            self.bookings.list_eligible_requests(provider_id)
        )?;

        let rating = match self.ratings.reconcile_provider_rating(provider_id).await {
            Ok(reconciled) => reconciled.summary,
            Err(e) => {
                warn!(error = %e, "Rating reconciliation failed, showing cached rating");
                provider
                    .provider_profile()
                    .map_or_else(RatingSummary::default, |p| RatingSummary {
                        average: p.rating,
                        count: p.review_count,
                    })
            }
        };

        Ok(ProviderDashboard::build(provider_id, &jobs, requests.len(), rating))
    }
}
