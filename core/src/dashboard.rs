//! Provider dashboard figures.

use crate::money::Money;
use crate::rating::RatingSummary;
use crate::types::{Booking, BookingStatus, UserId};
use serde::Serialize;

/// How many upcoming jobs the dashboard lists.
pub const UPCOMING_PREVIEW: usize = 3;

/// At-a-glance view of a provider's business.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDashboard {
    /// Lifetime earnings from completed jobs.
    pub total_earnings: Money,
    /// Jobs accepted and not yet completed.
    pub active_jobs: usize,
    /// Jobs completed.
    pub completed_jobs: usize,
    /// Job requests waiting for this provider.
    pub pending_requests: usize,
    /// Soonest upcoming jobs.
    pub upcoming: Vec<Booking>,
    /// Rating recomputed from reviews.
    pub rating: RatingSummary,
    /// `"New"` or the average with one decimal.
    pub rating_label: String,
}

impl ProviderDashboard {
    /// Build the dashboard from the provider's jobs and eligible requests.
    #[must_use]
    pub fn build(
        provider_id: UserId,
        jobs: &[Booking],
        pending_requests: usize,
        rating: RatingSummary,
    ) -> Self {
        let mine = || jobs.iter().filter(|b| b.is_assigned_to(provider_id));

        let completed: Vec<&Booking> = mine()
            .filter(|b| b.status == BookingStatus::Completed)
            .collect();
        let mut upcoming: Vec<Booking> = mine()
            .filter(|b| b.status == BookingStatus::Upcoming)
            .cloned()
            .collect();
        upcoming.sort_by(|a, b| {
            a.scheduled_at()
                .cmp(&b.scheduled_at())
                .then_with(|| a.id.cmp(&b.id))
        });
        upcoming.truncate(UPCOMING_PREVIEW);

        Self {
            total_earnings: completed.iter().map(|b| b.price).sum(),
            active_jobs: mine().filter(|b| b.status.is_active()).count(),
            completed_jobs: completed.len(),
            pending_requests,
            upcoming,
            rating_label: rating.label(),
            rating,
        }
    }
}
