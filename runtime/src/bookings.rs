//! Booking lifecycle service.
//!
//! Every mutation follows the same shape: read the booking with its version,
//! decide in [`marketplace_core::lifecycle::transition`], and write back only
//! on [`Outcome::Changed`] with the read version as the precondition. A
//! writer that slipped in between bumps the version, so the loser sees
//! [`MarketplaceError::Conflict`] and must re-fetch. Conditional writes are
//! never retried here.

use crate::MarketplaceEnvironment;
use crate::metrics::BookingMetrics;
use crate::repository::Repository;
use chrono::{NaiveDate, NaiveTime};
use marketplace_core::document::{Collection, Query};
use marketplace_core::environment::Clock;
use marketplace_core::error::{MarketplaceError, Result};
use marketplace_core::lifecycle::{
    self, AcceptingProvider, Actor, BookingAction, BookingRequest, Checkout, Outcome,
};
use marketplace_core::matching::{self, ProviderView};
use marketplace_core::pricing::BookingPolicy;
use marketplace_core::types::{Booking, BookingId, BookingStatus, Role, User, UserId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which of a provider's jobs to list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobFilter {
    /// Upcoming and in-progress jobs, soonest first.
    #[default]
    Active,
    /// Completed jobs, newest first.
    Completed,
    /// Every job ever assigned, newest first.
    All,
}

/// Creates bookings and drives them through their lifecycle.
#[derive(Clone)]
pub struct BookingService {
    repo: Repository,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl std::fmt::Debug for BookingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BookingService {
    /// Build the service from the shared environment.
    #[must_use]
    pub fn new(env: &MarketplaceEnvironment) -> Self {
        Self {
            repo: env.repository(),
            clock: Arc::clone(&env.clock),
            policy: env.policy,
        }
    }

    /// Check out a new booking for `customer_id`.
    ///
    /// # Errors
    ///
    /// - `Validation`: missing or malformed input, a past date, or a chosen
    ///   provider who cannot take the job
    /// - `NotFound`: the customer, service or chosen provider does not exist
    /// - `NotPermitted`: the caller is not a customer
    /// - `Persistence`: the store failed
    #[tracing::instrument(skip(self, request), fields(customer = %customer_id))]
    pub async fn create_booking(&self, customer_id: UserId, request: BookingRequest) -> Result<Booking> {
        let now = self.clock.now();
        let request = request.validate(now.date_naive())?;

        let customer = self.repo.user(customer_id).await?.record;
        let service = self.repo.service(request.service_id).await?;
        let provider = match request.provider_id {
            Some(id) => Some(self.repo.user(id).await?.record),
            None => None,
        };

        let booking = lifecycle::create_booking(
            BookingId::new(),
            request,
            Checkout {
                customer: &customer,
                service: &service,
                provider: provider.as_ref(),
            },
            &self.policy,
            now,
        )?;
        self.repo.create(Collection::Bookings, &booking).await?;

        BookingMetrics::record_created();
        info!(
            booking = %booking.id,
            service = %booking.service_name,
            total = %booking.total,
            open = booking.is_open(),
            "Booking created"
        );
        Ok(booking)
    }

    /// Claim a booking for `provider_id`.
    ///
    /// # Errors
    ///
    /// - `Conflict`: another provider got there first
    /// - `NotPermitted`: the caller is not an onboarded provider offering the
    ///   service, or the booking is reserved for someone else
    /// - `InvalidTransition`: the booking is completed or cancelled
    /// - `NotFound`: booking or provider absent
    #[tracing::instrument(skip(self), fields(booking = %booking_id, provider = %provider_id))]
    pub async fn accept_booking(&self, booking_id: BookingId, provider_id: UserId) -> Result<Booking> {
        let provider = self.repo.user(provider_id).await?.record;
        let accepting = AcceptingProvider::from_user(&provider)?;
        self.apply(booking_id, Actor::of(&provider), BookingAction::Accept(accepting))
            .await
    }

    /// Set a booking's status on behalf of `actor_id`.
    ///
    /// `upcoming` accepts, `in-progress` starts, `completed` completes and
    /// `cancelled` cancels. Moving back to `pending` is a reschedule, not a
    /// status update.
    ///
    /// # Errors
    ///
    /// `Validation` for `pending`, otherwise as for the underlying action.
    #[tracing::instrument(skip(self), fields(booking = %booking_id, actor = %actor_id, status = %status))]
    pub async fn update_booking_status(
        &self,
        booking_id: BookingId,
        actor_id: UserId,
        status: BookingStatus,
    ) -> Result<Booking> {
        let actor = self.repo.user(actor_id).await?.record;
        let action = match status {
            BookingStatus::Pending => {
                return Err(MarketplaceError::validation(
                    "a booking returns to pending only by rescheduling",
                ));
            }
            BookingStatus::Upcoming => BookingAction::Accept(AcceptingProvider::from_user(&actor)?),
            BookingStatus::InProgress => BookingAction::Start,
            BookingStatus::Completed => BookingAction::Complete,
            BookingStatus::Cancelled => BookingAction::Cancel,
        };
        self.apply(booking_id, Actor::of(&actor), action).await
    }

    /// Move a booking to a new slot. An accepted booking goes back to
    /// pending and must be confirmed again by its provider.
    ///
    /// # Errors
    ///
    /// - `NotPermitted`: the caller is not the booking's customer
    /// - `InvalidTransition`: the booking is completed or cancelled
    /// - `Validation`: the new date is in the past
    /// - `Conflict`: the booking changed since it was read
    #[tracing::instrument(skip(self), fields(booking = %booking_id, customer = %customer_id))]
    pub async fn reschedule_booking(
        &self,
        booking_id: BookingId,
        customer_id: UserId,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Booking> {
        let customer = self.repo.user(customer_id).await?.record;
        self.apply(
            booking_id,
            Actor::of(&customer),
            BookingAction::Reschedule { date, time },
        )
        .await
    }

    /// Cancel a booking. Cancelling twice is a no-op.
    ///
    /// # Errors
    ///
    /// - `NotPermitted`: the caller is neither the customer, the assigned
    ///   provider nor an admin
    /// - `InvalidTransition`: the booking is completed
    /// - `Conflict`: the booking changed since it was read
    #[tracing::instrument(skip(self), fields(booking = %booking_id, actor = %actor_id))]
    pub async fn cancel_booking(&self, booking_id: BookingId, actor_id: UserId) -> Result<Booking> {
        let actor = self.repo.user(actor_id).await?.record;
        self.apply(booking_id, Actor::of(&actor), BookingAction::Cancel)
            .await
    }

    async fn apply(&self, booking_id: BookingId, actor: Actor, action: BookingAction) -> Result<Booking> {
        let name = action.name();
        let current = self.repo.booking(booking_id).await?;

        let outcome = lifecycle::transition(&current.record, &actor, action, self.clock.now())
            .inspect_err(|e| {
                if e.is_conflict() {
                    BookingMetrics::record_conflict(name);
                }
            })?;

        match outcome {
            Outcome::Unchanged(booking) => {
                debug!(booking = %booking.id, action = name, "Transition was a no-op");
                Ok(booking)
            }
            Outcome::Changed(next) => {
                match self
                    .repo
                    .replace(Collection::Bookings, &next, current.version)
                    .await
                {
                    Ok(_) => {
                        BookingMetrics::record_transition(name);
                        info!(
                            booking = %next.id,
                            action = name,
                            from = %current.record.status,
                            to = %next.status,
                            "Booking transitioned"
                        );
                        Ok(next)
                    }
                    Err(e) if e.is_conflict() => {
                        BookingMetrics::record_conflict(name);
                        warn!(booking = %booking_id, action = name, "Booking changed concurrently");
                        Err(MarketplaceError::conflict(format!(
                            "booking {booking_id} changed while trying to {name}; re-fetch and try again"
                        )))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Load one booking as seen by `viewer_id`.
    ///
    /// Customers see their own bookings, providers see the jobs they hold
    /// and the requests they could accept, admins see everything.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `NotPermitted` if the viewer has no business
    /// with it.
    #[tracing::instrument(skip(self), fields(booking = %booking_id, viewer = %viewer_id))]
    pub async fn get_booking(&self, booking_id: BookingId, viewer_id: UserId) -> Result<Booking> {
        let viewer = self.repo.user(viewer_id).await?.record;
        let booking = self.repo.booking(booking_id).await?.record;
        if can_view(&booking, &viewer) {
            Ok(booking)
        } else {
            Err(MarketplaceError::not_permitted(format!(
                "user {viewer_id} may not view booking {booking_id}"
            )))
        }
    }

    /// A customer's bookings, newest first.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure.
    #[tracing::instrument(skip(self), fields(customer = %customer_id))]
    pub async fn list_customer_bookings(&self, customer_id: UserId) -> Result<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .repo
            .query_records(
                Collection::Bookings,
                Query::all().eq("customerId", customer_id.to_string()),
            )
            .await?;
        bookings.sort_by(matching::newest_first);
        Ok(bookings)
    }

    /// Jobs assigned to a provider.
    ///
    /// # Errors
    ///
    /// `NotFound` / `NotPermitted` if the caller is not a provider.
    #[tracing::instrument(skip(self), fields(provider = %provider_id, filter = ?filter))]
    pub async fn list_provider_jobs(&self, provider_id: UserId, filter: JobFilter) -> Result<Vec<Booking>> {
        self.repo.provider(provider_id).await?;
        let mut jobs: Vec<Booking> = self
            .repo
            .provider_bookings(provider_id)
            .await?
            .into_iter()
            .filter(|b| match filter {
                JobFilter::Active => b.status.is_active(),
                JobFilter::Completed => b.status == BookingStatus::Completed,
                JobFilter::All => true,
            })
            .collect();

        if filter == JobFilter::Active {
            jobs.sort_by(|a, b| {
                a.scheduled_at()
                    .cmp(&b.scheduled_at())
                    .then_with(|| a.id.cmp(&b.id))
            });
        } else {
            jobs.sort_by(matching::newest_first);
        }
        Ok(jobs)
    }

    /// Every booking, optionally narrowed to one status. Admin only.
    ///
    /// # Errors
    ///
    /// `NotPermitted` unless the caller is an admin.
    #[tracing::instrument(skip(self), fields(admin = %admin_id))]
    pub async fn list_all_bookings(&self, admin_id: UserId, status: Option<BookingStatus>) -> Result<Vec<Booking>> {
        let admin = self.repo.user(admin_id).await?.record;
        if admin.role != Role::Admin {
            return Err(MarketplaceError::not_permitted("only admins may list all bookings"));
        }
        let query = match status {
            Some(status) => Query::all().eq("status", status.as_str()),
            None => Query::all(),
        };
        let mut bookings: Vec<Booking> = self.repo.query_records(Collection::Bookings, query).await?;
        bookings.sort_by(matching::newest_first);
        Ok(bookings)
    }

    /// Pending bookings a provider may accept: open requests for a service
    /// they offer plus requests reserved for them. Newest first.
    ///
    /// # Errors
    ///
    /// `NotFound` / `NotPermitted` if the caller is not a provider.
    #[tracing::instrument(skip(self), fields(provider = %provider_id))]
    pub async fn list_eligible_requests(&self, provider_id: UserId) -> Result<Vec<Booking>> {
        let provider = self.repo.provider(provider_id).await?.record;
        let pending = self.pending_bookings().await?;
        with_view(&provider, |view| matching::eligible_requests(pending, view))
    }

    /// Eligible requests that also fall inside the provider's weekly hours.
    ///
    /// # Errors
    ///
    /// As for [`BookingService::list_eligible_requests`].
    #[tracing::instrument(skip(self), fields(provider = %provider_id))]
    pub async fn list_available_requests(&self, provider_id: UserId) -> Result<Vec<Booking>> {
        let provider = self.repo.provider(provider_id).await?.record;
        let pending = self.pending_bookings().await?;
        with_view(&provider, |view| matching::available_requests(pending, view))
    }

    async fn pending_bookings(&self) -> Result<Vec<Booking>> {
        self.repo
            .query_records(
                Collection::Bookings,
                Query::all().eq("status", BookingStatus::Pending.as_str()),
            )
            .await
    }
}

fn with_view<T>(provider: &User, f: impl FnOnce(ProviderView<'_>) -> T) -> Result<T> {
    let profile = provider.provider_profile().ok_or_else(|| {
        MarketplaceError::not_permitted(format!("user {} is not a provider", provider.id))
    })?;
    Ok(f(ProviderView {
        id: provider.id,
        services: &profile.services,
        availability: &profile.availability,
    }))
}

fn can_view(booking: &Booking, viewer: &User) -> bool {
    match viewer.role {
        Role::Admin => true,
        Role::Customer => booking.customer_id == viewer.id,
        Role::Provider => {
            booking.is_assigned_to(viewer.id)
                || viewer.provider_profile().is_some_and(|profile| {
                    matching::is_eligible(booking, viewer.id, &profile.services)
                })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use marketplace_testing::fixtures::Seed;
    use marketplace_testing::mocks::test_time;
    use marketplace_testing::{InMemoryDocumentStore, ManualClock};

    async fn setup() -> (BookingService, Seed, ManualClock) {
        let store = InMemoryDocumentStore::new();
        let seed = Seed::standard();
        seed.install(&store).await.unwrap();
        let clock = ManualClock::starting_now();
        let env = MarketplaceEnvironment::new(Arc::new(store), Arc::new(clock.clone()), BookingPolicy::default());
        (BookingService::new(&env), seed, clock)
    }

    fn request(seed: &Seed, days_ahead: i64) -> BookingRequest {
        BookingRequest {
            service_id: Some(seed.deep_cleaning().id),
            provider_id: None,
            date: Some(test_time().date_naive() + Duration::days(days_ahead)),
            time: NaiveTime::from_hms_opt(10, 0, 0),
            address: Some("12 MG Road, Pune".to_string()),
            ..BookingRequest::default()
        }
    }

    #[tokio::test]
    async fn creates_a_priced_open_booking() {
        let (service, seed, _) = setup().await;
        let booking = service
            .create_booking(seed.customer.id, request(&seed, 2))
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert!(booking.is_open());
        assert_eq!(booking.total, booking.price.checked_add(booking.service_fee).unwrap());
        assert_eq!(
            service.get_booking(booking.id, seed.customer.id).await.unwrap(),
            booking
        );
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let (service, seed, _) = setup().await;
        let mut req = request(&seed, 2);
        req.service_id = Some(marketplace_core::types::ServiceId::new());
        let err = service.create_booking(seed.customer.id, req).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::NotFound { resource: "service", .. }));
    }

    #[tokio::test]
    async fn pending_is_not_a_status_update() {
        let (service, seed, _) = setup().await;
        let booking = service
            .create_booking(seed.customer.id, request(&seed, 2))
            .await
            .unwrap();
        let err = service
            .update_booking_status(booking.id, seed.provider.id, BookingStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Validation(_)));
    }

    #[tokio::test]
    async fn status_updates_walk_the_lifecycle() {
        let (service, seed, clock) = setup().await;
        let booking = service
            .create_booking(seed.customer.id, request(&seed, 2))
            .await
            .unwrap();

        for status in [
            BookingStatus::Upcoming,
            BookingStatus::InProgress,
            BookingStatus::Completed,
        ] {
            clock.advance(Duration::minutes(5));
            let next = service
                .update_booking_status(booking.id, seed.provider.id, status)
                .await
                .unwrap();
            assert_eq!(next.status, status);
        }

        let jobs = service
            .list_provider_jobs(seed.provider.id, JobFilter::Completed)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(service
            .list_provider_jobs(seed.provider.id, JobFilter::Active)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn strangers_cannot_view_a_booking() {
        let (service, seed, _) = setup().await;
        let booking = service
            .create_booking(seed.customer.id, request(&seed, 2))
            .await
            .unwrap();

        // the plumber does not offer deep cleaning
        let err = service.get_booking(booking.id, seed.plumber.id).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::NotPermitted(_)));
        assert!(service.get_booking(booking.id, seed.rival.id).await.is_ok());
        assert!(service.get_booking(booking.id, seed.admin.id).await.is_ok());
    }

    #[tokio::test]
    async fn only_admins_list_everything() {
        let (service, seed, _) = setup().await;
        service
            .create_booking(seed.customer.id, request(&seed, 2))
            .await
            .unwrap();

        let all = service.list_all_bookings(seed.admin.id, None).await.unwrap();
        assert_eq!(all.len(), 1);
        let none = service
            .list_all_bookings(seed.admin.id, Some(BookingStatus::Completed))
            .await
            .unwrap();
        assert!(none.is_empty());

        let err = service
            .list_all_bookings(seed.customer.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::NotPermitted(_)));
    }

    #[tokio::test]
    async fn customer_bookings_are_newest_first() {
        let (service, seed, clock) = setup().await;
        let first = service
            .create_booking(seed.customer.id, request(&seed, 2))
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        let second = service
            .create_booking(seed.customer.id, request(&seed, 3))
            .await
            .unwrap();

        let ids: Vec<BookingId> = service
            .list_customer_bookings(seed.customer.id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
