//! # Marketplace Runtime
//!
//! The imperative shell around `marketplace-core`.
//!
//! Services load records through a typed [`Repository`], make every
//! decision in the pure core, and write back with version-guarded
//! conditional writes. Nothing here holds an in-process lock: all
//! coordination between concurrent callers happens in the document store.
//!
//! ## Services
//!
//! - [`BookingService`]: checkout, accept / start / complete / cancel /
//!   reschedule, and the booking read models
//! - [`RatingService`]: reviews and provider rating reconciliation
//! - [`EarningsService`]: earnings summary, withdrawals, CSV report
//! - [`ProfileService`]: registration, onboarding, payout details, addresses
//! - [`CatalogService`]: services and the providers offering them
//! - [`DashboardService`]: the provider home screen
//! - [`RatingReconciler`]: background rating healing
//!
//! ## Example
//!
//! ```ignore
//! use marketplace_runtime::{Marketplace, MarketplaceEnvironment};
//!
//! let env = MarketplaceEnvironment::new(store, Arc::new(SystemClock), BookingPolicy::default());
//! let marketplace = Marketplace::new(env);
//!
//! let booking = marketplace.bookings.create_booking(customer_id, request).await?;
//! let booking = marketplace.bookings.accept_booking(booking.id, provider_id).await?;
//! ```

use marketplace_core::document::DocumentStore;
use marketplace_core::environment::Clock;
use marketplace_core::pricing::BookingPolicy;
use std::sync::Arc;
use std::time::Duration;

pub mod bookings;
pub mod catalog;
pub mod dashboard;
pub mod earnings;
/// Prometheus metrics for observability
pub mod metrics;
pub mod profiles;
pub mod ratings;
pub mod reconciler;
pub mod repository;

pub use bookings::{BookingService, JobFilter};
pub use catalog::CatalogService;
pub use dashboard::DashboardService;
pub use earnings::EarningsService;
pub use profiles::ProfileService;
pub use ratings::{RatingService, Reconciliation};
pub use reconciler::{RatingReconciler, ReconcileReport};
pub use repository::{Record, Repository, Versioned};

/// Dependencies shared by every service.
#[derive(Clone)]
pub struct MarketplaceEnvironment {
    /// Persistence.
    pub store: Arc<dyn DocumentStore>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Pricing and checkout rules.
    pub policy: BookingPolicy,
}

impl std::fmt::Debug for MarketplaceEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketplaceEnvironment")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl MarketplaceEnvironment {
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, policy: BookingPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// A repository over the store.
    #[must_use]
    pub fn repository(&self) -> Repository {
        Repository::new(Arc::clone(&self.store))
    }
}

/// Every service, built over one environment.
#[derive(Clone, Debug)]
pub struct Marketplace {
    /// Booking lifecycle.
    pub bookings: BookingService,
    /// Reviews and ratings.
    pub ratings: RatingService,
    /// Earnings and withdrawals.
    pub earnings: EarningsService,
    /// Accounts, onboarding, addresses.
    pub profiles: ProfileService,
    /// Catalog browsing.
    pub catalog: CatalogService,
    /// Provider dashboard.
    pub dashboard: DashboardService,
    env: MarketplaceEnvironment,
}

impl Marketplace {
    /// Build every service.
    #[must_use]
    pub fn new(env: MarketplaceEnvironment) -> Self {
        Self {
            bookings: BookingService::new(&env),
            ratings: RatingService::new(&env),
            earnings: EarningsService::new(&env),
            profiles: ProfileService::new(&env),
            catalog: CatalogService::new(&env),
            dashboard: DashboardService::new(&env),
            env,
        }
    }

    /// The environment the services share.
    #[must_use]
    pub const fn environment(&self) -> &MarketplaceEnvironment {
        &self.env
    }

    /// A background reconciler over the same environment.
    #[must_use]
    pub fn reconciler(&self, interval: Duration, concurrency: usize) -> RatingReconciler {
        RatingReconciler::new(&self.env, interval, concurrency)
    }
}
