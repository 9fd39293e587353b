//! Shared setup for runtime integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::{NaiveDate, NaiveTime};
use marketplace_core::document::DocumentStore;
use marketplace_core::lifecycle::BookingRequest;
use marketplace_core::pricing::BookingPolicy;
use marketplace_core::types::{Booking, ServiceId};
use marketplace_runtime::{Marketplace, MarketplaceEnvironment};
use marketplace_testing::fixtures::Seed;
use marketplace_testing::{FaultInjectingStore, InMemoryDocumentStore, ManualClock};
use std::sync::Arc;

pub struct World {
    pub marketplace: Marketplace,
    pub seed: Seed,
    pub store: InMemoryDocumentStore,
    pub faults: FaultInjectingStore,
    pub clock: ManualClock,
}

/// Route service logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub async fn world() -> World {
    init_tracing();
    let store = InMemoryDocumentStore::new();
    let seed = Seed::standard();
    seed.install(&store).await.unwrap();

    let faults = FaultInjectingStore::new(Arc::new(store.clone()));
    let clock = ManualClock::starting_now();
    let store_handle: Arc<dyn DocumentStore> = Arc::new(faults.clone());
    let env = MarketplaceEnvironment::new(store_handle, Arc::new(clock.clone()), BookingPolicy::default());

    World {
        marketplace: Marketplace::new(env),
        seed,
        store,
        faults,
        clock,
    }
}

/// 2024-06-01, a Saturday twelve days after the test clock's start.
pub fn june_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn ten_am() -> NaiveTime {
    NaiveTime::from_hms_opt(10, 0, 0).unwrap()
}

pub fn checkout(service_id: ServiceId) -> BookingRequest {
    BookingRequest {
        service_id: Some(service_id),
        date: Some(june_first()),
        time: Some(ten_am()),
        address: Some("Address X".to_string()),
        ..BookingRequest::default()
    }
}

impl World {
    /// Book deep cleaning as the seed customer.
    pub async fn open_booking(&self) -> Booking {
        self.marketplace
            .bookings
            .create_booking(self.seed.customer.id, checkout(self.seed.deep_cleaning().id))
            .await
            .unwrap()
    }

    /// Book, accept, start and complete a deep cleaning job for the seed provider.
    pub async fn completed_job(&self) -> Booking {
        let bookings = &self.marketplace.bookings;
        let provider = self.seed.provider.id;
        let booking = self.open_booking().await;
        bookings.accept_booking(booking.id, provider).await.unwrap();
        bookings
            .update_booking_status(booking.id, provider, marketplace_core::types::BookingStatus::InProgress)
            .await
            .unwrap();
        bookings
            .update_booking_status(booking.id, provider, marketplace_core::types::BookingStatus::Completed)
            .await
            .unwrap()
    }
}
