//! Seed records for tests and local runs.

use crate::mocks::test_time;
use marketplace_core::availability::WeeklySchedule;
use marketplace_core::document::{Collection, DocumentId, DocumentStore, StoreError, Version};
use marketplace_core::money::Money;
use marketplace_core::types::{
    PaymentDetails, ProviderProfile, Role, Service, ServiceId, User, UserId,
};
use serde::Serialize;

/// A customer account.
#[must_use]
pub fn customer(name: &str) -> User {
    User {
        id: UserId::new(),
        email: format!("{}@example.com", name.to_lowercase()),
        name: name.to_string(),
        role: Role::Customer,
        phone: Some("+91 98765 43210".to_string()),
        provider: None,
        created_at: test_time(),
    }
}

/// An onboarded provider offering `services`, on the standard schedule.
#[must_use]
pub fn provider(name: &str, services: &[&str]) -> User {
    User {
        id: UserId::new(),
        email: format!("{}@example.com", name.to_lowercase()),
        name: name.to_string(),
        role: Role::Provider,
        phone: None,
        provider: Some(ProviderProfile {
            services: services.iter().map(|s| (*s).to_string()).collect(),
            availability: WeeklySchedule::standard(),
            rating: 0.0,
            review_count: 0,
            payment_details: Some(PaymentDetails::Upi {
                upi_id: format!("{}@okbank", name.to_lowercase()),
            }),
            is_onboarded: true,
        }),
        created_at: test_time(),
    }
}

/// A provider who signed up but has not finished onboarding.
#[must_use]
pub fn new_provider(name: &str) -> User {
    let mut user = provider(name, &[]);
    user.provider = Some(ProviderProfile::default());
    user
}

/// An admin account.
#[must_use]
pub fn admin(name: &str) -> User {
    User {
        role: Role::Admin,
        phone: None,
        ..customer(name)
    }
}

/// A catalog service priced in whole units.
#[must_use]
pub fn service(name: &str, category: &str, base_price_units: u64) -> Service {
    Service {
        id: ServiceId::new(),
        name: name.to_string(),
        category: category.to_string(),
        base_price: Money::from_units(base_price_units),
        image: None,
        rating: 4.5,
        description: Some(format!("Professional {}", name.to_lowercase())),
    }
}

/// A small catalog covering a few categories.
#[must_use]
pub fn catalog() -> Vec<Service> {
    vec![
        service("Deep Cleaning", "Cleaning", 100),
        service("Bathroom Cleaning", "Cleaning", 60),
        service("Plumbing Repair", "Plumbing", 80),
        service("Electrical Repair", "Electrical", 70),
        service("Wall Painting", "Painting", 150),
    ]
}

/// Write one record as a JSON document.
///
/// # Errors
///
/// Returns the store's error, or `Serialization` if the record does not
/// serialize.
pub async fn put<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    collection: Collection,
    id: DocumentId,
    record: &T,
) -> Result<Version, StoreError> {
    let body = serde_json::to_value(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.create(collection, id, body).await
}

/// The cast most scenario tests start from.
#[derive(Debug, Clone)]
pub struct Seed {
    /// A customer.
    pub customer: User,
    /// An onboarded provider offering "Deep Cleaning" and "Bathroom Cleaning".
    pub provider: User,
    /// A second onboarded provider offering "Deep Cleaning".
    pub rival: User,
    /// A provider offering only "Plumbing Repair".
    pub plumber: User,
    /// An admin.
    pub admin: User,
    /// The catalog, "Deep Cleaning" (100) first.
    pub services: Vec<Service>,
}

impl Seed {
    /// Build the standard cast.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            customer: customer("Asha"),
            provider: provider("Ravi", &["Deep Cleaning", "Bathroom Cleaning"]),
            rival: provider("Meena", &["Deep Cleaning"]),
            plumber: provider("Arjun", &["Plumbing Repair"]),
            admin: admin("Root"),
            services: catalog(),
        }
    }

    /// The "Deep Cleaning" service.
    #[must_use]
    pub fn deep_cleaning(&self) -> &Service {
        &self.services[0]
    }

    /// Write every record to the store.
    ///
    /// # Errors
    ///
    /// Returns the first store error.
    pub async fn install(&self, store: &dyn DocumentStore) -> Result<(), StoreError> {
        for user in [&self.customer, &self.provider, &self.rival, &self.plumber, &self.admin] {
            put(store, Collection::Users, user.id.document_id(), user).await?;
        }
        for service in &self.services {
            put(store, Collection::Services, service.id.document_id(), service).await?;
        }
        Ok(())
    }
}
