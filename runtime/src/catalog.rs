//! Read-only view of the service catalog and the providers behind it.

use crate::MarketplaceEnvironment;
use crate::repository::Repository;
use marketplace_core::document::{Collection, Query};
use marketplace_core::error::Result;
use marketplace_core::types::{Role, Service, ServiceId, User};

/// Browses services and the professionals offering them.
#[derive(Clone, Debug)]
pub struct CatalogService {
    repo: Repository,
}

impl CatalogService {
    /// Build the service from the shared environment.
    #[must_use]
    pub fn new(env: &MarketplaceEnvironment) -> Self {
        Self {
            repo: env.repository(),
        }
    }

    /// Every service, by name.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure.
    pub async fn list_services(&self) -> Result<Vec<Service>> {
        self.sorted(Query::all()).await
    }

    /// Services in one category, by name.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure.
    pub async fn list_services_by_category(&self, category: &str) -> Result<Vec<Service>> {
        self.sorted(Query::all().eq("category", category)).await
    }

    async fn sorted(&self, query: Query) -> Result<Vec<Service>> {
        let mut services: Vec<Service> = self.repo.query_records(Collection::Services, query).await?;
        services.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(services)
    }

    /// One service.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn get_service(&self, service_id: ServiceId) -> Result<Service> {
        self.repo.service(service_id).await
    }

    /// Onboarded providers offering a service, best rated first.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown service.
    #[tracing::instrument(skip(self), fields(service = %service_id))]
    pub async fn list_providers_for_service(&self, service_id: ServiceId) -> Result<Vec<User>> {
        let service = self.repo.service(service_id).await?;
        let mut providers: Vec<User> = self
            .repo
            .query_records::<User>(Collection::Users, Query::all().eq("role", Role::Provider.to_string()))
            .await?
            .into_iter()
            .filter(|u| {
                u.provider_profile()
                    .is_some_and(|p| p.is_onboarded && p.offers(&service.name))
            })
            .collect();

        let rating = |u: &User| u.provider_profile().map_or(0.0, |p| p.rating);
        providers.sort_by(|a, b| {
            rating(b)
                .total_cmp(&rating(a))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(providers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use marketplace_core::error::MarketplaceError;
    use marketplace_core::pricing::BookingPolicy;
    use marketplace_testing::fixtures::Seed;
    use marketplace_testing::{InMemoryDocumentStore, ManualClock};
    use std::sync::Arc;

    async fn setup() -> (CatalogService, Seed) {
        let store = InMemoryDocumentStore::new();
        let seed = Seed::standard();
        seed.install(&store).await.unwrap();
        let env = MarketplaceEnvironment::new(
            Arc::new(store),
            Arc::new(ManualClock::starting_now()),
            BookingPolicy::default(),
        );
        (CatalogService::new(&env), seed)
    }

    #[tokio::test]
    async fn services_are_sorted_and_filterable() {
        let (catalog, _) = setup().await;
        let names: Vec<String> = catalog
            .list_services()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names.first().map(String::as_str), Some("Bathroom Cleaning"));
        assert_eq!(names.len(), 5);

        let cleaning = catalog.list_services_by_category("Cleaning").await.unwrap();
        assert_eq!(cleaning.len(), 2);
    }

    #[tokio::test]
    async fn lists_only_providers_offering_the_service() {
        let (catalog, seed) = setup().await;
        let providers = catalog
            .list_providers_for_service(seed.deep_cleaning().id)
            .await
            .unwrap();
        let mut names: Vec<&str> = providers.iter().map(|u| u.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Meena", "Ravi"]);
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let (catalog, _) = setup().await;
        let err = catalog.get_service(ServiceId::new()).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::NotFound { .. }));
    }
}
