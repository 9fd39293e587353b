//! Accounts, provider onboarding and saved addresses.
//!
//! Every mutation here acts on the caller's own profile: the caller id is
//! the document id, so nobody can edit another user's profile through this
//! service. Writes are guarded by the version that was read, like every
//! other write in the marketplace.

use crate::MarketplaceEnvironment;
use crate::repository::{Repository, Versioned};
use marketplace_core::availability::{DaySchedule, WeeklySchedule};
use marketplace_core::document::{Collection, Query, WriteOp};
use marketplace_core::environment::{Clock, Identity};
use marketplace_core::error::{MarketplaceError, Result};
use marketplace_core::types::{
    Address, AddressId, PaymentDetails, ProviderProfile, Role, Service, User, UserId,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Sign-up details.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Display name.
    pub name: String,
    /// `customer` or `provider`; admins are provisioned out of band.
    pub role: Role,
    /// Contact phone number.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Contact fields a user may edit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    /// New display name, if changing.
    pub name: Option<String>,
    /// New phone number, if changing. An empty string clears it.
    pub phone: Option<String>,
}

/// Provider onboarding form.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Onboarding {
    /// Name shown to customers.
    pub full_name: String,
    /// Contact phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Catalog service names offered.
    pub services: Vec<String>,
    /// Payout destination.
    pub payment_details: PaymentDetails,
    /// Weekly hours; the standard week when omitted.
    #[serde(default)]
    pub availability: Option<Vec<DaySchedule>>,
}

/// Address form.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    /// Short name such as `Home`.
    pub label: String,
    /// Street line.
    pub line1: String,
    /// Apartment, floor, landmark.
    #[serde(default)]
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or region.
    #[serde(default)]
    pub state: String,
    /// Postal code.
    pub postal_code: String,
}

impl AddressInput {
    fn into_address(self, id: AddressId, is_default: bool) -> Address {
        Address {
            id,
            label: self.label.trim().to_string(),
            line1: self.line1.trim().to_string(),
            line2: self.line2.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            is_default,
        }
    }
}

fn non_blank(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(MarketplaceError::validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn default_first(a: &Address, b: &Address) -> std::cmp::Ordering {
    b.is_default
        .cmp(&a.is_default)
        .then_with(|| a.label.cmp(&b.label))
        .then_with(|| a.id.cmp(&b.id))
}

/// Manages the caller's own account.
#[derive(Clone)]
pub struct ProfileService {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ProfileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileService").finish_non_exhaustive()
    }
}

impl ProfileService {
    /// Build the service from the shared environment.
    #[must_use]
    pub fn new(env: &MarketplaceEnvironment) -> Self {
        Self {
            repo: env.repository(),
            clock: Arc::clone(&env.clock),
        }
    }

    /// Create the account record for a freshly authenticated identity.
    /// Providers start with an empty, not yet onboarded profile.
    ///
    /// # Errors
    ///
    /// - `NotPermitted`: self-registration as admin
    /// - `Conflict`: the identity already has an account
    /// - `Validation`: blank name
    #[tracing::instrument(skip(self, identity, registration), fields(user = %identity.id, role = %registration.role))]
    pub async fn register(&self, identity: &Identity, registration: Registration) -> Result<User> {
        if registration.role == Role::Admin {
            return Err(MarketplaceError::not_permitted("admins cannot self-register"));
        }
        let name = non_blank(&registration.name, "name")?;
        if self
            .repo
            .get::<User>(Collection::Users, identity.id.document_id())
            .await?
            .is_some()
        {
            return Err(MarketplaceError::conflict(format!(
                "user {} is already registered",
                identity.id
            )));
        }

        let user = User {
            id: identity.id,
            email: identity.email.clone(),
            name,
            role: registration.role,
            phone: registration.phone.filter(|p| !p.trim().is_empty()),
            provider: (registration.role == Role::Provider).then(ProviderProfile::default),
            created_at: self.clock.now(),
        };
        self.repo.create(Collection::Users, &user).await?;
        info!("User registered");
        Ok(user)
    }

    /// Load a user's profile.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn get_profile(&self, user_id: UserId) -> Result<User> {
        Ok(self.repo.user(user_id).await?.record)
    }

    /// Change name and/or phone.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank name, `Conflict` on a concurrent edit.
    #[tracing::instrument(skip(self, update), fields(user = %user_id))]
    pub async fn update_contact(&self, user_id: UserId, update: ContactUpdate) -> Result<User> {
        let current = self.repo.user(user_id).await?;
        let mut user = current.record;
        if let Some(name) = update.name {
            user.name = non_blank(&name, "name")?;
        }
        if let Some(phone) = update.phone {
            let phone = phone.trim().to_string();
            user.phone = (!phone.is_empty()).then_some(phone);
        }
        self.repo
            .replace(Collection::Users, &user, current.version)
            .await?;
        Ok(user)
    }

    /// Finish provider onboarding. Ratings start from zero.
    ///
    /// # Errors
    ///
    /// - `NotPermitted`: the caller is not a provider
    /// - `Validation`: blank name, no services, a service missing from the
    ///   catalog, incomplete payout details or a malformed schedule
    #[tracing::instrument(skip(self, onboarding), fields(provider = %provider_id))]
    pub async fn complete_onboarding(&self, provider_id: UserId, onboarding: Onboarding) -> Result<User> {
        let name = non_blank(&onboarding.full_name, "full name")?;
        let services = self.catalog_services(onboarding.services).await?;
        onboarding.payment_details.validate()?;
        let availability = match onboarding.availability {
            Some(days) => WeeklySchedule::new(days)?,
            None => WeeklySchedule::standard(),
        };

        let user = self
            .edit_provider(provider_id, |user, profile| {
                user.name = name;
                if let Some(phone) = onboarding.phone.filter(|p| !p.trim().is_empty()) {
                    user.phone = Some(phone.trim().to_string());
                }
                *profile = ProviderProfile {
                    services,
                    availability,
                    rating: 0.0,
                    review_count: 0,
                    payment_details: Some(onboarding.payment_details),
                    is_onboarded: true,
                };
            })
            .await?;
        info!("Provider onboarded");
        Ok(user)
    }

    /// Replace the services a provider offers.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty list or a service missing from the catalog.
    #[tracing::instrument(skip(self, services), fields(provider = %provider_id))]
    pub async fn update_services(&self, provider_id: UserId, services: Vec<String>) -> Result<User> {
        let services = self.catalog_services(services).await?;
        self.edit_provider(provider_id, |_, profile| profile.services = services)
            .await
    }

    /// Replace a provider's weekly hours.
    ///
    /// # Errors
    ///
    /// `Validation` unless there is one entry per weekday with `start <= end`.
    #[tracing::instrument(skip(self, days), fields(provider = %provider_id))]
    pub async fn update_availability(&self, provider_id: UserId, days: Vec<DaySchedule>) -> Result<User> {
        let schedule = WeeklySchedule::new(days)?;
        self.edit_provider(provider_id, |_, profile| profile.availability = schedule)
            .await
    }

    /// Replace a provider's payout destination.
    ///
    /// # Errors
    ///
    /// `Validation` for incomplete details.
    #[tracing::instrument(skip(self, details), fields(provider = %provider_id))]
    pub async fn update_payout_details(&self, provider_id: UserId, details: PaymentDetails) -> Result<User> {
        details.validate()?;
        self.edit_provider(provider_id, |_, profile| profile.payment_details = Some(details))
            .await
    }

    async fn edit_provider(
        &self,
        provider_id: UserId,
        edit: impl FnOnce(&mut User, &mut ProviderProfile),
    ) -> Result<User> {
        let current = self.repo.provider(provider_id).await?;
        let mut user = current.record;
        let mut profile = user.provider.take().ok_or_else(|| {
            MarketplaceError::not_permitted(format!("user {provider_id} is not a provider"))
        })?;
        edit(&mut user, &mut profile);
        user.provider = Some(profile);
        self.repo
            .replace(Collection::Users, &user, current.version)
            .await?;
        Ok(user)
    }

    async fn catalog_services(&self, requested: Vec<String>) -> Result<BTreeSet<String>> {
        let requested: BTreeSet<String> = requested
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if requested.is_empty() {
            return Err(MarketplaceError::validation("select at least one service"));
        }
        let catalog: BTreeSet<String> = self
            .repo
            .query_records::<Service>(Collection::Services, Query::all())
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();
        if let Some(unknown) = requested.iter().find(|s| !catalog.contains(*s)) {
            return Err(MarketplaceError::validation(format!(
                "service {unknown:?} is not in the catalog"
            )));
        }
        Ok(requested)
    }

    /// A user's saved addresses, default first, then by label.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure.
    pub async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>> {
        let mut addresses: Vec<Address> = self
            .addresses(user_id)
            .await?
            .into_iter()
            .map(|a| a.record)
            .collect();
        addresses.sort_by(default_first);
        Ok(addresses)
    }

    async fn addresses(&self, user_id: UserId) -> Result<Vec<Versioned<Address>>> {
        self.repo
            .query(Collection::Addresses { owner: user_id }, Query::all())
            .await
    }

    /// Save a new address. The first address becomes the default.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown user, `Validation` for blank required lines.
    #[tracing::instrument(skip(self, input), fields(user = %user_id))]
    pub async fn add_address(&self, user_id: UserId, input: AddressInput) -> Result<Address> {
        self.repo.user(user_id).await?;
        let is_first = self.addresses(user_id).await?.is_empty();
        let address = input.into_address(AddressId::new(), is_first);
        self.repo
            .create(Collection::Addresses { owner: user_id }, &address)
            .await?;
        Ok(address)
    }

    /// Edit a saved address, keeping its default flag.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown address, `Validation` for blank lines,
    /// `Conflict` on a concurrent edit.
    #[tracing::instrument(skip(self, input), fields(user = %user_id, address = %address_id))]
    pub async fn update_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
        input: AddressInput,
    ) -> Result<Address> {
        let collection = Collection::Addresses { owner: user_id };
        let current: Versioned<Address> = self
            .repo
            .require(collection.clone(), address_id.document_id())
            .await?;
        let address = input.into_address(address_id, current.record.is_default);
        self.repo.replace(collection, &address, current.version).await?;
        Ok(address)
    }

    /// Remove a saved address. Removing the default promotes the next
    /// address in list order.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown address, `Conflict` on a concurrent edit.
    #[tracing::instrument(skip(self), fields(user = %user_id, address = %address_id))]
    pub async fn delete_address(&self, user_id: UserId, address_id: AddressId) -> Result<()> {
        let collection = Collection::Addresses { owner: user_id };
        let mut all = self.addresses(user_id).await?;
        all.sort_by(|a, b| default_first(&a.record, &b.record));
        let position = all
            .iter()
            .position(|a| a.record.id == address_id)
            .ok_or_else(|| MarketplaceError::not_found("address", address_id))?;
        let removed = all.remove(position);

        let mut ops = vec![WriteOp::Delete {
            collection: collection.clone(),
            id: address_id.document_id(),
            expected_version: Some(removed.version),
        }];
        if removed.record.is_default {
            if let Some(next) = all.first() {
                let mut promoted = next.record.clone();
                promoted.is_default = true;
                ops.push(Repository::update_op(collection, &promoted, next.version)?);
            }
        }
        self.repo.batch(ops).await
    }

    /// Make one address the default, clearing the previous default in the
    /// same batch.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown address, `Conflict` on a concurrent edit.
    #[tracing::instrument(skip(self), fields(user = %user_id, address = %address_id))]
    pub async fn set_default_address(&self, user_id: UserId, address_id: AddressId) -> Result<Vec<Address>> {
        let collection = Collection::Addresses { owner: user_id };
        let all = self.addresses(user_id).await?;
        if !all.iter().any(|a| a.record.id == address_id) {
            return Err(MarketplaceError::not_found("address", address_id));
        }

        let mut ops = Vec::new();
        let mut result = Vec::with_capacity(all.len());
        for current in all {
            let should_be_default = current.record.id == address_id;
            let mut address = current.record;
            if address.is_default != should_be_default {
                address.is_default = should_be_default;
                ops.push(Repository::update_op(collection.clone(), &address, current.version)?);
            }
            result.push(address);
        }
        self.repo.batch(ops).await?;
        result.sort_by(default_first);
        Ok(result)
    }
}
