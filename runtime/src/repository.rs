//! Typed access to the document store.
//!
//! Records go out as camelCase JSON and come back through `serde` plus the
//! record's own invariant check. A document that does not decode, or decodes
//! into a record that breaks its invariants, is reported as
//! [`MarketplaceError::Persistence`]: the store handed back something the
//! marketplace never wrote.

use marketplace_core::document::{
    Collection, DocumentId, DocumentStore, Query, StoredDocument, Version, WriteOp,
};
use marketplace_core::error::{MarketplaceError, Result};
use marketplace_core::types::{
    Address, Booking, BookingId, Review, Service, ServiceId, User, UserId, Withdrawal,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A domain record that lives in the document store.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Id of the document holding this record.
    fn document_id(&self) -> DocumentId;

    /// Invariants checked on every load and before every write.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Validation`] describing the violation.
    fn check(&self) -> Result<()> {
        Ok(())
    }
}

impl Record for User {
    fn document_id(&self) -> DocumentId {
        self.id.document_id()
    }

    fn check(&self) -> Result<()> {
        self.check_invariants()
    }
}

impl Record for Booking {
    fn document_id(&self) -> DocumentId {
        self.id.document_id()
    }

    fn check(&self) -> Result<()> {
        self.check_invariants()
    }
}

impl Record for Review {
    fn document_id(&self) -> DocumentId {
        self.id.document_id()
    }

    fn check(&self) -> Result<()> {
        marketplace_core::rating::validate_rating(self.rating).map(|_| ())
    }
}

impl Record for Withdrawal {
    fn document_id(&self) -> DocumentId {
        self.id.document_id()
    }

    fn check(&self) -> Result<()> {
        if self.amount.is_zero() {
            return Err(MarketplaceError::validation(format!(
                "withdrawal {} has a zero amount",
                self.id
            )));
        }
        Ok(())
    }
}

impl Record for Service {
    fn document_id(&self) -> DocumentId {
        self.id.document_id()
    }
}

impl Record for Address {
    fn document_id(&self) -> DocumentId {
        self.id.document_id()
    }

    fn check(&self) -> Result<()> {
        self.validate()
    }
}

/// A record together with the version it was read at.
#[derive(Clone, Debug, PartialEq)]
pub struct Versioned<T> {
    /// The decoded record.
    pub record: T,
    /// Version to pass back when writing the record.
    pub version: Version,
}

/// Typed repository over any [`DocumentStore`].
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

fn encode<T: Record>(record: &T) -> Result<serde_json::Value> {
    record.check()?;
    serde_json::to_value(record)
        .map_err(|e| MarketplaceError::Persistence(format!("failed to encode record: {e}")))
}

fn decode<T: Record>(collection: &Collection, doc: StoredDocument) -> Result<Versioned<T>> {
    let record: T = serde_json::from_value(doc.body).map_err(|e| {
        MarketplaceError::Persistence(format!("malformed document {collection}/{}: {e}", doc.id))
    })?;
    record.check().map_err(|e| {
        MarketplaceError::Persistence(format!("invalid document {collection}/{}: {e}", doc.id))
    })?;
    Ok(Versioned {
        record,
        version: doc.version,
    })
}

impl Repository {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Load one record; `None` if absent.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure or a malformed document.
    pub async fn get<T: Record>(&self, collection: Collection, id: DocumentId) -> Result<Option<Versioned<T>>> {
        let doc = self.store.get(collection.clone(), id).await?;
        doc.map(|doc| decode(&collection, doc)).transpose()
    }

    /// Load one record that must exist.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `Persistence` on store failure.
    pub async fn require<T: Record>(&self, collection: Collection, id: DocumentId) -> Result<Versioned<T>> {
        let resource = collection.resource_name();
        self.get(collection, id.clone())
            .await?
            .ok_or_else(|| MarketplaceError::not_found(resource, id))
    }

    /// Load every record matching the query.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure or a malformed document.
    pub async fn query<T: Record>(&self, collection: Collection, query: Query) -> Result<Vec<Versioned<T>>> {
        let docs = self.store.query(collection.clone(), query).await?;
        tracing::debug!(%collection, count = docs.len(), "query");
        docs.into_iter().map(|doc| decode(&collection, doc)).collect()
    }

    /// Like [`Repository::query`], dropping versions.
    ///
    /// # Errors
    ///
    /// See [`Repository::query`].
    pub async fn query_records<T: Record>(&self, collection: Collection, query: Query) -> Result<Vec<T>> {
        Ok(self
            .query(collection, query)
            .await?
            .into_iter()
            .map(|v| v.record)
            .collect())
    }

    /// Store a new record.
    ///
    /// # Errors
    ///
    /// `Validation` if the record breaks its invariants, `Persistence` on
    /// store failure (including a duplicate id).
    pub async fn create<T: Record>(&self, collection: Collection, record: &T) -> Result<Version> {
        let body = encode(record)?;
        Ok(self.store.create(collection, record.document_id(), body).await?)
    }

    /// Overwrite a record, only if it is still at `expected`.
    ///
    /// # Errors
    ///
    /// `Conflict` if someone wrote in between, `Persistence` on store failure.
    pub async fn replace<T: Record>(&self, collection: Collection, record: &T, expected: Version) -> Result<Version> {
        let body = encode(record)?;
        Ok(self
            .store
            .update(collection, record.document_id(), body, Some(expected))
            .await?)
    }

    /// Delete a record, only if it is still at `expected`.
    ///
    /// # Errors
    ///
    /// `Conflict` if someone wrote in between, `Persistence` on store failure.
    pub async fn delete(&self, collection: Collection, id: DocumentId, expected: Version) -> Result<()> {
        Ok(self.store.delete(collection, id, Some(expected)).await?)
    }

    /// Apply several writes atomically.
    ///
    /// # Errors
    ///
    /// `Conflict` if any guarded write is stale, `Persistence` otherwise.
    pub async fn batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        Ok(self.store.batch_write(ops).await?)
    }

    /// Batch operation creating `record`.
    ///
    /// # Errors
    ///
    /// `Validation` / `Persistence` as for [`Repository::create`].
    pub fn create_op<T: Record>(collection: Collection, record: &T) -> Result<WriteOp> {
        Ok(WriteOp::Create {
            collection,
            id: record.document_id(),
            body: encode(record)?,
        })
    }

    /// Batch operation overwriting `record` if still at `expected`.
    ///
    /// # Errors
    ///
    /// `Validation` / `Persistence` as for [`Repository::replace`].
    pub fn update_op<T: Record>(collection: Collection, record: &T, expected: Version) -> Result<WriteOp> {
        Ok(WriteOp::Update {
            collection,
            id: record.document_id(),
            body: encode(record)?,
            expected_version: Some(expected),
        })
    }

    /// Load a user.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn user(&self, id: UserId) -> Result<Versioned<User>> {
        self.require(Collection::Users, id.document_id()).await
    }

    /// Load a user who must be a provider.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent, `NotPermitted` if the user is not a provider.
    pub async fn provider(&self, id: UserId) -> Result<Versioned<User>> {
        let user = self.user(id).await?;
        if user.record.provider.is_none() {
            return Err(MarketplaceError::not_permitted(format!("user {id} is not a provider")));
        }
        Ok(user)
    }

    /// Load a booking.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn booking(&self, id: BookingId) -> Result<Versioned<Booking>> {
        self.require(Collection::Bookings, id.document_id()).await
    }

    /// Load a catalog service.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub async fn service(&self, id: ServiceId) -> Result<Service> {
        Ok(self.require(Collection::Services, id.document_id()).await?.record)
    }

    /// Every booking assigned to a provider.
    ///
    /// # Errors
    ///
    /// `Persistence` on store failure.
    pub async fn provider_bookings(&self, provider_id: UserId) -> Result<Vec<Booking>> {
        self.query_records(
            Collection::Bookings,
            Query::all().eq("providerId", provider_id.to_string()),
        )
        .await
    }
}
