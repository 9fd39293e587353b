//! Document store abstraction.
//!
//! The marketplace persists every record as a JSON document inside a named
//! collection. The store offers exactly one coordination primitive: a write
//! guarded by the document [`Version`] the caller last read. Every state
//! transition is built on top of it as read, decide in the pure core, then
//! write with `expected_version`. Any interleaved writer bumps the version, so
//! the second writer receives [`StoreError::Conflict`] and the first writer wins.
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `marketplace-postgres`): JSONB table with
//!   version-guarded `UPDATE ... WHERE version = $n`
//! - `InMemoryDocumentStore` (in `marketplace-testing`): ordered map behind one mutex
//!
//! # Example
//!
//! ```no_run
//! use marketplace_core::document::{Collection, DocumentId, DocumentStore, Query, StoreError};
//! use serde_json::json;
//!
//! async fn example(store: &dyn DocumentStore) -> Result<(), StoreError> {
//!     let id = DocumentId::new("booking-1");
//!     let version = store
//!         .create(Collection::Bookings, id.clone(), json!({ "status": "pending" }))
//!         .await?;
//!
//!     // Guarded write: fails with Conflict if anyone wrote in between
//!     store
//!         .update(Collection::Bookings, id, json!({ "status": "upcoming" }), Some(version))
//!         .await?;
//!
//!     let pending = store
//!         .query(Collection::Bookings, Query::all().eq("status", "pending"))
//!         .await?;
//!     assert!(pending.is_empty());
//!     Ok(())
//! }
//! ```

use crate::types::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every [`DocumentStore`] method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Named collection of documents.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// Customers, providers and admins.
    Users,
    /// Bookings, the central entity.
    Bookings,
    /// The admin-owned service catalog.
    Services,
    /// Customer reviews of completed bookings.
    Reviews,
    /// Provider withdrawals.
    Withdrawals,
    /// Saved addresses, a sub-collection of one user.
    Addresses {
        /// User owning the sub-collection.
        owner: UserId,
    },
}

impl Collection {
    /// Storage path of the collection (`users`, `users/{owner}/addresses`, ...).
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Users => "users".to_string(),
            Self::Bookings => "bookings".to_string(),
            Self::Services => "services".to_string(),
            Self::Reviews => "reviews".to_string(),
            Self::Withdrawals => "withdrawals".to_string(),
            Self::Addresses { owner } => format!("users/{owner}/addresses"),
        }
    }

    /// Singular name of a record in this collection, used in error messages.
    #[must_use]
    pub const fn resource_name(&self) -> &'static str {
        match self {
            Self::Users => "user",
            Self::Bookings => "booking",
            Self::Services => "service",
            Self::Reviews => "review",
            Self::Withdrawals => "withdrawal",
            Self::Addresses { .. } => "address",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Identifier of a document within its collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a document id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document version for optimistic concurrency control.
///
/// A freshly created document is at [`Version::INITIAL`] (1); every
/// successful update moves it to [`Version::next`].
///
/// # Examples
///
/// ```
/// use marketplace_core::document::Version;
///
/// let v1 = Version::INITIAL;
/// assert_eq!(v1.next(), Version::new(2));
/// assert_eq!(Version::new(5).value(), 5);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly created document.
    pub const INITIAL: Self = Self(1);

    /// Create a `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Version after one more write. Saturates at `u64::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A document as it sits in the store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    /// Document id.
    pub id: DocumentId,
    /// Version observed at read time; pass it back as `expected_version`.
    pub version: Version,
    /// JSON body.
    pub body: Value,
}

/// Conjunction of top-level field equality filters.
///
/// A filter on `null` matches only documents where the field is present and
/// explicitly `null`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    filters: Vec<(String, Value)>,
}

impl Query {
    /// Query matching every document of the collection.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a `field == value` filter.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// The filters of this query.
    #[must_use]
    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    /// Whether a document body satisfies every filter.
    #[must_use]
    pub fn matches(&self, body: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| body.get(field) == Some(expected))
    }

    /// The filters as one JSON object, suitable for containment matching.
    #[must_use]
    pub fn as_object(&self) -> Value {
        Value::Object(self.filters.iter().cloned().collect())
    }
}

/// One write inside a [`DocumentStore::batch_write`].
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Create a new document; fails if the id is taken.
    Create {
        /// Target collection.
        collection: Collection,
        /// New document id.
        id: DocumentId,
        /// Document body.
        body: Value,
    },
    /// Replace the body of an existing document.
    Update {
        /// Target collection.
        collection: Collection,
        /// Document id.
        id: DocumentId,
        /// New body.
        body: Value,
        /// Version the caller read, if the write is conditional.
        expected_version: Option<Version>,
    },
    /// Remove a document.
    Delete {
        /// Target collection.
        collection: Collection,
        /// Document id.
        id: DocumentId,
        /// Version the caller read, if the delete is conditional.
        expected_version: Option<Version>,
    },
}

impl WriteOp {
    /// Collection and id targeted by the operation.
    #[must_use]
    pub const fn target(&self) -> (&Collection, &DocumentId) {
        match self {
            Self::Create { collection, id, .. }
            | Self::Update { collection, id, .. }
            | Self::Delete { collection, id, .. } => (collection, id),
        }
    }
}

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The document changed since the caller read it.
    #[error("Concurrency conflict on {collection}/{id}: expected {expected}, found {}", .actual.map_or_else(|| "nothing".to_string(), |v| v.to_string()))]
    Conflict {
        /// Collection of the document.
        collection: Collection,
        /// Document id.
        id: DocumentId,
        /// Version the caller expected.
        expected: Version,
        /// Version actually stored (`None` if the document is gone).
        actual: Option<Version>,
    },

    /// The document does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound {
        /// Collection of the document.
        collection: Collection,
        /// Document id.
        id: DocumentId,
    },

    /// A document with this id already exists.
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists {
        /// Collection of the document.
        collection: Collection,
        /// Document id.
        id: DocumentId,
    },

    /// Database connection or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A body could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persistence abstraction consumed by the marketplace services.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; services share one store behind an
/// `Arc<dyn DocumentStore>`.
///
/// # Dyn Compatibility
///
/// Methods return [`StoreFuture`] instead of being `async fn` so the trait can
/// be used as a trait object.
pub trait DocumentStore: Send + Sync {
    /// Fetch one document. A missing document is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - `Database`: store unreachable
    fn get(&self, collection: Collection, id: DocumentId) -> StoreFuture<'_, Option<StoredDocument>>;

    /// Fetch every document of a collection matching the query, in no
    /// particular order.
    ///
    /// # Errors
    ///
    /// - `Database`: store unreachable
    fn query(&self, collection: Collection, query: Query) -> StoreFuture<'_, Vec<StoredDocument>>;

    /// Create a document and return its initial version.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists`: the id is taken
    /// - `Database`: store unreachable
    fn create(&self, collection: Collection, id: DocumentId, body: Value) -> StoreFuture<'_, Version>;

    /// Replace a document body and return the new version.
    ///
    /// With `expected_version = Some(v)` the write only happens if the stored
    /// version is still `v`.
    ///
    /// # Errors
    ///
    /// - `Conflict`: the stored version differs from `expected_version`
    /// - `NotFound`: the document does not exist
    /// - `Database`: store unreachable
    fn update(
        &self,
        collection: Collection,
        id: DocumentId,
        body: Value,
        expected_version: Option<Version>,
    ) -> StoreFuture<'_, Version>;

    /// Remove a document.
    ///
    /// # Errors
    ///
    /// - `Conflict`: the stored version differs from `expected_version`
    /// - `NotFound`: the document does not exist
    /// - `Database`: store unreachable
    fn delete(
        &self,
        collection: Collection,
        id: DocumentId,
        expected_version: Option<Version>,
    ) -> StoreFuture<'_, ()>;

    /// Apply several writes atomically.
    ///
    /// Either every operation is applied or none is. All preconditions are
    /// evaluated against the state before the batch.
    ///
    /// # Errors
    ///
    /// The first failing precondition, as the matching single-write error.
    fn batch_write(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, ()>;
}
