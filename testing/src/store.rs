//! In-memory [`DocumentStore`].
//!
//! Every operation runs under one mutex, so version checks and writes are
//! linearizable exactly like the guarded `UPDATE` of the Postgres adapter.

use marketplace_core::document::{
    Collection, DocumentId, DocumentStore, Query, StoreError, StoreFuture, StoredDocument, Version,
    WriteOp,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

type Key = (Collection, DocumentId);
type Documents = BTreeMap<Key, (Version, Value)>;

/// Ordered in-memory store for fast, deterministic tests.
///
/// Clones share the same documents.
///
/// # Example
///
/// ```
/// use marketplace_core::document::{Collection, DocumentId, DocumentStore, Version};
/// use marketplace_testing::InMemoryDocumentStore;
/// use serde_json::json;
///
/// # futures_executor(async {
/// let store = InMemoryDocumentStore::new();
/// let version = store
///     .create(Collection::Users, DocumentId::new("u-1"), json!({ "name": "Asha" }))
///     .await
///     .unwrap();
/// assert_eq!(version, Version::INITIAL);
/// # });
/// # fn futures_executor<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<Mutex<Documents>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Documents>, StoreError> {
        self.documents
            .lock()
            .map_err(|_| StoreError::Database("Mutex lock failed".to_string()))
    }

    /// Number of documents in a collection (for assertions).
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn count(&self, collection: &Collection) -> Result<usize, StoreError> {
        Ok(self
            .lock()?
            .keys()
            .filter(|(c, _)| c == collection)
            .count())
    }

    /// Current version of a document, if present (for assertions).
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn version_of(
        &self,
        collection: &Collection,
        id: &DocumentId,
    ) -> Result<Option<Version>, StoreError> {
        Ok(self
            .lock()?
            .get(&(collection.clone(), id.clone()))
            .map(|(v, _)| *v))
    }
}

fn check_expected(
    documents: &Documents,
    collection: &Collection,
    id: &DocumentId,
    expected: Option<Version>,
) -> Result<Version, StoreError> {
    let current = documents
        .get(&(collection.clone(), id.clone()))
        .map(|(v, _)| *v);
    match (current, expected) {
        (None, Some(expected)) => Err(StoreError::Conflict {
            collection: collection.clone(),
            id: id.clone(),
            expected,
            actual: None,
        }),
        (None, None) => Err(StoreError::NotFound {
            collection: collection.clone(),
            id: id.clone(),
        }),
        (Some(actual), Some(expected)) if actual != expected => Err(StoreError::Conflict {
            collection: collection.clone(),
            id: id.clone(),
            expected,
            actual: Some(actual),
        }),
        (Some(actual), _) => Ok(actual),
    }
}

fn check_op(documents: &Documents, op: &WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::Create { collection, id, .. } => {
            if documents.contains_key(&(collection.clone(), id.clone())) {
                Err(StoreError::AlreadyExists {
                    collection: collection.clone(),
                    id: id.clone(),
                })
            } else {
                Ok(())
            }
        }
        WriteOp::Update {
            collection,
            id,
            expected_version,
            ..
        }
        | WriteOp::Delete {
            collection,
            id,
            expected_version,
        } => check_expected(documents, collection, id, *expected_version).map(|_| ()),
    }
}

fn apply_op(documents: &mut Documents, op: WriteOp) {
    match op {
        WriteOp::Create {
            collection,
            id,
            body,
        } => {
            documents.insert((collection, id), (Version::INITIAL, body));
        }
        WriteOp::Update {
            collection,
            id,
            body,
            ..
        } => {
            let key = (collection, id);
            let next = documents
                .get(&key)
                .map_or(Version::INITIAL, |(v, _)| v.next());
            documents.insert(key, (next, body));
        }
        WriteOp::Delete { collection, id, .. } => {
            documents.remove(&(collection, id));
        }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, collection: Collection, id: DocumentId) -> StoreFuture<'_, Option<StoredDocument>> {
        Box::pin(async move {
            let documents = self.lock()?;
            Ok(documents
                .get(&(collection, id.clone()))
                .map(|(version, body)| StoredDocument {
                    id,
                    version: *version,
                    body: body.clone(),
                }))
        })
    }

    fn query(&self, collection: Collection, query: Query) -> StoreFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move {
            let documents = self.lock()?;
            Ok(documents
                .iter()
                .filter(|((c, _), (_, body))| *c == collection && query.matches(body))
                .map(|((_, id), (version, body))| StoredDocument {
                    id: id.clone(),
                    version: *version,
                    body: body.clone(),
                })
                .collect())
        })
    }

    fn create(&self, collection: Collection, id: DocumentId, body: Value) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut documents = self.lock()?;
            let op = WriteOp::Create {
                collection,
                id,
                body,
            };
            check_op(&documents, &op)?;
            apply_op(&mut documents, op);
            Ok(Version::INITIAL)
        })
    }

    fn update(
        &self,
        collection: Collection,
        id: DocumentId,
        body: Value,
        expected_version: Option<Version>,
    ) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            let mut documents = self.lock()?;
            let current = check_expected(&documents, &collection, &id, expected_version)?;
            apply_op(
                &mut documents,
                WriteOp::Update {
                    collection,
                    id,
                    body,
                    expected_version,
                },
            );
            Ok(current.next())
        })
    }

    fn delete(
        &self,
        collection: Collection,
        id: DocumentId,
        expected_version: Option<Version>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut documents = self.lock()?;
            let op = WriteOp::Delete {
                collection,
                id,
                expected_version,
            };
            check_op(&documents, &op)?;
            apply_op(&mut documents, op);
            Ok(())
        })
    }

    fn batch_write(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut documents = self.lock()?;
            for op in &ops {
                check_op(&documents, op)?;
            }
            for op in ops {
                apply_op(&mut documents, op);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s)
    }

    #[tokio::test]
    async fn create_get_and_versioned_update() {
        let store = InMemoryDocumentStore::new();
        let v1 = store
            .create(Collection::Bookings, id("b"), json!({ "status": "pending" }))
            .await
            .unwrap();
        assert_eq!(v1, Version::INITIAL);

        let v2 = store
            .update(Collection::Bookings, id("b"), json!({ "status": "upcoming" }), Some(v1))
            .await
            .unwrap();
        assert_eq!(v2, Version::new(2));

        let stale = store
            .update(Collection::Bookings, id("b"), json!({ "status": "cancelled" }), Some(v1))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict { actual: Some(v), .. }) if v == v2));

        let doc = store.get(Collection::Bookings, id("b")).await.unwrap().unwrap();
        assert_eq!(doc.body["status"], "upcoming");
        assert_eq!(doc.version, v2);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryDocumentStore::new();
        store.create(Collection::Users, id("u"), json!({})).await.unwrap();
        let again = store.create(Collection::Users, id("u"), json!({})).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn update_of_missing_document() {
        let store = InMemoryDocumentStore::new();
        let unguarded = store.update(Collection::Users, id("x"), json!({}), None).await;
        assert!(matches!(unguarded, Err(StoreError::NotFound { .. })));
        let guarded = store
            .update(Collection::Users, id("x"), json!({}), Some(Version::INITIAL))
            .await;
        assert!(matches!(guarded, Err(StoreError::Conflict { actual: None, .. })));
    }

    #[tokio::test]
    async fn query_is_scoped_to_collection() {
        let store = InMemoryDocumentStore::new();
        let owner = marketplace_core::types::UserId::new();
        store
            .create(Collection::Addresses { owner }, id("a"), json!({ "city": "Pune" }))
            .await
            .unwrap();
        store
            .create(Collection::Users, id("a"), json!({ "city": "Pune" }))
            .await
            .unwrap();

        let found = store
            .query(Collection::Addresses { owner }, Query::all().eq("city", "Pune"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let other_owner = Collection::Addresses {
            owner: marketplace_core::types::UserId::new(),
        };
        assert!(store.query(other_owner, Query::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = InMemoryDocumentStore::new();
        let v1 = store.create(Collection::Bookings, id("b"), json!({ "n": 1 })).await.unwrap();
        store.update(Collection::Bookings, id("b"), json!({ "n": 2 }), Some(v1)).await.unwrap();

        let result = store
            .batch_write(vec![
                WriteOp::Create {
                    collection: Collection::Reviews,
                    id: id("r"),
                    body: json!({}),
                },
                WriteOp::Update {
                    collection: Collection::Bookings,
                    id: id("b"),
                    body: json!({ "n": 3 }),
                    expected_version: Some(v1),
                },
            ])
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.count(&Collection::Reviews).unwrap(), 0);

        store
            .batch_write(vec![
                WriteOp::Create {
                    collection: Collection::Reviews,
                    id: id("r"),
                    body: json!({}),
                },
                WriteOp::Delete {
                    collection: Collection::Bookings,
                    id: id("b"),
                    expected_version: Some(Version::new(2)),
                },
            ])
            .await
            .unwrap();
        assert_eq!(store.count(&Collection::Reviews).unwrap(), 1);
        assert_eq!(store.count(&Collection::Bookings).unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_guarded_writes_have_one_winner() {
        let store = InMemoryDocumentStore::new();
        let v1 = store.create(Collection::Bookings, id("b"), json!({})).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update(Collection::Bookings, DocumentId::new("b"), json!({ "winner": n }), Some(v1))
                        .await
                })
            })
            .collect();

        let results = futures::future::join_all(tasks).await;
        let winners = results.iter().filter(|r| matches!(r, Ok(Ok(_)))).count();
        assert_eq!(winners, 1);
    }
}
