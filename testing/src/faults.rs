//! Fault-injecting store wrapper.
//!
//! Wraps any [`DocumentStore`] and lets a test make chosen operations fail or
//! slip a concurrent writer in right before a guarded write.

use marketplace_core::document::{
    Collection, DocumentId, DocumentStore, Query, StoreError, StoreFuture, StoredDocument, Version,
    WriteOp,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Plan {
    failing_writes: HashSet<String>,
    failing_reads: HashSet<String>,
    interleave_on: HashSet<String>,
    writes: usize,
}

/// A store that misbehaves on request.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use marketplace_core::document::Collection;
/// use marketplace_testing::{FaultInjectingStore, InMemoryDocumentStore};
///
/// let store = FaultInjectingStore::new(Arc::new(InMemoryDocumentStore::new()));
/// store.fail_writes_to(&Collection::Users);
/// ```
#[derive(Clone)]
pub struct FaultInjectingStore {
    inner: Arc<dyn DocumentStore>,
    plan: Arc<Mutex<Plan>>,
}

impl std::fmt::Debug for FaultInjectingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjectingStore").finish_non_exhaustive()
    }
}

impl FaultInjectingStore {
    /// Wrap a store. Until configured, every call passes straight through.
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            plan: Arc::new(Mutex::new(Plan::default())),
        }
    }

    fn with_plan<T>(&self, f: impl FnOnce(&mut Plan) -> T) -> Option<T> {
        self.plan.lock().ok().map(|mut plan| f(&mut plan))
    }

    /// Make every write touching `collection` fail with a database error.
    pub fn fail_writes_to(&self, collection: &Collection) {
        let path = collection.path();
        self.with_plan(|plan| plan.failing_writes.insert(path));
    }

    /// Make every read of `collection` fail with a database error.
    pub fn fail_reads_of(&self, collection: &Collection) {
        let path = collection.path();
        self.with_plan(|plan| plan.failing_reads.insert(path));
    }

    /// Before the next guarded write to a document of `collection`, rewrite
    /// that document unchanged so its version moves on. The guarded write
    /// then loses the race.
    pub fn interleave_next_write_to(&self, collection: &Collection) {
        let path = collection.path();
        self.with_plan(|plan| plan.interleave_on.insert(path));
    }

    /// Remove every configured fault.
    pub fn heal(&self) {
        self.with_plan(|plan| {
            plan.failing_writes.clear();
            plan.failing_reads.clear();
            plan.interleave_on.clear();
        });
    }

    /// Number of write calls that reached this wrapper.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.with_plan(|plan| plan.writes).unwrap_or_default()
    }

    fn check_read(&self, collection: &Collection) -> Result<(), StoreError> {
        let path = collection.path();
        if self
            .with_plan(|plan| plan.failing_reads.contains(&path))
            .unwrap_or(false)
        {
            return Err(StoreError::Database(format!("injected read failure on {path}")));
        }
        Ok(())
    }

    fn check_write(&self, collection: &Collection) -> Result<(), StoreError> {
        let path = collection.path();
        let fail = self
            .with_plan(|plan| {
                plan.writes += 1;
                plan.failing_writes.contains(&path)
            })
            .unwrap_or(false);
        if fail {
            return Err(StoreError::Database(format!("injected write failure on {path}")));
        }
        Ok(())
    }

    async fn maybe_interleave(
        &self,
        collection: &Collection,
        id: &DocumentId,
        expected: Option<Version>,
    ) -> Result<(), StoreError> {
        if expected.is_none() {
            return Ok(());
        }
        let path = collection.path();
        let armed = self
            .with_plan(|plan| plan.interleave_on.remove(&path))
            .unwrap_or(false);
        if !armed {
            return Ok(());
        }
        if let Some(current) = self.inner.get(collection.clone(), id.clone()).await? {
            self.inner
                .update(collection.clone(), id.clone(), current.body, Some(current.version))
                .await?;
        }
        Ok(())
    }
}

impl DocumentStore for FaultInjectingStore {
    fn get(&self, collection: Collection, id: DocumentId) -> StoreFuture<'_, Option<StoredDocument>> {
        Box::pin(async move {
            self.check_read(&collection)?;
            self.inner.get(collection, id).await
        })
    }

    fn query(&self, collection: Collection, query: Query) -> StoreFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move {
            self.check_read(&collection)?;
            self.inner.query(collection, query).await
        })
    }

    fn create(&self, collection: Collection, id: DocumentId, body: Value) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            self.check_write(&collection)?;
            self.inner.create(collection, id, body).await
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
            self.check_write(&collection)?;
            self.maybe_interleave(&collection, &id, expected_version).await?;
            self.inner.update(collection, id, body, expected_version).await
        })
    }

    fn delete(
        &self,
        collection: Collection,
        id: DocumentId,
        expected_version: Option<Version>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_write(&collection)?;
            self.maybe_interleave(&collection, &id, expected_version).await?;
            self.inner.delete(collection, id, expected_version).await
        })
    }

    fn batch_write(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            for op in &ops {
                let (collection, _) = op.target();
                self.check_write(collection)?;
            }
            for op in &ops {
                if let WriteOp::Update {
                    collection,
                    id,
                    expected_version,
                    ..
                }
                | WriteOp::Delete {
                    collection,
                    id,
                    expected_version,
                } = op
                {
                    self.maybe_interleave(collection, id, *expected_version).await?;
                }
            }
            self.inner.batch_write(ops).await
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::InMemoryDocumentStore;
    use serde_json::json;

    fn wrapped() -> FaultInjectingStore {
        FaultInjectingStore::new(Arc::new(InMemoryDocumentStore::new()))
    }

    #[tokio::test]
    async fn failing_writes_leave_reads_alone() {
        let store = wrapped();
        store
            .create(Collection::Users, DocumentId::new("u"), json!({}))
            .await
            .unwrap();
        store.fail_writes_to(&Collection::Users);

        let write = store
            .update(Collection::Users, DocumentId::new("u"), json!({ "x": 1 }), None)
            .await;
        assert!(matches!(write, Err(StoreError::Database(_))));
        assert!(store.get(Collection::Users, DocumentId::new("u")).await.unwrap().is_some());

        store.heal();
        assert!(
            store
                .update(Collection::Users, DocumentId::new("u"), json!({ "x": 1 }), None)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn interleaved_writer_wins_once() {
        let store = wrapped();
        let v1 = store
            .create(Collection::Bookings, DocumentId::new("b"), json!({ "n": 0 }))
            .await
            .unwrap();
        store.interleave_next_write_to(&Collection::Bookings);

        let lost = store
            .update(Collection::Bookings, DocumentId::new("b"), json!({ "n": 1 }), Some(v1))
            .await;
        assert!(matches!(lost, Err(StoreError::Conflict { .. })));

        let current = store
            .get(Collection::Bookings, DocumentId::new("b"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.body, json!({ "n": 0 }));
        assert!(
            store
                .update(Collection::Bookings, DocumentId::new("b"), json!({ "n": 1 }), Some(current.version))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn failing_batch_applies_nothing() {
        let inner = InMemoryDocumentStore::new();
        let store = FaultInjectingStore::new(Arc::new(inner.clone()));
        store.fail_writes_to(&Collection::Withdrawals);

        let result = store
            .batch_write(vec![
                WriteOp::Create {
                    collection: Collection::Reviews,
                    id: DocumentId::new("r"),
                    body: json!({}),
                },
                WriteOp::Create {
                    collection: Collection::Withdrawals,
                    id: DocumentId::new("w"),
                    body: json!({}),
                },
            ])
            .await;
        assert!(result.is_err());
        assert_eq!(inner.count(&Collection::Reviews).unwrap(), 0);
    }
}
