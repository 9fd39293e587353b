//! `PostgreSQL` document store for the marketplace.
//!
//! Implements [`DocumentStore`] over a single JSONB table:
//!
//! ```sql
//! CREATE TABLE documents (
//!     collection TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     version BIGINT NOT NULL,
//!     body JSONB NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     PRIMARY KEY (collection, id)
//! );
//! ```
//!
//! - Conditional writes are a single `UPDATE ... WHERE version = $n`, so the
//!   check and the write are one atomic statement
//! - Queries are JSONB containment (`body @> filter`), served by a GIN index
//! - Batch writes run in one transaction; the first failing operation rolls
//!   the whole batch back
//!
//! # Example
//!
//! ```no_run
//! use marketplace_postgres::PostgresDocumentStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresDocumentStore::connect("postgres://localhost/marketplace", 10).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use marketplace_core::document::{
    Collection, DocumentId, DocumentStore, Query, StoreError, StoreFuture, StoredDocument, Version,
    WriteOp,
};
use serde_json::Value;
use sqlx::PgConnection;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Instant;

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn to_db_version(version: Version) -> Result<i64, StoreError> {
    i64::try_from(version.value())
        .map_err(|_| StoreError::Database(format!("version {version} out of range")))
}

fn from_db_version(version: i64) -> Result<Version, StoreError> {
    u64::try_from(version)
        .map(Version::new)
        .map_err(|_| StoreError::Database(format!("negative version {version} in database")))
}

fn record_duration(operation: &'static str, started: Instant) {
    metrics::histogram!("document_store_operation_duration_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

/// `PostgreSQL`-backed [`DocumentStore`].
#[derive(Clone, Debug)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Create the `documents` table and its indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run one write inside its own transaction.
    async fn write_one(&self, operation: &'static str, op: WriteOp) -> Result<Option<Version>, StoreError> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let version = apply(&mut tx, &op).await?;
        tx.commit().await.map_err(db_error)?;
        record_duration(operation, started);
        Ok(version)
    }
}

async fn current_version(
    conn: &mut PgConnection,
    collection: &str,
    id: &str,
) -> Result<Option<Version>, StoreError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT version FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;
    row.map(|(v,)| from_db_version(v)).transpose()
}

/// Explain why a guarded statement touched no row.
async fn precondition_failure(
    conn: &mut PgConnection,
    collection: &Collection,
    id: &DocumentId,
    expected: Option<Version>,
) -> StoreError {
    let actual = match current_version(conn, &collection.path(), id.as_str()).await {
        Ok(actual) => actual,
        Err(e) => return e,
    };
    match expected {
        Some(expected) => StoreError::Conflict {
            collection: collection.clone(),
            id: id.clone(),
            expected,
            actual,
        },
        None => StoreError::NotFound {
            collection: collection.clone(),
            id: id.clone(),
        },
    }
}

/// Apply one operation on `conn`. Returns the new version for creates and
/// updates.
async fn apply(conn: &mut PgConnection, op: &WriteOp) -> Result<Option<Version>, StoreError> {
    match op {
        WriteOp::Create {
            collection,
            id,
            body,
        } => {
            let row: Option<(i64,)> = sqlx::query_as(
                r"
                INSERT INTO documents (collection, id, version, body)
                VALUES ($1, $2, 1, $3)
                ON CONFLICT (collection, id) DO NOTHING
                RETURNING version
                ",
            )
            .bind(collection.path())
            .bind(id.as_str())
            .bind(body)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;

            match row {
                Some((v,)) => Ok(Some(from_db_version(v)?)),
                None => Err(StoreError::AlreadyExists {
                    collection: collection.clone(),
                    id: id.clone(),
                }),
            }
        }
        WriteOp::Update {
            collection,
            id,
            body,
            expected_version,
        } => {
            let expected = expected_version.map(to_db_version).transpose()?;
            let row: Option<(i64,)> = sqlx::query_as(
                r"
                UPDATE documents
                SET body = $3, version = version + 1, updated_at = now()
                WHERE collection = $1 AND id = $2
                  AND ($4::BIGINT IS NULL OR version = $4)
                RETURNING version
                ",
            )
            .bind(collection.path())
            .bind(id.as_str())
            .bind(body)
            .bind(expected)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;

            match row {
                Some((v,)) => Ok(Some(from_db_version(v)?)),
                None => Err(precondition_failure(conn, collection, id, *expected_version).await),
            }
        }
        WriteOp::Delete {
            collection,
            id,
            expected_version,
        } => {
            let expected = expected_version.map(to_db_version).transpose()?;
            let result = sqlx::query(
                r"
                DELETE FROM documents
                WHERE collection = $1 AND id = $2
                  AND ($3::BIGINT IS NULL OR version = $3)
                ",
            )
            .bind(collection.path())
            .bind(id.as_str())
            .bind(expected)
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;

            if result.rows_affected() == 0 {
                Err(precondition_failure(conn, collection, id, *expected_version).await)
            } else {
                Ok(None)
            }
        }
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn get(&self, collection: Collection, id: DocumentId) -> StoreFuture<'_, Option<StoredDocument>> {
        Box::pin(async move {
            let started = Instant::now();
            let row: Option<(i64, Value)> = sqlx::query_as(
                "SELECT version, body FROM documents WHERE collection = $1 AND id = $2",
            )
            .bind(collection.path())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            record_duration("get", started);

            row.map(|(version, body)| {
                Ok(StoredDocument {
                    id,
                    version: from_db_version(version)?,
                    body,
                })
            })
            .transpose()
        })
    }

    fn query(&self, collection: Collection, query: Query) -> StoreFuture<'_, Vec<StoredDocument>> {
        Box::pin(async move {
            let started = Instant::now();
            let rows: Vec<(String, i64, Value)> = sqlx::query_as(
                r"
                SELECT id, version, body FROM documents
                WHERE collection = $1 AND body @> $2
                ORDER BY id
                ",
            )
            .bind(collection.path())
            .bind(query.as_object())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            record_duration("query", started);

            tracing::debug!(%collection, rows = rows.len(), "document query");
            rows.into_iter()
                .map(|(id, version, body)| {
                    Ok(StoredDocument {
                        id: DocumentId::new(id),
                        version: from_db_version(version)?,
                        body,
                    })
                })
                .collect()
        })
    }

    fn create(&self, collection: Collection, id: DocumentId, body: Value) -> StoreFuture<'_, Version> {
        Box::pin(async move {
            self.write_one(
                "create",
                WriteOp::Create {
                    collection,
                    id,
                    body,
                },
            )
            .await?
            .ok_or_else(|| StoreError::Database("insert returned no version".to_string()))
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
            self.write_one(
                "update",
                WriteOp::Update {
                    collection,
                    id,
                    body,
                    expected_version,
                },
            )
            .await?
            .ok_or_else(|| StoreError::Database("update returned no version".to_string()))
        })
    }

    fn delete(
        &self,
        collection: Collection,
        id: DocumentId,
        expected_version: Option<Version>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.write_one(
                "delete",
                WriteOp::Delete {
                    collection,
                    id,
                    expected_version,
                },
            )
            .await
            .map(|_| ())
        })
    }

    fn batch_write(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if ops.is_empty() {
                return Ok(());
            }
            let started = Instant::now();
            let mut tx = self.pool.begin().await.map_err(db_error)?;
            for op in &ops {
                if let Err(e) = apply(&mut tx, op).await {
                    let (collection, id) = op.target();
                    tracing::debug!(%collection, %id, error = %e, "batch write rolled back");
                    // dropping the transaction rolls it back
                    return Err(e);
                }
            }
            tx.commit().await.map_err(db_error)?;
            record_duration("batch_write", started);
            Ok(())
        })
    }
}
