//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DocumentStore` port from the `core` crate. It keeps each client
//! document as one SQLite row and bumps its version on every replace.

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use toy_stories_core::ports::{DocumentKey, DocumentStore, PortError, PortResult, StoredDocument};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Creates a new `SqliteDocumentStore`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    body: String,
    version: i64,
}

impl DocumentRecord {
    fn to_domain(self) -> StoredDocument {
        StoredDocument {
            body: self.body,
            version: self.version.max(0) as u64,
        }
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn conflict(owner: &str, key: DocumentKey, expected: u64) -> PortError {
    PortError::Conflict(format!(
        "{} for {} is no longer at version {}",
        key.as_str(),
        owner,
        expected
    ))
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn load(&self, owner: &str, key: DocumentKey) -> PortResult<Option<StoredDocument>> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT body, version FROM documents WHERE owner = ? AND key = ?",
        )
        .bind(owner)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(DocumentRecord::to_domain))
    }

    async fn replace(
        &self,
        owner: &str,
        key: DocumentKey,
        body: &str,
        expected_version: Option<u64>,
    ) -> PortResult<u64> {
        let version: Option<i64> = match expected_version {
            None => sqlx::query_scalar(
                "INSERT INTO documents (owner, key, body, version) VALUES (?, ?, ?, 1) \
                 ON CONFLICT (owner, key) DO UPDATE SET body = excluded.body, \
                 version = documents.version + 1, updated_at = CURRENT_TIMESTAMP \
                 RETURNING version",
            )
            .bind(owner)
            .bind(key.as_str())
            .bind(body)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?,

            // Version 0 means the document must not exist yet.
            Some(0) => sqlx::query_scalar(
                "INSERT INTO documents (owner, key, body, version) VALUES (?, ?, ?, 1) \
                 ON CONFLICT (owner, key) DO NOTHING RETURNING version",
            )
            .bind(owner)
            .bind(key.as_str())
            .bind(body)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?,

            Some(expected) => sqlx::query_scalar(
                "UPDATE documents SET body = ?, version = version + 1, \
                 updated_at = CURRENT_TIMESTAMP \
                 WHERE owner = ? AND key = ? AND version = ? RETURNING version",
            )
            .bind(body)
            .bind(owner)
            .bind(key.as_str())
            .bind(expected as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?,
        };

        match version {
            Some(version) => Ok(version as u64),
            None => Err(conflict(owner, key, expected_version.unwrap_or_default())),
        }
    }

    async fn clear(&self, owner: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM documents WHERE owner = ?")
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
