// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite backend for the durable tier.
//!
//! One table of text values:
//! ```sql
//! CREATE TABLE blend_kv (
//!   key TEXT PRIMARY KEY,
//!   value TEXT NOT NULL,
//!   updated_at INTEGER NOT NULL   -- unix millis
//! )
//! ```

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::Row;

use super::traits::{KvStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Open (creating if needed) with startup-mode retry.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .create_if_missing(true)
            // WAL: readers don't block the flush writer
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = retry("sqlite_connect", &RetryConfig::startup(), || async {
            SqlitePoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS blend_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#;

        retry("sqlite_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM blend_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(|r| r.try_get::<String, _>("value"))
            .transpose()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO blend_kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> SqliteKvStore {
        let path = dir.path().join("blend.db");
        SqliteKvStore::new(&format!("sqlite://{}", path.display())).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir).await;

        assert!(store.get("blend.activeUnit").await.unwrap().is_none());
        store.put("blend.activeUnit", "2").await.unwrap();
        store.put("blend.activeUnit", "3").await.unwrap();
        assert_eq!(store.get("blend.activeUnit").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir).await;
            store.put("blend.unitMap", r#"{"1":"abc"}"#).await.unwrap();
            store.close().await;
        }
        let store = open(&dir).await;
        assert_eq!(store.get("blend.unitMap").await.unwrap().as_deref(), Some(r#"{"1":"abc"}"#));
    }
}
