// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::mapping::UnitMap;
use crate::payload::Payload;
use crate::unit::Unit;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Record not found")]
    NotFound,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Remote returned status {status} for {operation}")]
    Status { operation: &'static str, status: u16 },
    #[error("Malformed data for '{key}': {reason}")]
    Malformed { key: String, reason: String },
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Transient failures worth another attempt on idempotent reads.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Network(_) => true,
            StorageError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::NotFound => "not_found",
            StorageError::Network(_) => "network",
            StorageError::Status { .. } => "status",
            StorageError::Malformed { .. } => "malformed",
            StorageError::Backend(_) => "backend",
        }
    }
}

/// Outcome of a create or update against the remote tier.
#[derive(Debug, Clone)]
pub struct SavedRecord {
    /// Record id reported by the server (`id` or `_id`)
    pub id: Option<String>,
    /// Server's normalized echo of the payload, when it sends one
    pub payload: Option<Payload>,
}

/// String-keyed blob store backing the durable tier.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Remote system of record for payloads and the unit mapping.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Id of the most recently saved record, if any.
    async fn latest_record_id(&self) -> Result<Option<String>, StorageError>;

    /// Fetch a record's payload. `Ok(None)` when the record does not exist
    /// or carries no payload.
    async fn fetch_record(&self, id: &str) -> Result<Option<Payload>, StorageError>;

    async fn create_record(&self, payload: &Payload) -> Result<SavedRecord, StorageError>;

    async fn update_record(&self, id: &str, payload: &Payload) -> Result<SavedRecord, StorageError>;

    async fn fetch_unit_map(&self) -> Result<UnitMap, StorageError>;

    /// Create mappings for any unit lacking one. Idempotent.
    async fn init_unit_map(&self) -> Result<UnitMap, StorageError>;

    /// Associate a unit with a record id.
    async fn assign_unit(&self, unit: Unit, record_id: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StorageError::Network("reset".into()).is_retryable());
        assert!(StorageError::Status { operation: "fetch_record", status: 503 }.is_retryable());
        assert!(StorageError::Status { operation: "fetch_record", status: 429 }.is_retryable());
        assert!(!StorageError::Status { operation: "fetch_record", status: 400 }.is_retryable());
        assert!(!StorageError::NotFound.is_retryable());
        assert!(!StorageError::Backend("disk".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = StorageError::Status { operation: "create_record", status: 500 };
        assert_eq!(err.to_string(), "Remote returned status 500 for create_record");
        let err = StorageError::Malformed { key: "blend.unitMap".into(), reason: "eof".into() };
        assert!(err.to_string().contains("blend.unitMap"));
        assert_eq!(err.kind(), "malformed");
    }
}
