// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP remote tier over the blend backend.
//!
//! `send_once` is the only place status codes are interpreted:
//!
//! | status        | result                                   |
//! |---------------|------------------------------------------|
//! | 2xx           | body as JSON (empty body → `null`)       |
//! | 404           | `Reply::Missing`                         |
//! | anything else | `StorageError::Status`                   |
//! | transport     | `StorageError::Network`                  |
//!
//! Idempotent GETs are retried on retryable errors; writes go out once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::traits::{RemoteStore, SavedRecord, StorageError};
use super::wire::{self, AssignBody, RecordEnvelope};
use crate::config::BlendSyncConfig;
use crate::mapping::UnitMap;
use crate::metrics::LatencyTimer;
use crate::payload::Payload;
use crate::resilience::retry::{retry_when, RetryConfig};
use crate::unit::Unit;

/// A successful exchange: a JSON body, or a 404.
#[derive(Debug)]
enum Reply {
    Body(Value),
    Missing,
}

impl Reply {
    /// For operations where 404 is an error.
    fn require(self, operation: &'static str) -> Result<Value, StorageError> {
        match self {
            Reply::Body(value) => Ok(value),
            Reply::Missing => Err(StorageError::Status { operation, status: 404 }),
        }
    }

    /// For operations where 404 means "nothing there".
    fn optional(self) -> Value {
        match self {
            Reply::Body(value) => value,
            Reply::Missing => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpRemoteStore {
    pub fn new(config: &BlendSyncConfig) -> Result<Self, StorageError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| StorageError::Backend(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryConfig::remote(config.remote_max_retries),
        })
    }

    /// Override the retry policy for GETs.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_once(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Reply, StorageError> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Network(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| StorageError::Network(format!("failed to read response body: {}", e)))?;
                if text.trim().is_empty() {
                    return Ok(Reply::Body(Value::Null));
                }
                serde_json::from_str(&text)
                    .map(Reply::Body)
                    .map_err(|e| StorageError::Malformed { key: operation.to_string(), reason: e.to_string() })
            }
            StatusCode::NOT_FOUND => {
                debug!(operation, path, "Remote returned 404");
                Ok(Reply::Missing)
            }
            status => Err(StorageError::Status { operation, status: status.as_u16() }),
        }
    }

    async fn get(&self, operation: &'static str, path: &str) -> Result<Reply, StorageError> {
        let _timer = LatencyTimer::new("remote", operation);
        retry_when(operation, &self.retry, StorageError::is_retryable, || {
            self.send_once(operation, Method::GET, path, None)
        })
        .await
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<Reply, StorageError> {
        let _timer = LatencyTimer::new("remote", operation);
        self.send_once(operation, method, path, Some(body)).await
    }

    fn payload_body(payload: &Payload) -> Result<Value, StorageError> {
        serde_json::to_value(payload).map_err(|e| StorageError::Backend(format!("serialize payload: {}", e)))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn latest_record_id(&self) -> Result<Option<String>, StorageError> {
        let reply = self.get("latest_record", "/blend/latest").await?;
        Ok(wire::decode_latest_id(reply.optional()))
    }

    async fn fetch_record(&self, id: &str) -> Result<Option<Payload>, StorageError> {
        let reply = self.get("fetch_record", &format!("/blend/{}", id)).await?;
        Ok(RecordEnvelope::decode(reply.optional())?.payload)
    }

    async fn create_record(&self, payload: &Payload) -> Result<SavedRecord, StorageError> {
        let body = Self::payload_body(payload)?;
        let value = self
            .send("create_record", Method::POST, "/blend", &body)
            .await?
            .require("create_record")?;
        Ok(RecordEnvelope::decode(value)?.into())
    }

    async fn update_record(&self, id: &str, payload: &Payload) -> Result<SavedRecord, StorageError> {
        let body = Self::payload_body(payload)?;
        let value = self
            .send("update_record", Method::PUT, &format!("/blend/{}", id), &body)
            .await?
            .require("update_record")?;
        Ok(RecordEnvelope::decode(value)?.into())
    }

    async fn fetch_unit_map(&self) -> Result<UnitMap, StorageError> {
        let reply = self.get("fetch_units", "/units").await?;
        wire::decode_unit_map(reply.optional())
    }

    async fn init_unit_map(&self) -> Result<UnitMap, StorageError> {
        let value = self
            .send("init_units", Method::POST, "/units/init", &Value::Null)
            .await?
            .require("init_units")?;
        wire::decode_unit_map(value)
    }

    async fn assign_unit(&self, unit: Unit, record_id: &str) -> Result<(), StorageError> {
        let body = serde_json::to_value(AssignBody { blend_id: record_id.to_string() })
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        self.send("assign_unit", Method::PUT, &format!("/units/{}", unit), &body)
            .await?
            .require("assign_unit")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = BlendSyncConfig {
            base_url: "http://plant.local/api/".into(),
            ..Default::default()
        };
        let store = HttpRemoteStore::new(&config).unwrap();
        assert_eq!(store.base_url(), "http://plant.local/api");
        assert_eq!(store.url("/units"), "http://plant.local/api/units");
    }

    #[test]
    fn test_reply_404_handling() {
        assert!(Reply::Missing.optional().is_null());
        let err = Reply::Missing.require("update_record").unwrap_err();
        assert!(matches!(err, StorageError::Status { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let config = BlendSyncConfig {
            base_url: "http://127.0.0.1:1".into(),
            request_timeout_secs: Some(2),
            ..Default::default()
        };
        let store = HttpRemoteStore::new(&config).unwrap().with_retry(RetryConfig::test());
        let err = store.fetch_unit_map().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
