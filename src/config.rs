// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the blend sync engine.
//!
//! # Example
//!
//! ```
//! use blend_sync::BlendSyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = BlendSyncConfig::default();
//! assert_eq!(config.max_rows, 5);
//! assert_eq!(config.persist_batch_ms, 300);
//! assert_eq!(config.autosave_debounce_ms, 180);
//!
//! // Explicit config
//! let config = BlendSyncConfig {
//!     base_url: "https://plant.example/api".into(),
//!     durable_url: Some("sqlite:blend_cache.db".into()),
//!     max_rows: 6,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the blend sync engine.
///
/// All fields have defaults. `base_url` should point at the blend backend
/// for anything other than local testing.
#[derive(Debug, Clone, Deserialize)]
pub struct BlendSyncConfig {
    /// Base URL of the remote blend API (e.g., "http://localhost:5000/api")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// SQLite connection string for the durable tier (e.g., "sqlite:blend_cache.db").
    /// `None` keeps the durable tier in memory.
    #[serde(default)]
    pub durable_url: Option<String>,

    /// Number of blend rows on the form (default: 5)
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Durable flush batching window
    #[serde(default = "default_persist_batch_ms")]
    pub persist_batch_ms: u64,

    /// Quiet period after the last edit before an autosave capture
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,

    /// Delay after a switch before warming the other units
    #[serde(default = "default_prefetch_delay_ms")]
    pub prefetch_delay_ms: u64,

    /// Per-request timeout. `None` waits indefinitely.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Attempts for idempotent remote reads (1 = no retry)
    #[serde(default = "default_remote_max_retries")]
    pub remote_max_retries: usize,
}

fn default_base_url() -> String { "http://localhost:5000/api".to_string() }
fn default_max_rows() -> usize { 5 }
fn default_persist_batch_ms() -> u64 { 300 }
fn default_autosave_debounce_ms() -> u64 { 180 }
fn default_prefetch_delay_ms() -> u64 { 250 }
fn default_remote_max_retries() -> usize { 2 }

impl Default for BlendSyncConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            durable_url: None,
            max_rows: default_max_rows(),
            persist_batch_ms: default_persist_batch_ms(),
            autosave_debounce_ms: default_autosave_debounce_ms(),
            prefetch_delay_ms: default_prefetch_delay_ms(),
            request_timeout_secs: None,
            remote_max_retries: default_remote_max_retries(),
        }
    }
}

impl BlendSyncConfig {
    #[must_use]
    pub fn persist_window(&self) -> Duration {
        Duration::from_millis(self.persist_batch_ms)
    }

    #[must_use]
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    #[must_use]
    pub fn prefetch_delay(&self) -> Duration {
        Duration::from_millis(self.prefetch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: BlendSyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.base_url, "http://localhost:5000/api");
        assert_eq!(config.max_rows, 5);
        assert_eq!(config.persist_batch_ms, 300);
        assert_eq!(config.autosave_debounce_ms, 180);
        assert!(config.request_timeout_secs.is_none());
        assert!(config.durable_url.is_none());
    }

    #[test]
    fn test_deserialize_overrides() {
        let config: BlendSyncConfig = serde_json::from_str(
            r#"{"base_url": "http://x/api", "max_rows": 7, "request_timeout_secs": 10}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://x/api");
        assert_eq!(config.max_rows, 7);
        assert_eq!(config.request_timeout_secs, Some(10));
        assert_eq!(config.prefetch_delay_ms, 250);
    }

    #[test]
    fn test_durations() {
        let config = BlendSyncConfig::default();
        assert_eq!(config.persist_window(), Duration::from_millis(300));
        assert_eq!(config.debounce_delay(), Duration::from_millis(180));
        assert_eq!(config.prefetch_delay(), Duration::from_millis(250));
    }
}
