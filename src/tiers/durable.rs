// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tier 2: durable local cache.
//!
//! Everything is stored as JSON text under the fixed keys in
//! [`crate::storage::keys`]. Reads never fail: an absent, unreadable or
//! corrupt value is logged and treated as absent.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::mapping::UnitMap;
use crate::payload::Payload;
use crate::storage::keys;
use crate::storage::traits::{KvStore, StorageError};
use crate::unit::Unit;

pub struct DurableTier {
    store: Arc<dyn KvStore>,
}

impl DurableTier {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Raw text for a key; backend errors degrade to `None`.
    async fn read_raw(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Durable read failed, treating as absent");
                crate::metrics::record_error("durable", "get", e.kind());
                None
            }
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = StorageError::Malformed { key: key.to_string(), reason: e.to_string() };
                warn!(error = %err, "Ignoring corrupt durable value");
                crate::metrics::record_error("durable", "parse", err.kind());
                None
            }
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<usize, StorageError> {
        let text = serde_json::to_string(value)
            .map_err(|e| StorageError::Backend(format!("serialize {}: {}", key, e)))?;
        self.store.put(key, &text).await?;
        Ok(text.len())
    }

    // --- Payload cache ---

    /// Every cached payload. Entries that fail to parse are skipped.
    pub async fn load_payloads(&self) -> BTreeMap<Unit, Payload> {
        let Some(entries) = self.read_json::<BTreeMap<String, Value>>(keys::UNIT_PAYLOADS).await else {
            return BTreeMap::new();
        };

        let mut payloads = BTreeMap::new();
        for (key, value) in entries {
            let Ok(unit) = key.parse::<Unit>() else {
                debug!(key = %key, "Skipping cached payload for unknown unit");
                continue;
            };
            match serde_json::from_value::<Payload>(value) {
                Ok(payload) => {
                    payloads.insert(unit, payload);
                }
                Err(e) => {
                    warn!(unit = %unit, error = %e, "Skipping corrupt cached payload");
                    crate::metrics::record_error("durable", "parse", "malformed");
                }
            }
        }
        payloads
    }

    pub async fn load_payload(&self, unit: Unit) -> Option<Payload> {
        self.load_payloads().await.remove(&unit)
    }

    /// Overwrite the whole payload cache. Only the persist writer calls this.
    pub(crate) async fn write_payloads(&self, payloads: &BTreeMap<Unit, Payload>) -> Result<usize, StorageError> {
        self.write_json(keys::UNIT_PAYLOADS, payloads).await
    }

    // --- Active unit ---

    /// Last selected unit, clamped into range.
    pub async fn load_active_unit(&self) -> Option<Unit> {
        let raw = self.read_raw(keys::ACTIVE_UNIT).await?;
        match raw.trim().trim_matches('"').parse::<i64>() {
            Ok(n) => Some(Unit::clamp(n)),
            Err(_) => {
                warn!(value = %raw, "Ignoring corrupt active unit");
                None
            }
        }
    }

    pub async fn store_active_unit(&self, unit: Unit) -> Result<(), StorageError> {
        self.store.put(keys::ACTIVE_UNIT, &unit.number().to_string()).await
    }

    // --- Unit map fallback ---

    pub async fn load_unit_map(&self) -> UnitMap {
        self.read_json(keys::UNIT_MAP).await.unwrap_or_default()
    }

    /// Full replace of the local fallback map.
    pub async fn store_unit_map(&self, map: &UnitMap) -> Result<(), StorageError> {
        self.write_json(keys::UNIT_MAP, map).await.map(|_| ())
    }

    // --- Coal colors ---

    pub async fn load_coal_colors(&self) -> BTreeMap<String, String> {
        self.read_json(keys::COAL_COLORS).await.unwrap_or_default()
    }

    /// Merge (not replace) colors into the stored map.
    pub async fn merge_coal_colors(&self, colors: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if colors.is_empty() {
            return Ok(());
        }
        let mut merged = self.load_coal_colors().await;
        let before = merged.clone();
        merged.extend(colors.iter().map(|(k, v)| (k.clone(), v.clone())));
        if merged == before {
            return Ok(());
        }
        self.write_json(keys::COAL_COLORS, &merged).await.map(|_| ())
    }
}
