// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process stores.
//!
//! [`InMemoryKvStore`] backs the durable tier when no SQLite path is
//! configured. [`DelayedKvStore`] wraps it with fixed read and write
//! latency, so durable access suspends the caller the way a disk does.
//! [`InMemoryRemote`] stands in for the blend backend in tests and offline
//! embedding; it counts calls per operation and can be switched offline to
//! simulate network failure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::traits::{KvStore, RemoteStore, SavedRecord, StorageError};
use crate::mapping::UnitMap;
use crate::payload::Payload;
use crate::unit::Unit;

pub struct InMemoryKvStore {
    data: DashMap<String, String>,
    writes: DashMap<String, usize>,
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            writes: DashMap::new(),
        }
    }

    /// Number of `put` calls seen for a key
    #[must_use]
    pub fn write_count(&self, key: &str) -> usize {
        self.writes.get(key).map_or(0, |n| *n)
    }

    /// Raw value, bypassing the trait (for inspection)
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|v| v.value().clone())
    }

    /// Store a raw value without counting it as a write
    pub fn seed(&self, key: &str, value: impl Into<String>) {
        self.data.insert(key.to_string(), value.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.raw(key))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value.to_string());
        *self.writes.entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }
}

/// [`InMemoryKvStore`] with latency injected before every access.
pub struct DelayedKvStore {
    inner: InMemoryKvStore,
    read_delay: Duration,
    write_delay: Duration,
}

impl DelayedKvStore {
    #[must_use]
    pub fn new(read_delay: Duration, write_delay: Duration) -> Self {
        Self {
            inner: InMemoryKvStore::new(),
            read_delay,
            write_delay,
        }
    }

    /// The wrapped store, for seeding and inspection without delay.
    #[must_use]
    pub fn inner(&self) -> &InMemoryKvStore {
        &self.inner
    }
}

#[async_trait]
impl KvStore for DelayedKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        tokio::time::sleep(self.write_delay).await;
        self.inner.put(key, value).await
    }
}

/// Remote operations counted by [`InMemoryRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Latest,
    Fetch,
    Create,
    Update,
    FetchUnits,
    InitUnits,
    AssignUnit,
}

pub struct InMemoryRemote {
    records: DashMap<String, Option<Payload>>,
    units: Mutex<UnitMap>,
    latest: Mutex<Option<String>>,
    calls: DashMap<RemoteOp, usize>,
    next_id: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            units: Mutex::new(UnitMap::default()),
            latest: Mutex::new(None),
            calls: DashMap::new(),
            next_id: AtomicU64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate network loss: every call fails with `StorageError::Network`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Insert a record directly (no call counted).
    pub fn put_record(&self, id: &str, payload: Option<Payload>) {
        self.records.insert(id.to_string(), payload);
        *self.latest.lock() = Some(id.to_string());
    }

    /// Map a unit directly (no call counted).
    pub fn map_unit(&self, unit: Unit, id: &str) {
        self.units.lock().insert(unit, id.to_string());
    }

    #[must_use]
    pub fn record(&self, id: &str) -> Option<Payload> {
        self.records.get(id).and_then(|r| r.value().clone())
    }

    #[must_use]
    pub fn units(&self) -> UnitMap {
        self.units.lock().clone()
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.calls.get(&op).map_or(0, |n| *n)
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|e| *e.value()).sum()
    }

    /// Per-operation call counts, ordered for stable assertions.
    #[must_use]
    pub fn call_summary(&self) -> BTreeMap<String, usize> {
        self.calls
            .iter()
            .map(|e| (format!("{:?}", e.key()), *e.value()))
            .collect()
    }

    fn enter(&self, op: RemoteOp) -> Result<(), StorageError> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.offline.load(Ordering::Acquire) {
            return Err(StorageError::Network("remote offline".to_string()));
        }
        Ok(())
    }

    fn allocate_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn latest_record_id(&self) -> Result<Option<String>, StorageError> {
        self.enter(RemoteOp::Latest)?;
        Ok(self.latest.lock().clone())
    }

    async fn fetch_record(&self, id: &str) -> Result<Option<Payload>, StorageError> {
        self.enter(RemoteOp::Fetch)?;
        Ok(self.record(id))
    }

    async fn create_record(&self, payload: &Payload) -> Result<SavedRecord, StorageError> {
        self.enter(RemoteOp::Create)?;
        let id = self.allocate_id();
        self.put_record(&id, Some(payload.clone()));
        Ok(SavedRecord { id: Some(id), payload: Some(payload.clone()) })
    }

    async fn update_record(&self, id: &str, payload: &Payload) -> Result<SavedRecord, StorageError> {
        self.enter(RemoteOp::Update)?;
        if !self.records.contains_key(id) {
            return Err(StorageError::Status { operation: "update_record", status: 404 });
        }
        self.put_record(id, Some(payload.clone()));
        Ok(SavedRecord { id: Some(id.to_string()), payload: Some(payload.clone()) })
    }

    async fn fetch_unit_map(&self) -> Result<UnitMap, StorageError> {
        self.enter(RemoteOp::FetchUnits)?;
        Ok(self.units())
    }

    async fn init_unit_map(&self) -> Result<UnitMap, StorageError> {
        self.enter(RemoteOp::InitUnits)?;
        let mut units = self.units.lock();
        for unit in units.missing() {
            let id = self.allocate_id();
            self.records.insert(id.clone(), None);
            units.insert(unit, id);
        }
        Ok(units.clone())
    }

    async fn assign_unit(&self, unit: Unit, record_id: &str) -> Result<(), StorageError> {
        self.enter(RemoteOp::AssignUnit)?;
        self.units.lock().insert(unit, record_id.to_string());
        Ok(())
    }
}
