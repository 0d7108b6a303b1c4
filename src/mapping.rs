// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Unit → record id resolution.
//!
//! Two copies of the mapping exist:
//!
//! - the **remote map**, held in process by [`UnitMapResolver`] and refreshed
//!   from the backend;
//! - the **fallback map** in the durable tier, fully replaced on every
//!   successful refresh.
//!
//! Lookup order is remote map → fresh fetch → fallback. A unit with no id
//! is a normal state (nothing saved yet), so resolution returns `Option`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::traits::RemoteStore;
use crate::tiers::DurableTier;
use crate::unit::Unit;

/// Mapping from unit to remote record id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitMap(BTreeMap<Unit, String>);

impl UnitMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, unit: Unit) -> Option<&str> {
        self.0.get(&unit).map(String::as_str)
    }

    pub fn insert(&mut self, unit: Unit, id: String) {
        self.0.insert(unit, id);
    }

    /// True when all three units have an id.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        Unit::ALL.iter().all(|u| self.0.contains_key(u))
    }

    /// Units with no id, ascending.
    #[must_use]
    pub fn missing(&self) -> Vec<Unit> {
        Unit::ALL.into_iter().filter(|u| !self.0.contains_key(u)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Unit, &str)> {
        self.0.iter().map(|(u, id)| (*u, id.as_str()))
    }
}

impl FromIterator<(Unit, String)> for UnitMap {
    fn from_iter<I: IntoIterator<Item = (Unit, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resolves units to record ids; sole writer of the in-process remote map.
pub struct UnitMapResolver {
    remote: Arc<dyn RemoteStore>,
    durable: Arc<DurableTier>,
    remote_map: RwLock<UnitMap>,
}

impl UnitMapResolver {
    pub fn new(remote: Arc<dyn RemoteStore>, durable: Arc<DurableTier>) -> Self {
        Self {
            remote,
            durable,
            remote_map: RwLock::new(UnitMap::default()),
        }
    }

    /// Copy of the in-process remote map.
    #[must_use]
    pub fn snapshot(&self) -> UnitMap {
        self.remote_map.read().clone()
    }

    /// Record id for a unit, or `None` when the unit was never saved.
    #[tracing::instrument(skip(self), fields(source))]
    pub async fn resolve_unit_id(&self, unit: Unit) -> Option<String> {
        let held = self.remote_map.read().get(unit).map(str::to_string);
        if held.is_some() {
            tracing::Span::current().record("source", "remote_map");
            return held;
        }

        if let Some(id) = self.refresh().await.get(unit) {
            tracing::Span::current().record("source", "fetch");
            return Some(id.to_string());
        }

        let fallback = self.durable.load_unit_map().await;
        let id = fallback.get(unit).map(str::to_string);
        tracing::Span::current().record("source", if id.is_some() { "fallback" } else { "none" });
        debug!(found = id.is_some(), "Resolved from local fallback map");
        id
    }

    /// Fetch the remote map. Failure yields an empty map for this call and
    /// leaves the held copies untouched.
    pub async fn refresh(&self) -> UnitMap {
        match self.remote.fetch_unit_map().await {
            Ok(map) => {
                crate::metrics::record_remote_call("fetch_units", "success");
                self.adopt(map.clone()).await;
                map
            }
            Err(e) => {
                warn!(error = %e, "Unit map fetch failed");
                crate::metrics::record_remote_call("fetch_units", e.kind());
                UnitMap::default()
            }
        }
    }

    /// Make sure every unit has a record id, creating missing ones remotely.
    ///
    /// Degrades to the last successful fetch (possibly empty) on failure.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_mapping(&self) -> UnitMap {
        let fetched = self.refresh().await;
        if fetched.is_complete() {
            return fetched;
        }

        info!(missing = ?fetched.missing(), "Initializing missing unit mappings");
        match self.remote.init_unit_map().await {
            Ok(map) => {
                crate::metrics::record_remote_call("init_units", "success");
                self.adopt(map.clone()).await;
                map
            }
            Err(e) => {
                warn!(error = %e, "Unit map init failed, keeping last fetched map");
                crate::metrics::record_remote_call("init_units", e.kind());
                self.snapshot()
            }
        }
    }

    /// Register a freshly created record for a unit in both copies.
    pub async fn record_created(&self, unit: Unit, id: &str) {
        let map = {
            let mut remote_map = self.remote_map.write();
            remote_map.insert(unit, id.to_string());
            remote_map.clone()
        };

        let mut fallback = self.durable.load_unit_map().await;
        fallback.insert(unit, id.to_string());
        // Entries already in the fallback survive; in-process ids win on conflict
        for (u, known) in map.iter() {
            fallback.insert(u, known.to_string());
        }
        if let Err(e) = self.durable.store_unit_map(&fallback).await {
            warn!(error = %e, unit = %unit, "Failed to persist fallback unit map");
        }
    }

    /// Full replace of both copies.
    async fn adopt(&self, map: UnitMap) {
        if let Err(e) = self.durable.store_unit_map(&map).await {
            warn!(error = %e, "Failed to persist fallback unit map");
        }
        *self.remote_map.write() = map;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryKvStore, InMemoryRemote, RemoteOp};

    struct Fixture {
        remote: Arc<InMemoryRemote>,
        durable: Arc<DurableTier>,
        resolver: UnitMapResolver,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(InMemoryRemote::new());
        let durable = Arc::new(DurableTier::new(Arc::new(InMemoryKvStore::new())));
        let resolver = UnitMapResolver::new(remote.clone(), durable.clone());
        Fixture { remote, durable, resolver }
    }

    #[test]
    fn test_unit_map_completeness() {
        let mut map = UnitMap::new();
        assert_eq!(map.missing(), Unit::ALL.to_vec());
        map.insert(Unit::One, "a".into());
        map.insert(Unit::Three, "c".into());
        assert!(!map.is_complete());
        assert_eq!(map.missing(), vec![Unit::Two]);
        map.insert(Unit::Two, "b".into());
        assert!(map.is_complete());
        assert_eq!(map.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_fetches_then_serves_from_remote_map() {
        let f = fixture();
        f.remote.map_unit(Unit::Two, "rec-2");

        assert_eq!(f.resolver.resolve_unit_id(Unit::Two).await.as_deref(), Some("rec-2"));
        assert_eq!(f.resolver.resolve_unit_id(Unit::Two).await.as_deref(), Some("rec-2"));
        assert_eq!(f.remote.calls(RemoteOp::FetchUnits), 1);
    }

    #[tokio::test]
    async fn test_successful_fetch_replaces_fallback() {
        let f = fixture();
        let mut stale = UnitMap::new();
        stale.insert(Unit::Three, "old".into());
        f.durable.store_unit_map(&stale).await.unwrap();

        f.remote.map_unit(Unit::One, "rec-1");
        f.resolver.refresh().await;

        let fallback = f.durable.load_unit_map().await;
        assert_eq!(fallback.get(Unit::One), Some("rec-1"));
        assert_eq!(fallback.get(Unit::Three), None);
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_local_map() {
        let f = fixture();
        let mut local = UnitMap::new();
        local.insert(Unit::One, "local-1".into());
        f.durable.store_unit_map(&local).await.unwrap();
        f.remote.set_offline(true);

        assert_eq!(f.resolver.resolve_unit_id(Unit::One).await.as_deref(), Some("local-1"));
        assert_eq!(f.resolver.resolve_unit_id(Unit::Two).await, None);
        assert!(f.resolver.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_yields_empty_map() {
        let f = fixture();
        f.remote.set_offline(true);
        assert!(f.resolver.refresh().await.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_mapping_complete_skips_init() {
        let f = fixture();
        for unit in Unit::ALL {
            f.remote.map_unit(unit, &format!("rec-{}", unit));
        }
        let map = f.resolver.ensure_mapping().await;
        assert!(map.is_complete());
        assert_eq!(f.remote.calls(RemoteOp::InitUnits), 0);
    }

    #[tokio::test]
    async fn test_ensure_mapping_is_idempotent() {
        let f = fixture();
        f.remote.map_unit(Unit::One, "keep");

        let first = f.resolver.ensure_mapping().await;
        let second = f.resolver.ensure_mapping().await;

        assert!(first.is_complete());
        assert_eq!(first, second);
        assert_eq!(first.get(Unit::One), Some("keep"));
        assert_eq!(f.remote.calls(RemoteOp::InitUnits), 1);
        assert_eq!(f.durable.load_unit_map().await, first);
    }

    #[tokio::test]
    async fn test_ensure_mapping_offline_returns_last_fetch() {
        let f = fixture();
        f.remote.map_unit(Unit::One, "rec-1");
        f.resolver.refresh().await;

        f.remote.set_offline(true);
        let map = f.resolver.ensure_mapping().await;
        assert_eq!(map.get(Unit::One), Some("rec-1"));
    }

    #[tokio::test]
    async fn test_record_created_serves_without_network() {
        let f = fixture();
        f.resolver.record_created(Unit::Three, "new-3").await;
        f.remote.set_offline(true);

        assert_eq!(f.resolver.resolve_unit_id(Unit::Three).await.as_deref(), Some("new-3"));
        assert_eq!(f.remote.total_calls(), 0);
        assert_eq!(f.durable.load_unit_map().await.get(Unit::Three), Some("new-3"));
    }
}
