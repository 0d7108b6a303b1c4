// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::BTreeMap;

use dashmap::DashMap;

use crate::payload::Payload;
use crate::unit::Unit;

/// Tier 1: per-unit payloads held in process memory.
pub struct MemoryTier {
    entries: DashMap<Unit, Payload>,
}

impl MemoryTier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, unit: Unit) -> Option<Payload> {
        self.entries.get(&unit).map(|e| e.value().clone())
    }

    /// Replace the unit's payload wholesale.
    pub fn set(&self, unit: Unit, payload: Payload) {
        self.entries.insert(unit, payload);
    }

    /// Seed only if the unit has no entry yet. Returns true when inserted.
    pub fn insert_if_absent(&self, unit: Unit, payload: Payload) -> bool {
        let mut inserted = false;
        self.entries.entry(unit).or_insert_with(|| {
            inserted = true;
            payload
        });
        inserted
    }

    #[must_use]
    pub fn contains(&self, unit: Unit) -> bool {
        self.entries.contains_key(&unit)
    }

    /// Fingerprint of the cached payload, if any.
    #[must_use]
    pub fn fingerprint(&self, unit: Unit) -> Option<String> {
        self.entries.get(&unit).map(|e| e.value().fingerprint())
    }

    /// Ordered copy of every entry (what the durable flush serializes).
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Unit, Payload> {
        self.entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}
