// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Payload data model.
//!
//! A [`Payload`] is the full serializable snapshot of one unit's form state.
//! It is produced by a snapshot of the form and replaces the previous
//! snapshot for that unit wholesale; there is no partial merge.
//!
//! # Example
//!
//! ```
//! use blend_sync::{CoalSelection, Payload, Row};
//!
//! let mut payload = Payload::empty();
//! payload.rows.push(Row {
//!     coal: CoalSelection::Uniform("C-17".into()),
//!     percentages: [Some(10.0), None, None, None, None, None, None, Some(12.5)],
//!     gcv: Some(4200.0),
//!     cost: None,
//! });
//!
//! // createdAt does not take part in the structural fingerprint
//! let mut later = payload.clone();
//! later.created_at = later.created_at + chrono::Duration::seconds(5);
//! assert!(payload.structurally_eq(&later));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// Number of mills (and bunkers) per unit.
pub const MILLS: usize = 8;

/// Current payload schema version.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Coal choice for a row.
///
/// Serialized untagged: a bare string for [`CoalSelection::Uniform`], an
/// object keyed by mill index for [`CoalSelection::PerMill`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CoalSelection {
    /// All mills burn the same coal.
    Uniform(String),
    /// At least one mill differs from the row's nominal coal.
    PerMill(BTreeMap<u8, String>),
}

impl Default for CoalSelection {
    fn default() -> Self {
        CoalSelection::Uniform(String::new())
    }
}

impl CoalSelection {
    /// Build a selection from the row's nominal coal and per-mill overrides.
    ///
    /// A mill's effective coal is its override when non-empty, else `nominal`.
    /// Returns `PerMill` iff some effective coal differs from `nominal`.
    #[must_use]
    pub fn from_mills(nominal: &str, overrides: &[String; MILLS]) -> Self {
        let effective: Vec<&str> = overrides
            .iter()
            .map(|o| if o.is_empty() { nominal } else { o.as_str() })
            .collect();

        if effective.iter().all(|c| *c == nominal) {
            return CoalSelection::Uniform(nominal.to_string());
        }

        let map = effective
            .into_iter()
            .enumerate()
            .filter(|(_, coal)| !coal.is_empty())
            .map(|(mill, coal)| (mill as u8, coal.to_string()))
            .collect();
        CoalSelection::PerMill(map)
    }

    /// Effective coal for a mill (empty string when unset).
    #[must_use]
    pub fn coal_for_mill(&self, mill: usize) -> &str {
        match self {
            CoalSelection::Uniform(coal) => coal,
            CoalSelection::PerMill(map) => u8::try_from(mill)
                .ok()
                .and_then(|m| map.get(&m))
                .map_or("", String::as_str),
        }
    }

    /// Nominal (row-level) coal.
    ///
    /// For `PerMill` this is the most frequent coal; ties go to the lowest mill.
    #[must_use]
    pub fn nominal(&self) -> &str {
        match self {
            CoalSelection::Uniform(coal) => coal,
            CoalSelection::PerMill(map) => {
                let mut best: Option<(&str, usize)> = None;
                for coal in map.values() {
                    let count = map.values().filter(|c| *c == coal).count();
                    if best.map_or(true, |(_, n)| count > n) {
                        best = Some((coal, count));
                    }
                }
                best.map_or("", |(coal, _)| coal)
            }
        }
    }

    /// True when the selection carries no coal at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            CoalSelection::Uniform(coal) => coal.is_empty(),
            CoalSelection::PerMill(map) => map.is_empty(),
        }
    }
}

// Untagged derive cannot read integer map keys back out of buffered content.
impl<'de> Deserialize<'de> for CoalSelection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SelectionVisitor;

        impl<'de> Visitor<'de> for SelectionVisitor {
            type Value = CoalSelection;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a coal id or a map of mill index to coal id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(CoalSelection::Uniform(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(CoalSelection::Uniform(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(CoalSelection::default())
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(CoalSelection::default())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = BTreeMap::new();
                while let Some((key, coal)) = access.next_entry::<String, String>()? {
                    let mill: u8 = key
                        .parse()
                        .ok()
                        .filter(|m| usize::from(*m) < MILLS)
                        .ok_or_else(|| de::Error::custom(format!("invalid mill index {:?}", key)))?;
                    map.insert(mill, coal);
                }
                Ok(CoalSelection::PerMill(map))
            }
        }

        deserializer.deserialize_any(SelectionVisitor)
    }
}

/// One blend row: a coal selection with its mill percentages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    #[serde(default)]
    pub coal: CoalSelection,
    #[serde(default)]
    pub percentages: [Option<f64>; MILLS],
    #[serde(default)]
    pub gcv: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Read-only display projection of a row inside a bunker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub bunker: u8,
    pub row_index: u8,
    #[serde(default)]
    pub coal: String,
    #[serde(default)]
    pub coal_name: String,
    #[serde(default)]
    pub gcv: Option<f64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub raw_duration_secs: f64,
    #[serde(default)]
    pub timer: String,
}

impl Layer {
    /// Set the residence time, keeping the formatted timer in step.
    pub fn set_duration(&mut self, secs: f64) {
        self.raw_duration_secs = secs;
        self.timer = format_duration(secs);
    }
}

/// Format a duration in seconds as `HH:MM:SS`.
///
/// Negative and non-finite inputs render as `00:00:00`; hours are not capped.
#[must_use]
pub fn format_duration(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 { secs.floor() as u64 } else { 0 };
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Snapshot of one unit's form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub flows: [Option<f64>; MILLS],
    #[serde(default)]
    pub generation: Option<f64>,
    #[serde(default)]
    pub bunker_capacity: Option<f64>,
    #[serde(default)]
    pub bunker_capacities: [Option<f64>; MILLS],
    #[serde(default)]
    pub coal_color_map: BTreeMap<String, String>,
    #[serde(default)]
    pub client_bunkers: [Vec<Layer>; MILLS],
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Structural view of a payload used for fingerprinting (no timestamp).
#[derive(Serialize)]
struct Structure<'a> {
    schema_version: u32,
    rows: &'a [Row],
    flows: &'a [Option<f64>; MILLS],
    generation: Option<f64>,
    bunker_capacity: Option<f64>,
    bunker_capacities: &'a [Option<f64>; MILLS],
    coal_color_map: &'a BTreeMap<String, String>,
    client_bunkers: &'a [Vec<Layer>; MILLS],
}

impl Payload {
    /// An empty payload stamped now.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            rows: Vec::new(),
            flows: [None; MILLS],
            generation: None,
            bunker_capacity: None,
            bunker_capacities: [None; MILLS],
            coal_color_map: BTreeMap::new(),
            client_bunkers: Default::default(),
            created_at: Utc::now(),
        }
    }

    /// SHA-256 over the canonical structure, hex encoded.
    ///
    /// Maps are `BTreeMap`s so the serialization is deterministic.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let structure = Structure {
            schema_version: self.schema_version,
            rows: &self.rows,
            flows: &self.flows,
            generation: self.generation,
            bunker_capacity: self.bunker_capacity,
            bunker_capacities: &self.bunker_capacities,
            coal_color_map: &self.coal_color_map,
            client_bunkers: &self.client_bunkers,
        };
        // Serializing plain data into a Vec cannot fail
        let bytes = serde_json::to_vec(&structure).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Same structure, ignoring `createdAt`.
    #[must_use]
    pub fn structurally_eq(&self, other: &Payload) -> bool {
        self.fingerprint() == other.fingerprint()
    }

    /// True when no row carries a coal or a percentage and all scalars are unset.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.rows
            .iter()
            .all(|r| r.coal.is_empty() && r.percentages.iter().all(Option::is_none))
            && self.flows.iter().all(Option::is_none)
            && self.generation.is_none()
            && self.bunker_capacity.is_none()
    }
}
