// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Wire contract for the blend backend.
//!
//! Record responses come in three historical shapes:
//!
//! ```text
//! { "id":  "...", "payload": { ...Payload } }   current
//! { "_id": "...", "data":    { ...Payload } }   document-store shape
//! { "_id": "...", "rows": [...], ... }          v0: payload at top level
//! ```
//!
//! [`RecordEnvelope::decode`] is the single place these are told apart.
//! Unit maps are parsed leniently: unknown keys and null ids are dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::traits::{SavedRecord, StorageError};
use crate::mapping::UnitMap;
use crate::payload::Payload;
use crate::unit::Unit;

/// Top-level keys that mark a bare (v0) payload.
const V0_PAYLOAD_KEYS: [&str; 6] = [
    "rows",
    "flows",
    "generation",
    "bunkerCapacity",
    "clientBunkers",
    "createdAt",
];

/// A decoded record response.
#[derive(Debug, Clone, Default)]
pub struct RecordEnvelope {
    pub id: Option<String>,
    pub payload: Option<Payload>,
}

impl RecordEnvelope {
    /// Decode any known record shape. `null` decodes to an empty envelope.
    pub fn decode(value: Value) -> Result<Self, StorageError> {
        let mut obj = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(obj) => obj,
            other => return Err(malformed("record", format!("expected object, got {}", type_name(&other)))),
        };

        let id = take_id(&mut obj);

        let body = match (obj.remove("payload"), obj.remove("data")) {
            (Some(p), _) if !p.is_null() => Some(p),
            (_, Some(d)) if !d.is_null() => Some(d),
            _ if V0_PAYLOAD_KEYS.iter().any(|k| obj.contains_key(*k)) => {
                debug!("Decoding legacy top-level payload");
                Some(Value::Object(obj))
            }
            _ => None,
        };

        let payload = body
            .map(serde_json::from_value::<Payload>)
            .transpose()
            .map_err(|e| malformed("record.payload", e.to_string()))?;

        Ok(Self { id, payload })
    }
}

impl From<RecordEnvelope> for SavedRecord {
    fn from(envelope: RecordEnvelope) -> Self {
        SavedRecord {
            id: envelope.id,
            payload: envelope.payload,
        }
    }
}

/// Id from a `GET /blend/latest` body (`{ _id }`, `{ id }` or `null`).
pub fn decode_latest_id(value: Value) -> Option<String> {
    match value {
        Value::Object(mut obj) => take_id(&mut obj),
        _ => None,
    }
}

/// Parse `{ "1": id | null, ... }`, or the same map wrapped as `{ map }`.
pub fn decode_unit_map(value: Value) -> Result<UnitMap, StorageError> {
    let value = match value {
        Value::Object(mut obj) if obj.contains_key("map") => obj.remove("map").unwrap_or(Value::Null),
        other => other,
    };
    if value.is_null() {
        return Ok(UnitMap::default());
    }

    let entries: BTreeMap<String, Value> =
        serde_json::from_value(value).map_err(|e| malformed("units", e.to_string()))?;

    Ok(entries
        .into_iter()
        .filter_map(|(key, id)| {
            let unit = key.parse::<Unit>().ok()?;
            id_string(id).map(|id| (unit, id))
        })
        .collect())
}

/// Body of `PUT /units/:unit`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub blend_id: String,
}

fn take_id(obj: &mut Map<String, Value>) -> Option<String> {
    obj.remove("id")
        .and_then(id_string)
        .or_else(|| obj.remove("_id").and_then(id_string))
}

/// Ids are strings; numeric ids are accepted and stringified.
fn id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn malformed(key: &str, reason: String) -> StorageError {
    StorageError::Malformed { key: key.to_string(), reason }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "rows": [{ "coal": "C1", "percentages": [50, null, null, null, null, null, null, null], "gcv": 3800, "cost": 4.2 }],
            "generation": 660,
            "createdAt": "2025-03-01T10:00:00Z"
        })
    }

    #[test]
    fn test_all_envelope_shapes_decode_to_same_payload() {
        let current = RecordEnvelope::decode(json!({ "id": "r1", "payload": sample() })).unwrap();
        let document = RecordEnvelope::decode(json!({ "_id": "r1", "data": sample() })).unwrap();

        let mut bare = sample();
        bare["_id"] = json!("r1");
        let legacy = RecordEnvelope::decode(bare).unwrap();

        for env in [&current, &document, &legacy] {
            assert_eq!(env.id.as_deref(), Some("r1"));
        }
        let p = current.payload.unwrap();
        assert_eq!(p.generation, Some(660.0));
        assert!(p.structurally_eq(&document.payload.unwrap()));
        assert!(p.structurally_eq(&legacy.payload.unwrap()));
    }

    #[test]
    fn test_envelope_without_payload() {
        let env = RecordEnvelope::decode(json!({ "_id": "r9" })).unwrap();
        assert_eq!(env.id.as_deref(), Some("r9"));
        assert!(env.payload.is_none());

        let env = RecordEnvelope::decode(json!({ "id": "r9", "payload": null })).unwrap();
        assert!(env.payload.is_none());

        let env = RecordEnvelope::decode(Value::Null).unwrap();
        assert!(env.id.is_none());
    }

    #[test]
    fn test_envelope_rejects_non_object() {
        let err = RecordEnvelope::decode(json!([1, 2])).unwrap_err();
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn test_unit_map_skips_nulls_and_unknown_keys() {
        let map = decode_unit_map(json!({ "1": "a", "2": null, "3": 42, "7": "x" })).unwrap();
        assert_eq!(map.get(Unit::One), Some("a"));
        assert_eq!(map.get(Unit::Two), None);
        assert_eq!(map.get(Unit::Three), Some("42"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_unit_map_wrapped_in_map_field() {
        let map = decode_unit_map(json!({ "map": { "1": "a", "2": "b", "3": "c" } })).unwrap();
        assert!(map.is_complete());
    }

    #[test]
    fn test_latest_id() {
        assert_eq!(decode_latest_id(json!({ "_id": "x" })).as_deref(), Some("x"));
        assert_eq!(decode_latest_id(json!({ "id": "y" })).as_deref(), Some("y"));
        assert_eq!(decode_latest_id(Value::Null), None);
    }

    #[test]
    fn test_assign_body_shape() {
        let body = serde_json::to_value(AssignBody { blend_id: "abc123".into() }).unwrap();
        assert_eq!(body, json!({ "blendId": "abc123" }));
    }
}
