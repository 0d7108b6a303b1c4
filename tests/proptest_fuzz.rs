// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests (fuzzing) for payload handling.
//!
//! Uses proptest to generate random and malformed inputs and verify that
//! decoding never panics and the form ↔ payload mapping is stable.
//!
//! Run with: `cargo test --test proptest_fuzz`

use proptest::prelude::*;
use serde_json::Value;

use blend_sync::storage::wire::{decode_unit_map, RecordEnvelope};
use blend_sync::{format_duration, CoalSelection, FormState, Payload, Row, Unit, MILLS};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(
                    prop_oneof![
                        Just("id".to_string()),
                        Just("_id".to_string()),
                        Just("payload".to_string()),
                        Just("data".to_string()),
                        Just("rows".to_string()),
                        Just("map".to_string()),
                        "[1-4]".prop_map(String::from),
                        ".*".prop_map(String::from),
                    ],
                    inner,
                    0..10
                )
                .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

/// A coal id, or blank
fn coal_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "C[0-9]".prop_map(String::from)]
}

fn cell_strategy() -> impl Strategy<Value = Option<f64>> {
    prop::option::of((0u32..100_000).prop_map(|n| f64::from(n) / 100.0))
}

fn row_strategy() -> impl Strategy<Value = Row> {
    (
        coal_strategy(),
        prop::array::uniform8(coal_strategy()),
        prop::array::uniform8(cell_strategy()),
        cell_strategy(),
        cell_strategy(),
    )
        .prop_map(|(nominal, overrides, percentages, gcv, cost)| Row {
            coal: CoalSelection::from_mills(&nominal, &overrides),
            percentages,
            gcv,
            cost,
        })
}

fn payload_strategy() -> impl Strategy<Value = Payload> {
    (
        prop::collection::vec(row_strategy(), 0..7),
        prop::array::uniform8(cell_strategy()),
        cell_strategy(),
        cell_strategy(),
    )
        .prop_map(|(rows, flows, generation, bunker_capacity)| {
            let mut payload = Payload::empty();
            payload.rows = rows;
            payload.flows = flows;
            payload.generation = generation;
            payload.bunker_capacity = bunker_capacity;
            payload
        })
}

// =============================================================================
// Decoding Fuzz Tests
// =============================================================================

proptest! {
    /// Payload deserialization should never panic on arbitrary bytes
    #[test]
    fn fuzz_payload_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..4000)) {
        let result: Result<Payload, _> = serde_json::from_slice(&bytes);
        let _ = result;
    }

    /// Record envelopes decode or fail cleanly
    #[test]
    fn fuzz_record_envelope_from_arbitrary_json(json in arbitrary_json_strategy()) {
        let _ = RecordEnvelope::decode(json);
    }

    /// Unit maps decode or fail cleanly, and never hold an empty id
    #[test]
    fn fuzz_unit_map_from_arbitrary_json(json in arbitrary_json_strategy()) {
        if let Ok(map) = decode_unit_map(json) {
            prop_assert!(map.len() <= Unit::ALL.len());
            for (_, id) in map.iter() {
                prop_assert!(!id.is_empty());
            }
        }
    }
}

// =============================================================================
// Invariant Tests
// =============================================================================

proptest! {
    /// Clamping always lands in range and agrees with strict conversion
    #[test]
    fn prop_unit_clamp_in_range(n in any::<i64>()) {
        let unit = Unit::clamp(n);
        prop_assert!((1..=3).contains(&unit.number()));
        if let Some(strict) = Unit::from_number(n) {
            prop_assert_eq!(strict, unit);
        }
    }

    /// Per-mill iff some effective coal differs from the nominal coal
    #[test]
    fn prop_coal_selection_from_mills(
        nominal in coal_strategy(),
        overrides in prop::array::uniform8(coal_strategy()),
    ) {
        let selection = CoalSelection::from_mills(&nominal, &overrides);
        let effective: Vec<&str> = overrides
            .iter()
            .map(|o| if o.is_empty() { nominal.as_str() } else { o.as_str() })
            .collect();
        let differs = effective.iter().any(|c| *c != nominal);

        prop_assert_eq!(matches!(selection, CoalSelection::PerMill(_)), differs);
        for (mill, coal) in effective.iter().enumerate() {
            prop_assert_eq!(selection.coal_for_mill(mill), *coal);
        }
    }

    /// The fingerprint ignores createdAt
    #[test]
    fn prop_fingerprint_ignores_created_at(payload in payload_strategy(), secs in 1i64..10_000_000) {
        let mut later = payload.clone();
        later.created_at = later.created_at + chrono::Duration::seconds(secs);
        prop_assert_eq!(payload.fingerprint(), later.fingerprint());
    }

    /// Rendering a payload and capturing it again keeps every value
    #[test]
    fn prop_form_round_trip_preserves_values(payload in payload_strategy()) {
        let rows = payload.rows.len().max(1);
        let captured = FormState::from_payload(&payload, rows).to_payload();

        prop_assert_eq!(captured.generation, payload.generation);
        prop_assert_eq!(captured.flows, payload.flows);
        for (got, want) in captured.rows.iter().zip(payload.rows.iter()) {
            prop_assert_eq!(got.percentages, want.percentages);
            prop_assert_eq!(got.gcv, want.gcv);
            for mill in 0..MILLS {
                prop_assert_eq!(got.coal.coal_for_mill(mill), want.coal.coal_for_mill(mill));
            }
        }

        // A second pass changes nothing
        let again = FormState::from_payload(&captured, rows).to_payload();
        prop_assert!(captured.structurally_eq(&again));
    }

    /// Durations always render as HH:MM:SS and floor to whole seconds
    #[test]
    fn prop_format_duration_shape(secs in 0.0f64..1_000_000.0) {
        let text = format_duration(secs);
        let parts: Vec<u64> = text.split(':').map(|p| p.parse().unwrap()).collect();
        prop_assert_eq!(parts.len(), 3);
        prop_assert!(parts[1] < 60 && parts[2] < 60);
        prop_assert_eq!(parts[0] * 3600 + parts[1] * 60 + parts[2], secs.floor() as u64);
    }
}
