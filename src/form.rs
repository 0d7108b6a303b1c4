// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The form boundary.
//!
//! The engine never touches UI widgets. It reads and writes a [`FormState`]
//! through an injected [`FormSurface`]; the embedding application maps
//! that state onto whatever it renders. [`InMemoryForm`] is the headless
//! implementation used by tests.
//!
//! Inputs are strings, as typed. Conversion to a [`Payload`] parses them;
//! unparseable or blank inputs become `None`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::payload::{format_duration, CoalSelection, Layer, Payload, Row, MILLS, SCHEMA_VERSION};

/// Hidden per-mill store of a row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MillCell {
    pub coal: String,
    pub gcv: String,
    pub cost: String,
    pub seq: String,
}

/// Inputs for one blend row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowInputs {
    /// Row-level coal selection
    pub coal: String,
    pub percentages: [String; MILLS],
    pub gcv: String,
    pub cost: String,
    /// Per-mill overrides; an empty coal means "use the row's coal"
    pub mills: [MillCell; MILLS],
}

/// Everything the form shows for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub rows: Vec<RowInputs>,
    pub flows: [String; MILLS],
    pub generation: String,
    pub bunker_capacity: String,
    pub bunker_capacities: [String; MILLS],
    /// Computed per-mill percentage totals
    pub totals: [String; MILLS],
    /// Computed per-bunker residence timers
    pub timers: [String; MILLS],
    pub bunkers: [Vec<Layer>; MILLS],
    pub coal_colors: BTreeMap<String, String>,
}

const ZERO_TIMER: &str = "00:00:00";

impl FormState {
    /// The cleared form: all inputs blank, timers at zero.
    #[must_use]
    pub fn empty(rows: usize) -> Self {
        Self {
            rows: vec![RowInputs::default(); rows],
            flows: Default::default(),
            generation: String::new(),
            bunker_capacity: String::new(),
            bunker_capacities: Default::default(),
            totals: Default::default(),
            timers: std::array::from_fn(|_| ZERO_TIMER.to_string()),
            bunkers: Default::default(),
            coal_colors: BTreeMap::new(),
        }
    }

    /// True when the form equals the cleared form for its row count.
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        *self == Self::empty(self.rows.len())
    }

    /// Snapshot the form into a payload stamped now.
    #[must_use]
    pub fn to_payload(&self) -> Payload {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let overrides: [String; MILLS] = std::array::from_fn(|m| row.mills[m].coal.trim().to_string());
                Row {
                    coal: CoalSelection::from_mills(row.coal.trim(), &overrides),
                    percentages: parse_all(&row.percentages),
                    gcv: parse_num(&row.gcv),
                    cost: parse_num(&row.cost),
                }
            })
            .collect();

        Payload {
            schema_version: SCHEMA_VERSION,
            rows,
            flows: parse_all(&self.flows),
            generation: parse_num(&self.generation),
            bunker_capacity: parse_num(&self.bunker_capacity),
            bunker_capacities: parse_all(&self.bunker_capacities),
            coal_color_map: self.coal_colors.clone(),
            client_bunkers: self.bunkers.clone(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Populate a form with `rows` rows from a payload.
    ///
    /// Extra payload rows are dropped; missing ones stay blank. Computed
    /// totals and timers are left for [`FormSurface::recompute`].
    #[must_use]
    pub fn from_payload(payload: &Payload, rows: usize) -> Self {
        let mut state = Self::empty(rows);

        for (inputs, row) in state.rows.iter_mut().zip(payload.rows.iter()) {
            inputs.coal = row_nominal(&row.coal).to_string();
            inputs.percentages = std::array::from_fn(|m| fmt_num(row.percentages[m]));
            inputs.gcv = fmt_num(row.gcv);
            inputs.cost = fmt_num(row.cost);

            if let CoalSelection::PerMill(_) = row.coal {
                // Only mills that differ from the row coal carry an override
                for (m, cell) in inputs.mills.iter_mut().enumerate() {
                    let coal = row.coal.coal_for_mill(m);
                    if coal != inputs.coal {
                        cell.coal = coal.to_string();
                    }
                }
            }
        }

        state.flows = std::array::from_fn(|m| fmt_num(payload.flows[m]));
        state.generation = fmt_num(payload.generation);
        state.bunker_capacity = fmt_num(payload.bunker_capacity);
        state.bunker_capacities = std::array::from_fn(|m| fmt_num(payload.bunker_capacities[m]));
        state.bunkers = payload.client_bunkers.clone();
        state.coal_colors = payload.coal_color_map.clone();
        state
    }

    /// Fill the computed cells from the inputs.
    pub fn recompute_totals(&mut self) {
        for m in 0..MILLS {
            let values: Vec<f64> = self.rows.iter().filter_map(|r| parse_num(&r.percentages[m])).collect();
            self.totals[m] = if values.is_empty() {
                String::new()
            } else {
                fmt_num(Some(values.iter().sum()))
            };

            let secs: f64 = self.bunkers[m].iter().map(|l| l.raw_duration_secs).sum();
            self.timers[m] = format_duration(secs);
        }
    }
}

/// Row-level coal shown for a selection.
///
/// A per-mill selection covering every mill shows its most common coal;
/// a partial one has no row-level coal.
fn row_nominal(selection: &CoalSelection) -> &str {
    match selection {
        CoalSelection::PerMill(map) if map.len() < MILLS => "",
        other => other.nominal(),
    }
}

fn parse_num(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_all(texts: &[String; MILLS]) -> [Option<f64>; MILLS] {
    std::array::from_fn(|m| parse_num(&texts[m]))
}

fn fmt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// The UI the engine drives.
pub trait FormSurface: Send + Sync {
    /// Current contents of every field.
    fn read_state(&self) -> FormState;

    /// Replace every field.
    fn write_state(&self, state: FormState);

    /// Re-run display hooks (totals, colors, timers) after a write.
    fn recompute(&self);

    /// Show a blocking message to the user.
    fn alert(&self, message: &str);
}

/// Headless form kept in memory.
pub struct InMemoryForm {
    state: Mutex<FormState>,
    writes: AtomicUsize,
    recomputes: AtomicUsize,
    alerts: Mutex<Vec<String>>,
}

impl InMemoryForm {
    #[must_use]
    pub fn new(rows: usize) -> Self {
        Self {
            state: Mutex::new(FormState::empty(rows)),
            writes: AtomicUsize::new(0),
            recomputes: AtomicUsize::new(0),
            alerts: Mutex::new(Vec::new()),
        }
    }

    /// Apply a user edit (not counted as an engine write).
    pub fn edit(&self, f: impl FnOnce(&mut FormState)) {
        f(&mut self.state.lock());
    }

    #[must_use]
    pub fn state(&self) -> FormState {
        self.state.lock().clone()
    }

    /// Engine `write_state` calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn recomputes(&self) -> usize {
        self.recomputes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().clone()
    }
}

impl FormSurface for InMemoryForm {
    fn read_state(&self) -> FormState {
        self.state()
    }

    fn write_state(&self, state: FormState) {
        *self.state.lock() = state;
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn recompute(&self) {
        self.state.lock().recompute_totals();
        self.recomputes.fetch_add(1, Ordering::SeqCst);
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().push(message.to_string());
    }
}
