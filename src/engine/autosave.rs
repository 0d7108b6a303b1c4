// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use tracing::{debug, trace};

use super::BlendSyncEngine;
use crate::batching::Debouncer;
use crate::form::FormState;
use crate::payload::Payload;
use crate::unit::Unit;

impl BlendSyncEngine {
    /// Start the autosave worker. Only the first call per engine attaches;
    /// it returns `true`, later calls return `false`.
    pub fn attach_autosave(self: &Arc<Self>) -> bool {
        let mut attached = false;
        self.autosave.get_or_init(|| {
            attached = true;
            let engine = Arc::downgrade(self);
            Debouncer::spawn(self.config.debounce_delay(), move || {
                let engine = engine.clone();
                async move {
                    if let Some(engine) = engine.upgrade() {
                        engine.capture_active();
                    }
                }
            })
        });
        if attached {
            debug!(delay_ms = self.config.autosave_debounce_ms, "Autosave attached");
        }
        attached
    }

    /// Report a field edit. Captures after the debounce quiet period.
    pub fn notify_edit(&self) {
        match self.autosave.get() {
            Some(debouncer) => debouncer.trigger(),
            None => trace!("Edit ignored, autosave not attached"),
        }
    }

    /// Number of debounced captures so far.
    #[must_use]
    pub fn autosave_captures(&self) -> u64 {
        self.autosave.get().map_or(0, Debouncer::fired)
    }

    /// Snapshot the form into the memory tier for the unit it shows and
    /// schedule a durable flush.
    ///
    /// Returns `false` when nothing was captured: a switch is still
    /// rendering, the snapshot matches the cached payload, or the form is
    /// blank and the unit has nothing cached.
    pub fn capture_active(&self) -> bool {
        let Some((unit, payload)) = self.snapshot_form() else {
            trace!("Capture skipped, render pending");
            return false;
        };

        match self.memory.get(unit) {
            Some(cached) if cached.structurally_eq(&payload) => return false,
            None if payload.is_blank() => return false,
            _ => {}
        }

        self.memory.set(unit, payload);
        self.persist.schedule();
        crate::metrics::record_operation("memory", "capture", "success");
        trace!(unit = %unit, "Captured form");
        true
    }

    /// Reset every field to the cleared form and rerun display hooks.
    pub fn clear_form_for_unit_ui(&self) {
        let mut view = self.view.lock();
        self.write_cleared();
        *view = Some(self.active_unit());
    }

    /// The shown unit with the form's current contents, read under the
    /// view lock. `None` while a render is pending.
    pub(super) fn snapshot_form(&self) -> Option<(Unit, Payload)> {
        let view = self.view.lock();
        let unit = (*view)?;
        Some((unit, self.form.read_state().to_payload()))
    }

    pub(super) fn write_cleared(&self) {
        self.form.write_state(FormState::empty(self.config.max_rows));
        self.form.recompute();
    }
}
