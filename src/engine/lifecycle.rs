// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle: start (page load) and shutdown (page unload).

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{BlendSyncEngine, EngineState, SwitchOutcome};
use crate::unit::Unit;

impl BlendSyncEngine {
    /// Start the engine.
    ///
    /// Startup flow:
    /// 1. Restore the last active unit from the durable tier (default 1)
    /// 2. Adopt a legacy single blend for unit 1 if unit 1 has no record
    /// 3. Make sure every unit has a record id (idempotent remote init)
    /// 4. Attach autosave
    /// 5. Render the active unit and kick off reconcile and prefetch
    ///
    /// Remote failures at any step are logged; the engine still starts.
    #[tracing::instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) -> SwitchOutcome {
        let started = Instant::now();
        self.set_state(EngineState::Starting);
        self.begin_render();

        let unit = self.durable.load_active_unit().await.unwrap_or_default();
        self.active.send_replace(unit);
        debug!(unit = %unit, "Restored active unit");

        self.adopt_legacy_record().await;

        let map = self.resolver.ensure_mapping().await;
        if !map.is_complete() {
            warn!(missing = ?map.missing(), "Unit mapping incomplete, continuing with local data");
        }

        self.attach_autosave();

        let source = self.load_unit_data(unit).await;
        let outcome = self.spawn_background(unit, source);

        self.set_state(EngineState::Running);
        info!(
            unit = %unit,
            source = source.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Blend sync engine running"
        );
        outcome
    }

    /// Capture the form and flush the payload cache.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.set_state(EngineState::ShuttingDown);
        self.capture_active();
        match self.persist.flush_now().await {
            Ok(bytes) => info!(bytes, "Final flush complete"),
            Err(e) => warn!(error = %e, "Final flush failed"),
        }
    }

    /// Deployments predating per-unit records kept one blend. If unit 1 has
    /// no record, claim the most recent one for it.
    async fn adopt_legacy_record(&self) {
        if self.resolver.resolve_unit_id(Unit::One).await.is_some() {
            return;
        }

        let latest = match self.remote.latest_record_id().await {
            Ok(Some(id)) => id,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Latest record lookup failed");
                crate::metrics::record_remote_call("latest_record", e.kind());
                return;
            }
        };

        info!(record_id = %latest, "Adopting latest record for unit 1");
        self.resolver.record_created(Unit::One, &latest).await;
        if let Err(e) = self.remote.assign_unit(Unit::One, &latest).await {
            warn!(error = %e, "Assigning adopted record failed");
            crate::metrics::record_remote_call("assign_unit", e.kind());
        }
    }
}
