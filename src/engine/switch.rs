// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Unit switching: instant render from cache, then background reconcile
//! and prefetch.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{BlendSyncEngine, ReconcileOutcome, RenderSource, SwitchOutcome};
use crate::form::FormState;
use crate::payload::Payload;
use crate::unit::Unit;

impl BlendSyncEngine {
    /// Switch the form to unit `target` (clamped into 1..=3).
    ///
    /// Returns once the form shows cached data (or is cleared). Remote
    /// reconciliation and prefetch continue in spawned tasks.
    #[tracing::instrument(skip(self), fields(unit, source))]
    pub async fn switch_unit(self: &Arc<Self>, target: i64) -> SwitchOutcome {
        let unit = Unit::clamp(target);
        tracing::Span::current().record("unit", unit.number());

        // Flush-current is best effort and never blocks the switch
        self.capture_active();
        self.begin_render();

        self.select_unit(unit).await;
        let source = self.load_unit_data(unit).await;
        tracing::Span::current().record("source", source.as_str());
        info!(unit = %unit, source = source.as_str(), "Unit switched");

        self.spawn_background(unit, source)
    }

    /// Reconcile and prefetch for a unit that was just rendered.
    pub(super) fn spawn_background(self: &Arc<Self>, unit: Unit, source: RenderSource) -> SwitchOutcome {
        let reconcile = {
            let engine = Arc::clone(self);
            tokio::spawn(async move { engine.reconcile(unit).await })
        };
        let prefetch = {
            let engine = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(engine.config.prefetch_delay()).await;
                engine.prefetch_others(unit).await
            })
        };

        SwitchOutcome { unit, source, reconcile, prefetch }
    }

    /// Mark `unit` active and persist the selection at once (not batched).
    pub async fn select_unit(&self, unit: Unit) {
        self.active.send_replace(unit);
        if let Err(e) = self.durable.store_active_unit(unit).await {
            warn!(unit = %unit, error = %e, "Failed to persist active unit");
            crate::metrics::record_error("durable", "store_active_unit", e.kind());
        }
    }

    /// Paint the form from the fastest tier holding `unit`.
    ///
    /// Returns [`RenderSource::Superseded`] when a newer render started, or
    /// `unit` stopped being active, while the durable tier was read. The
    /// memory tier is still seeded in that case.
    pub async fn load_unit_data(&self, unit: Unit) -> RenderSource {
        let ticket = self.render_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let (source, payload) = if let Some(payload) = self.memory.get(unit) {
            (RenderSource::Memory, Some(payload))
        } else if let Some(payload) = self.durable.load_payload(unit).await {
            // Anything cached while the read was in flight is newer
            self.memory.insert_if_absent(unit, payload.clone());
            (RenderSource::Durable, Some(self.memory.get(unit).unwrap_or(payload)))
        } else {
            (RenderSource::Empty, None)
        };

        let source = if self.paint(unit, ticket, payload.as_ref()) {
            if let Some(payload) = &payload {
                self.remember_colors(payload).await;
            }
            source
        } else {
            debug!(unit = %unit, skipped = source.as_str(), "Render superseded");
            RenderSource::Superseded
        };

        crate::metrics::record_render(source.as_str());
        crate::metrics::set_memory_entries(self.memory.len());
        source
    }

    /// Pull the remote payload for `unit` and replace the cache if it differs.
    ///
    /// The form is repainted only if `unit` is still active when the fetch
    /// lands.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, unit: Unit) -> ReconcileOutcome {
        let outcome = self.reconcile_inner(unit).await;
        crate::metrics::record_reconcile(outcome.as_str());
        debug!(unit = %unit, outcome = outcome.as_str(), "Reconcile finished");
        outcome
    }

    async fn reconcile_inner(&self, unit: Unit) -> ReconcileOutcome {
        let Some(id) = self.resolver.resolve_unit_id(unit).await else {
            return ReconcileOutcome::Unmapped;
        };

        let fetched = match self.remote.fetch_record(&id).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return ReconcileOutcome::NoRemotePayload,
            Err(e) => {
                warn!(unit = %unit, record_id = %id, error = %e, "Reconcile fetch failed");
                crate::metrics::record_remote_call("fetch_record", e.kind());
                return ReconcileOutcome::Failed;
            }
        };
        crate::metrics::record_remote_call("fetch_record", "success");

        if self.memory.fingerprint(unit).as_deref() == Some(fetched.fingerprint().as_str()) {
            return ReconcileOutcome::Unchanged;
        }

        self.memory.set(unit, fetched.clone());
        self.persist.schedule();

        // The active check and the write happen under the view lock
        let rendered = {
            let mut view = self.view.lock();
            let active = self.active_unit() == unit;
            if active {
                self.populate(&fetched);
                *view = Some(unit);
            }
            active
        };
        if rendered {
            self.remember_colors(&fetched).await;
        }
        ReconcileOutcome::Updated { rendered }
    }

    /// Warm the memory tier for the units other than `active`. Never
    /// touches the form. Returns the number of units seeded.
    #[tracing::instrument(skip(self))]
    pub async fn prefetch_others(&self, active: Unit) -> usize {
        let mut seeded = 0;
        for unit in active.others() {
            if self.memory.contains(unit) {
                crate::metrics::record_prefetch("cached");
                continue;
            }
            let Some(id) = self.resolver.resolve_unit_id(unit).await else {
                crate::metrics::record_prefetch("unmapped");
                continue;
            };
            match self.remote.fetch_record(&id).await {
                Ok(Some(payload)) => {
                    if self.memory.insert_if_absent(unit, payload) {
                        self.persist.schedule();
                        seeded += 1;
                        crate::metrics::record_prefetch("seeded");
                    } else {
                        crate::metrics::record_prefetch("cached");
                    }
                }
                Ok(None) => crate::metrics::record_prefetch("empty"),
                Err(e) => {
                    debug!(unit = %unit, error = %e, "Prefetch failed");
                    crate::metrics::record_prefetch("error");
                }
            }
        }
        seeded
    }

    /// Mark the form as mid-render: captures are skipped until a render lands.
    pub(super) fn begin_render(&self) {
        *self.view.lock() = None;
    }

    /// Paint `unit` (or the cleared form) if `ticket` is the newest render
    /// and `unit` is still active. Returns whether the form was written.
    fn paint(&self, unit: Unit, ticket: u64, payload: Option<&Payload>) -> bool {
        let mut view = self.view.lock();
        if self.render_seq.load(Ordering::SeqCst) != ticket || self.active_unit() != unit {
            return false;
        }
        match payload {
            Some(payload) => self.populate(payload),
            None => self.write_cleared(),
        }
        *view = Some(unit);
        true
    }

    /// Write a payload into the form and run the display hooks.
    fn populate(&self, payload: &Payload) {
        self.form.write_state(FormState::from_payload(payload, self.config.max_rows));
        self.form.recompute();
    }

    async fn remember_colors(&self, payload: &Payload) {
        if let Err(e) = self.durable.merge_coal_colors(&payload.coal_color_map).await {
            warn!(error = %e, "Failed to merge coal colors");
        }
    }
}
