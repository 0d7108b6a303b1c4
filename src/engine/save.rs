// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use tracing::{info, warn};

use super::{BlendSyncEngine, SaveError, SaveOutcome};
use crate::payload::Payload;
use crate::unit::Unit;

impl BlendSyncEngine {
    /// Save the form to the remote store under the unit it shows.
    ///
    /// Updates the unit's record when it has one, otherwise creates a record
    /// and assigns it to the unit. On success every tier holds the saved
    /// payload (or the server's echo of it). On failure the user is alerted
    /// and the error returned.
    #[tracing::instrument(skip(self), fields(unit, created))]
    pub async fn save_to_server(&self) -> Result<SaveOutcome, SaveError> {
        let Some((unit, payload)) = self.snapshot_form() else {
            let err = SaveError::RenderPending;
            warn!(error = %err, "Save refused");
            crate::metrics::record_save("error");
            self.form.alert(&format!("Failed to save blend: {}", err));
            return Err(err);
        };
        tracing::Span::current().record("unit", unit.number());

        match self.push(unit, payload).await {
            Ok(outcome) => {
                tracing::Span::current().record("created", outcome.created);
                crate::metrics::record_save(if outcome.created { "created" } else { "updated" });
                info!(unit = %unit, record_id = %outcome.record_id, created = outcome.created, "Saved blend");
                Ok(outcome)
            }
            Err(e) => {
                warn!(unit = %unit, error = %e, "Save failed");
                crate::metrics::record_save("error");
                self.form.alert(&format!("Failed to save blend for unit {}: {}", unit, e));
                Err(e)
            }
        }
    }

    async fn push(&self, unit: Unit, payload: Payload) -> Result<SaveOutcome, SaveError> {
        let existing = self.resolver.resolve_unit_id(unit).await;

        let (saved, created) = match &existing {
            Some(id) => (self.remote.update_record(id, &payload).await?, false),
            None => (self.remote.create_record(&payload).await?, true),
        };

        let record_id = saved.id.or(existing).ok_or(SaveError::MissingRecordId)?;

        if created {
            self.resolver.record_created(unit, &record_id).await;
            if let Err(e) = self.remote.assign_unit(unit, &record_id).await {
                warn!(unit = %unit, record_id = %record_id, error = %e, "Unit assignment failed, kept locally");
                crate::metrics::record_remote_call("assign_unit", e.kind());
            }
        }

        self.memory.set(unit, saved.payload.unwrap_or(payload));
        if let Err(e) = self.persist.flush_now().await {
            warn!(error = %e, "Durable flush after save failed");
        }

        Ok(SaveOutcome { unit, record_id, created })
    }
}
