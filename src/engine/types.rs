// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the blend sync engine.

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::storage::traits::StorageError;
use crate::unit::Unit;

/// Engine lifecycle state.
///
/// Use [`super::BlendSyncEngine::state()`] to check the current state or
/// [`super::BlendSyncEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet started
    Created,
    /// Restoring the active unit and unit mapping
    Starting,
    /// Running normally
    Running,
    /// Final flush in progress
    ShuttingDown,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// Tier that painted the form on a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderSource {
    Memory,
    Durable,
    /// Nothing cached; the form was cleared
    Empty,
    /// A newer switch took over before this one painted; the form was left alone
    Superseded,
}

impl RenderSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Durable => "durable",
            Self::Empty => "empty",
            Self::Superseded => "superseded",
        }
    }
}

/// How a background reconciliation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Unit has no record id
    Unmapped,
    /// Record exists but carries no payload
    NoRemotePayload,
    /// Remote payload matches the cache
    Unchanged,
    /// Cache replaced; `rendered` is false when the unit was no longer active
    Updated { rendered: bool },
    /// Remote fetch failed
    Failed,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unmapped => "unmapped",
            Self::NoRemotePayload => "empty",
            Self::Unchanged => "unchanged",
            Self::Updated { rendered: true } => "updated",
            Self::Updated { rendered: false } => "inactive",
            Self::Failed => "error",
        }
    }
}

/// Result of a unit switch.
///
/// The form has already been painted from cache. The handles belong to the
/// background reconcile and prefetch tasks; dropping them detaches the
/// tasks, awaiting them waits for their effects.
#[derive(Debug)]
pub struct SwitchOutcome {
    pub unit: Unit,
    pub source: RenderSource,
    pub reconcile: JoinHandle<ReconcileOutcome>,
    /// Resolves to the number of units seeded into the memory tier
    pub prefetch: JoinHandle<usize>,
}

/// Result of a successful explicit save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub unit: Unit,
    pub record_id: String,
    /// True when a new record was created (POST), false for an update (PUT)
    pub created: bool,
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Remote save failed: {0}")]
    Remote(#[from] StorageError),
    #[error("Server response carried no record id")]
    MissingRecordId,
    #[error("Unit switch still rendering, try again")]
    RenderPending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(EngineState::Created.to_string(), "Created");
        assert_eq!(EngineState::ShuttingDown.to_string(), "ShuttingDown");
    }

    #[test]
    fn test_reconcile_labels() {
        assert_eq!(ReconcileOutcome::Updated { rendered: true }.as_str(), "updated");
        assert_eq!(ReconcileOutcome::Updated { rendered: false }.as_str(), "inactive");
        assert_eq!(RenderSource::Durable.as_str(), "durable");
        assert_eq!(RenderSource::Superseded.as_str(), "superseded");
    }

    #[test]
    fn test_save_error_wraps_storage_error() {
        let err: SaveError = StorageError::Status { operation: "create_record", status: 500 }.into();
        assert!(err.to_string().contains("500"));
    }
}
