// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Blend Sync
//!
//! Per-unit payload cache and synchronization engine for a multi-unit coal
//! blend form.
//!
//! ## Architecture
//!
//! Three tiers, fastest first:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Form (FormSurface)                     │
//! │  • Edits → debounced capture_active()                       │
//! │  • switch_unit() paints from the fastest tier               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Memory Tier (DashMap)                    │
//! │  • One Payload per unit, synchronous                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (windowed flush via PersistScheduler)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Durable Tier (SQLite / memory)               │
//! │  • blend.unitPayloads, blend.activeUnit,                    │
//! │    blend.unitMap, blend.coalColors                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               (reconcile / prefetch / explicit save)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Remote Tier (HTTP backend)                 │
//! │  • Source of truth for payloads and the unit → record map   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blend_sync::{BlendSyncConfig, BlendSyncEngine, InMemoryForm};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BlendSyncConfig {
//!         base_url: "http://localhost:5000/api".into(),
//!         durable_url: Some("sqlite:blend_cache.db".into()),
//!         ..Default::default()
//!     };
//!     let form = Arc::new(InMemoryForm::new(config.max_rows));
//!
//!     let engine = BlendSyncEngine::connect(config, form.clone())
//!         .await
//!         .expect("Failed to open local cache");
//!     engine.start().await;
//!
//!     // Instant switch; the remote copy is reconciled in the background
//!     let outcome = engine.switch_unit(2).await;
//!     println!("Unit 2 rendered from {:?}", outcome.source);
//!
//!     form.edit(|s| s.generation = "660".into());
//!     engine.notify_edit();
//!
//!     if let Err(e) = engine.save_to_server().await {
//!         eprintln!("{}", e);
//!     }
//!
//!     engine.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: [`BlendSyncEngine`], unit switching, autosave, save, lifecycle
//! - [`mapping`]: unit → record id resolution
//! - [`tiers`]: memory and durable payload tiers
//! - [`storage`]: store traits and backends (SQLite, HTTP, in-memory)
//! - [`batching`]: persist scheduler and debouncer
//! - [`form`]: the form boundary
//! - [`resilience`]: retry with backoff

pub mod batching;
pub mod config;
pub mod engine;
pub mod form;
pub mod mapping;
pub mod metrics;
pub mod payload;
pub mod resilience;
pub mod storage;
pub mod tiers;
pub mod unit;

pub use batching::{Debouncer, FlushReason, PersistScheduler};
pub use config::BlendSyncConfig;
pub use engine::{
    BlendSyncEngine, EngineState, ReconcileOutcome, RenderSource, SaveError, SaveOutcome, SwitchOutcome,
};
pub use form::{FormState, FormSurface, InMemoryForm, MillCell, RowInputs};
pub use mapping::{UnitMap, UnitMapResolver};
pub use metrics::LatencyTimer;
pub use payload::{format_duration, CoalSelection, Layer, Payload, Row, MILLS};
pub use resilience::retry::RetryConfig;
pub use storage::http::HttpRemoteStore;
pub use storage::memory::{DelayedKvStore, InMemoryKvStore, InMemoryRemote, RemoteOp};
pub use storage::sqlite::SqliteKvStore;
pub use storage::traits::{KvStore, RemoteStore, SavedRecord, StorageError};
pub use storage::wire::RecordEnvelope;
pub use tiers::{DurableTier, MemoryTier};
pub use unit::{InvalidUnit, Unit};
