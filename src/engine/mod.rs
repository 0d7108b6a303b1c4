// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Blend sync engine: the context object tying the tiers, the resolver and
//! the form together.
//!
//! The engine is shared as `Arc<BlendSyncEngine>` so background tasks can
//! hold it. The active unit lives in a `watch` channel whose sender only
//! [`BlendSyncEngine::select_unit`] writes.
//!
//! The active unit changes before the form is repainted, so the engine also
//! tracks the unit the form actually shows. Form writes and captures hold
//! that lock; captures go to the shown unit and are skipped while a render
//! is pending. Each render takes a ticket, and a render whose ticket is no
//! longer the newest (or whose unit is no longer active) leaves the form
//! alone.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()──► Starting ──► Running ──shutdown()──► ShuttingDown
//! ```

mod autosave;
mod lifecycle;
mod save;
mod switch;
pub mod types;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::batching::{Debouncer, PersistScheduler};
use crate::config::BlendSyncConfig;
use crate::form::FormSurface;
use crate::mapping::UnitMapResolver;
use crate::storage::http::HttpRemoteStore;
use crate::storage::memory::InMemoryKvStore;
use crate::storage::sqlite::SqliteKvStore;
use crate::storage::traits::{KvStore, RemoteStore, StorageError};
use crate::tiers::{DurableTier, MemoryTier};
use crate::unit::Unit;

pub use types::{EngineState, ReconcileOutcome, RenderSource, SaveError, SaveOutcome, SwitchOutcome};

pub struct BlendSyncEngine {
    config: BlendSyncConfig,
    form: Arc<dyn FormSurface>,
    remote: Arc<dyn RemoteStore>,
    memory: Arc<MemoryTier>,
    durable: Arc<DurableTier>,
    resolver: UnitMapResolver,
    persist: PersistScheduler,
    active: watch::Sender<Unit>,
    state: watch::Sender<EngineState>,
    autosave: OnceLock<Debouncer>,
    /// Unit the form shows; `None` while a render is pending
    view: Mutex<Option<Unit>>,
    render_seq: AtomicU64,
}

impl BlendSyncEngine {
    /// Build an engine over explicit stores. Must be called inside a tokio
    /// runtime (the persist writer is spawned here).
    pub fn new(
        config: BlendSyncConfig,
        form: Arc<dyn FormSurface>,
        remote: Arc<dyn RemoteStore>,
        kv: Arc<dyn KvStore>,
    ) -> Arc<Self> {
        let memory = Arc::new(MemoryTier::new());
        let durable = Arc::new(DurableTier::new(kv));
        let resolver = UnitMapResolver::new(remote.clone(), durable.clone());
        let persist = PersistScheduler::spawn(memory.clone(), durable.clone(), config.persist_window());
        let (active, _) = watch::channel(Unit::default());
        let (state, _) = watch::channel(EngineState::Created);

        Arc::new(Self {
            config,
            form,
            remote,
            memory,
            durable,
            resolver,
            persist,
            active,
            state,
            autosave: OnceLock::new(),
            view: Mutex::new(Some(Unit::default())),
            render_seq: AtomicU64::new(0),
        })
    }

    /// Build an engine talking HTTP to `base_url`, with SQLite at
    /// `durable_url` when set (in-memory durable tier otherwise).
    pub async fn connect(config: BlendSyncConfig, form: Arc<dyn FormSurface>) -> Result<Arc<Self>, StorageError> {
        let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::new(&config)?);
        let kv: Arc<dyn KvStore> = match &config.durable_url {
            Some(url) => Arc::new(SqliteKvStore::new(url).await?),
            None => Arc::new(InMemoryKvStore::new()),
        };
        Ok(Self::new(config, form, remote, kv))
    }

    #[must_use]
    pub fn config(&self) -> &BlendSyncConfig {
        &self.config
    }

    /// Currently active unit.
    #[must_use]
    pub fn active_unit(&self) -> Unit {
        *self.active.borrow()
    }

    /// Watch active-unit changes.
    #[must_use]
    pub fn active_receiver(&self) -> watch::Receiver<Unit> {
        self.active.subscribe()
    }

    /// Unit whose data the form currently shows, or `None` mid-switch.
    #[must_use]
    pub fn shown_unit(&self) -> Option<Unit> {
        *self.view.lock()
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    #[must_use]
    pub fn durable(&self) -> &DurableTier {
        &self.durable
    }

    #[must_use]
    pub fn resolver(&self) -> &UnitMapResolver {
        &self.resolver
    }

    #[must_use]
    pub fn persist(&self) -> &PersistScheduler {
        &self.persist
    }

    fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
        crate::metrics::set_engine_state(&state.to_string());
    }
}
