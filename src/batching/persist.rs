// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deferred durable flush of the payload cache.
//!
//! Callers never write `blend.unitPayloads` themselves. They send a
//! request to a single writer task:
//!
//! ```text
//!   schedule() ──┐
//!   schedule() ──┼──► [bounded mpsc] ──► writer task ──► DurableTier::write_payloads
//!   flush_now() ─┘                        (window timer)      (full memory snapshot)
//! ```
//!
//! The first `schedule()` opens a window of `persist_batch_ms`; every
//! further request inside it is absorbed. When the window closes the whole
//! memory tier is serialized and written once. Windows close in order, so
//! durable writes are FIFO. `flush_now()` closes any open window at once
//! and waits for the write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::storage::traits::StorageError;
use crate::tiers::{DurableTier, MemoryTier};

const QUEUE_CAPACITY: usize = 64;

/// Why the payload cache was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Batching window closed
    Window,
    /// Explicit `flush_now()`
    Immediate,
    /// Scheduler dropped with a window still open
    Shutdown,
}

impl FlushReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FlushReason::Window => "window",
            FlushReason::Immediate => "immediate",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

enum PersistCommand {
    Schedule,
    FlushNow(oneshot::Sender<Result<usize, StorageError>>),
}

#[derive(Debug, Default)]
struct PersistStats {
    requests: AtomicU64,
    flushes: AtomicU64,
}

/// Handle to the durable writer task.
pub struct PersistScheduler {
    tx: mpsc::Sender<PersistCommand>,
    stats: Arc<PersistStats>,
}

impl PersistScheduler {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn(memory: Arc<MemoryTier>, durable: Arc<DurableTier>, window: Duration) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let stats = Arc::new(PersistStats::default());

        let writer = Writer {
            memory,
            durable,
            window,
            stats: stats.clone(),
        };
        tokio::spawn(writer.run(rx));

        Self { tx, stats }
    }

    /// Request a deferred flush. Never blocks.
    pub fn schedule(&self) {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(PersistCommand::Schedule) {
            Ok(()) => {}
            // A full queue already holds a pending request
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Persist queue full, request coalesced");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Persist writer stopped, request dropped");
            }
        }
    }

    /// Flush now and wait. Returns bytes written.
    pub async fn flush_now(&self) -> Result<usize, StorageError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PersistCommand::FlushNow(reply_tx))
            .await
            .map_err(|_| StorageError::Backend("persist writer stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| StorageError::Backend("persist writer dropped reply".to_string()))?
    }

    /// Number of `schedule()` calls so far.
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.stats.requests.load(Ordering::Relaxed)
    }

    /// Number of durable writes performed so far.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.stats.flushes.load(Ordering::Relaxed)
    }
}

struct Writer {
    memory: Arc<MemoryTier>,
    durable: Arc<DurableTier>,
    window: Duration,
    stats: Arc<PersistStats>,
}

impl Writer {
    async fn run(self, mut rx: mpsc::Receiver<PersistCommand>) {
        let mut deadline: Option<Instant> = None;
        let mut absorbed = 0usize;

        loop {
            let command = match deadline {
                Some(at) => tokio::select! {
                    command = rx.recv() => command,
                    _ = sleep_until(at) => {
                        if let Err(e) = self.flush(FlushReason::Window, absorbed).await {
                            warn!(error = %e, "Window flush failed");
                        }
                        deadline = None;
                        absorbed = 0;
                        continue;
                    }
                },
                None => rx.recv().await,
            };

            match command {
                Some(PersistCommand::Schedule) => {
                    absorbed += 1;
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + self.window);
                    }
                }
                Some(PersistCommand::FlushNow(reply)) => {
                    let result = self.flush(FlushReason::Immediate, absorbed).await;
                    deadline = None;
                    absorbed = 0;
                    let _ = reply.send(result);
                }
                None => {
                    if deadline.is_some() {
                        if let Err(e) = self.flush(FlushReason::Shutdown, absorbed).await {
                            warn!(error = %e, "Final flush failed");
                        }
                    }
                    debug!("Persist writer exiting");
                    break;
                }
            }
        }
    }

    async fn flush(&self, reason: FlushReason, absorbed: usize) -> Result<usize, StorageError> {
        let start = std::time::Instant::now();
        let snapshot = self.memory.snapshot();
        let units = snapshot.len();

        let result = self.durable.write_payloads(&snapshot).await;
        crate::metrics::record_flush_duration(start.elapsed());

        match &result {
            Ok(bytes) => {
                self.stats.flushes.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_flush(reason.as_str(), units, *bytes, absorbed.saturating_sub(1));
                info!(reason = reason.as_str(), units, bytes, absorbed, "Flushed payload cache");
            }
            Err(e) => {
                crate::metrics::record_error("durable", "flush", e.kind());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use crate::storage::keys;
    use crate::storage::memory::InMemoryKvStore;
    use crate::unit::Unit;

    struct Fixture {
        store: Arc<InMemoryKvStore>,
        memory: Arc<MemoryTier>,
        durable: Arc<DurableTier>,
        scheduler: PersistScheduler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryKvStore::new());
        let memory = Arc::new(MemoryTier::new());
        let durable = Arc::new(DurableTier::new(store.clone()));
        let scheduler = PersistScheduler::spawn(memory.clone(), durable.clone(), Duration::from_millis(300));
        Fixture { store, memory, durable, scheduler }
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedules_in_one_window_write_once() {
        let f = fixture();
        for unit in Unit::ALL {
            f.memory.set(unit, Payload::empty());
            f.scheduler.schedule();
        }
        f.scheduler.schedule();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.store.write_count(keys::UNIT_PAYLOADS), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(f.store.write_count(keys::UNIT_PAYLOADS), 1);
        assert_eq!(f.scheduler.requests(), 4);
        assert_eq!(f.durable.load_payloads().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_write_separately() {
        let f = fixture();
        f.memory.set(Unit::One, Payload::empty());
        f.scheduler.schedule();
        tokio::time::sleep(Duration::from_millis(400)).await;

        f.memory.set(Unit::Two, Payload::empty());
        f.scheduler.schedule();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(f.store.write_count(keys::UNIT_PAYLOADS), 2);
        assert_eq!(f.scheduler.flushes(), 2);
        // Second window wrote the later snapshot
        assert_eq!(f.durable.load_payloads().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_closes_open_window() {
        let f = fixture();
        f.memory.set(Unit::Three, Payload::empty());
        f.scheduler.schedule();

        let bytes = f.scheduler.flush_now().await.unwrap();
        assert!(bytes > 0);
        assert_eq!(f.store.write_count(keys::UNIT_PAYLOADS), 1);

        // The absorbed window does not fire a second write
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(f.store.write_count(keys::UNIT_PAYLOADS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_schedule_no_write() {
        let f = fixture();
        f.memory.set(Unit::One, Payload::empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.store.write_count(keys::UNIT_PAYLOADS), 0);
    }

    #[test]
    fn test_flush_reason_labels() {
        assert_eq!(FlushReason::Window.as_str(), "window");
        assert_eq!(FlushReason::Immediate.as_str(), "immediate");
        assert_eq!(FlushReason::Shutdown.as_str(), "shutdown");
    }
}
