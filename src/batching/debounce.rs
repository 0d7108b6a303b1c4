// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, trace};

/// Trailing-edge debouncer backed by one worker task.
///
/// Each `trigger()` restarts the quiet period; the action runs once when
/// `delay` passes with no further trigger. Dropping the handle runs a
/// pending action and stops the worker.
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
    fired: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn spawn<F, Fut>(delay: Duration, mut action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let fired = Arc::new(AtomicU64::new(0));
        let counter = fired.clone();

        tokio::spawn(async move {
            // Wait for the first trigger of a burst
            while rx.recv().await.is_some() {
                let mut closed = false;
                loop {
                    tokio::select! {
                        msg = rx.recv() => match msg {
                            Some(()) => trace!("Debounce timer reset"),
                            None => {
                                closed = true;
                                break;
                            }
                        },
                        _ = sleep(delay) => break,
                    }
                }

                counter.fetch_add(1, Ordering::Relaxed);
                action().await;
                if closed {
                    break;
                }
            }
            debug!("Debounce worker exiting");
        });

        Self { tx, fired }
    }

    /// Restart the quiet period.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Times the action has run.
    #[must_use]
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}
