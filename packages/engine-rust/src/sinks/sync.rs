//! Automatic backend sync sink.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::store::{SnapshotObserver, Transition};
use crate::sync::SyncTask;

/// Hands each committed snapshot to the sync worker without waiting.
///
/// Interaction-only commits are not handed over, so hovering or dragging
/// never marks a sync as pending.
///
/// The worker decides whether to push now or at the next tick. Registered
/// only when automatic sync is enabled.
pub struct SyncSink {
    tx: Mutex<Option<mpsc::Sender<SyncTask>>>,
}

impl SyncSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<SyncTask>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }
}

impl SnapshotObserver for SyncSink {
    fn on_commit(&self, transition: &Transition<'_>) {
        if !transition.changes_persisted_state() {
            return;
        }
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return;
        };
        let snapshot = Arc::new(transition.next.persisted());
        if let Err(e) = tx.try_send(SyncTask::Changed(snapshot)) {
            warn!(error = %e, "sync worker unavailable, change not queued");
        }
    }

    fn on_teardown(&self) {
        self.tx.lock().take();
    }
}
