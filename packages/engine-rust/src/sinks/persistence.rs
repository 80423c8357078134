//! Local persistence sink.

use std::sync::Arc;

use smarttable_core::StateStorage;
use tracing::{trace, warn};

use crate::error::PersistenceError;
use crate::metrics;
use crate::store::{SnapshotObserver, Transition};

/// Saves committed snapshots, minus interaction flags, under one key.
///
/// Interaction-only commits are not saved. Save failures are logged and
/// counted; the in-memory snapshot stays authoritative.
///
/// [`StateStorage::save`] runs synchronously inside the commit, so a slow
/// backend delays the patch that triggered it. File and redb backends do
/// blocking I/O here.
pub struct PersistenceSink {
    storage: Arc<dyn StateStorage>,
    key: String,
}

impl PersistenceSink {
    #[must_use]
    pub fn new(storage: Arc<dyn StateStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl SnapshotObserver for PersistenceSink {
    fn on_commit(&self, transition: &Transition<'_>) {
        if !transition.changes_persisted_state() {
            return;
        }
        let snapshot = transition.next.persisted();
        match self.storage.save(&self.key, &snapshot) {
            Ok(()) => trace!(key = %self.key, "view state saved"),
            Err(source) => {
                let err = PersistenceError::Save {
                    key: self.key.clone(),
                    source,
                };
                metrics::increment(metrics::PERSIST_FAILED);
                warn!(error = %err, "persistence failed, keeping in-memory state");
            }
        }
    }
}
