//! Diagnostic sink for debug mode.

use tracing::debug;

use crate::store::{SnapshotObserver, Transition};

/// Tracing target of transition records.
pub const DEBUG_TARGET: &str = "smarttable::debug";

/// Emits one `debug` event per transition on [`DEBUG_TARGET`].
///
/// Records go to the tracing subscriber only, never to persistence or sync.
#[derive(Debug)]
pub struct DebugSink {
    table_id: String,
}

impl DebugSink {
    #[must_use]
    pub fn new(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
        }
    }
}

impl SnapshotObserver for DebugSink {
    fn on_commit(&self, transition: &Transition<'_>) {
        debug!(
            target: DEBUG_TARGET,
            table_id = %self.table_id,
            previous = ?transition.previous,
            patch = ?transition.patch,
            next = ?transition.next,
            "view state transition"
        );
    }

    fn on_teardown(&self) {
        debug!(target: DEBUG_TARGET, table_id = %self.table_id, "table torn down");
    }
}
