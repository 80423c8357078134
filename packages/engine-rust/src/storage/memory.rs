//! In-memory [`StateStorage`] backed by [`DashMap`].

use dashmap::DashMap;
use smarttable_core::{StateStorage, ViewState};

/// Process-local snapshot storage.
///
/// Snapshots are kept in their serialized JSON form, so a load always
/// returns a fresh value decoded the same way a durable backend would.
#[derive(Debug, Default)]
pub struct MemoryStateStorage {
    entries: DashMap<String, String>,
}

impl MemoryStateStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored JSON under `key`.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStorage for MemoryStateStorage {
    fn load(&self, key: &str) -> anyhow::Result<Option<ViewState>> {
        match self.entries.get(key) {
            Some(entry) => Ok(Some(serde_json::from_str(entry.value())?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, snapshot: &ViewState) -> anyhow::Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.entries.insert(key.to_string(), json);
        Ok(())
    }
}
