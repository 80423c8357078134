//! Embedded [`StateStorage`] on a `redb` database.
//!
//! Snapshots are JSON-encoded into a single `&str -> &[u8]` table.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition, TableError};
use smarttable_core::{StateStorage, ViewState};

const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("view_state");

/// `redb`-backed snapshot storage. Cheap to clone.
#[derive(Clone)]
pub struct RedbStateStorage {
    db: Arc<Database>,
}

impl RedbStateStorage {
    /// Opens (or creates) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = Database::create(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Database that lives only as long as this value.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory backend cannot be initialized.
    pub fn in_memory() -> anyhow::Result<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl std::fmt::Debug for RedbStateStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStateStorage").finish_non_exhaustive()
    }
}

impl StateStorage for RedbStateStorage {
    fn load(&self, key: &str) -> anyhow::Result<Option<ViewState>> {
        let txn = self.db.begin_read()?;
        let table = match txn.open_table(SNAPSHOTS) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match table.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, snapshot: &ViewState) -> anyhow::Result<()> {
        let json = serde_json::to_vec(snapshot)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SNAPSHOTS)?;
            table.insert(key, json.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use smarttable_core::{Density, InteractionState, ViewStatePatch};

    use super::*;

    #[test]
    fn empty_database_loads_none() {
        let storage = RedbStateStorage::in_memory().unwrap();
        assert!(storage.load("smart-table-state").unwrap().is_none());
    }

    #[test]
    fn round_trip_strips_interaction_flags() {
        let storage = RedbStateStorage::in_memory().unwrap();
        let snapshot = ViewState::default().merged(
            &ViewStatePatch::new()
                .density(Density::Compact)
                .interaction(InteractionState {
                    show_skeletons: true,
                    ..InteractionState::default()
                }),
        );

        storage.save("k", &snapshot).unwrap();
        assert_eq!(storage.load("k").unwrap().unwrap(), snapshot.persisted());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        {
            let storage = RedbStateStorage::open(&path).unwrap();
            storage.save("k", &ViewState::with_page_size(30)).unwrap();
        }
        let reopened = RedbStateStorage::open(&path).unwrap();
        assert_eq!(reopened.load("k").unwrap().unwrap().pagination.page_size, 30);
    }
}
