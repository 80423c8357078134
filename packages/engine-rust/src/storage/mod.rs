//! [`StateStorage`](smarttable_core::StateStorage) backends.
//!
//! - [`MemoryStateStorage`]: process-local, backed by `DashMap`
//! - [`FileStateStorage`]: one JSON file per key in a directory
//! - [`RedbStateStorage`]: embedded `redb` database (feature `redb`)
//!
//! Every backend stores the JSON form of the snapshot, so interaction flags
//! never reach storage even if a caller forgets to strip them.

pub mod file;
pub mod memory;
#[cfg(feature = "redb")]
pub mod redb;

pub use file::FileStateStorage;
pub use memory::MemoryStateStorage;
#[cfg(feature = "redb")]
pub use self::redb::RedbStateStorage;
