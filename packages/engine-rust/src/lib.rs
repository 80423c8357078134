//! `SmartTable` engine: view-state store, fetch coordination, and the
//! persistence, sync, and export sinks of a data table.

pub mod config;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod metrics;
pub mod sinks;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::{BackendSyncConfig, PersistenceConfig, SyncEncoding, TableConfig};
pub use controller::{OutputSubscription, PatchOutcome, TableBuilder, TableController, TableId, TableOutput};
pub use error::{ConfigurationError, ExportError, FetchError, PersistenceError, SyncError};
pub use fetch::{FetchCoordinator, FetchOutcome, GeneratedSource, InMemorySource};
pub use lifecycle::InstanceState;
pub use store::{SnapshotObserver, ViewStateStore};
