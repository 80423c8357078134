//! Backend state synchronization.
//!
//! A [`BackgroundWorker`] owns the [`SyncRunnable`] for one table instance.
//! Its tick is the sync timer; stopping the worker cancels it.

pub mod http;
pub mod runnable;
pub mod worker;

pub use http::HttpSyncTransport;
pub use runnable::{SyncRunnable, SyncTask};
pub use worker::{BackgroundRunnable, BackgroundWorker};
