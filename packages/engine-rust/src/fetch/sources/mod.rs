//! Built-in [`FetchSource`](smarttable_core::FetchSource) implementations.

pub mod generated;
pub mod in_memory;

pub use generated::GeneratedSource;
pub use in_memory::InMemorySource;
