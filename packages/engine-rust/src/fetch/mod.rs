//! Fetch coordination and the built-in data sources.

pub mod coordinator;
pub mod sources;

pub use coordinator::{Evaluation, FetchCoordinator, FetchOutcome, FetchView, Ticket};
pub use sources::{GeneratedSource, InMemorySource};
