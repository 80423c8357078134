//! Counter names recorded by the engine.
//!
//! Counters go through the `metrics` facade. Without an installed recorder
//! they are no-ops; the host application decides whether to export them.

/// Fetches handed to the source.
pub const FETCH_DISPATCHED: &str = "smarttable_fetch_dispatched_total";
/// Evaluations that found the fetch-relevant state unchanged.
pub const FETCH_SKIPPED: &str = "smarttable_fetch_skipped_total";
/// Responses discarded because a newer request was dispatched.
pub const FETCH_SUPERSEDED: &str = "smarttable_fetch_superseded_total";
/// Fetches whose source returned an error.
pub const FETCH_FAILED: &str = "smarttable_fetch_failed_total";
/// Backend sync attempts that failed.
pub const SYNC_FAILED: &str = "smarttable_sync_failed_total";
/// Local persistence writes that failed.
pub const PERSIST_FAILED: &str = "smarttable_persist_failed_total";

/// Registers descriptions for every engine counter with the installed recorder.
pub fn describe() {
    metrics::describe_counter!(FETCH_DISPATCHED, "Fetches dispatched to the data source");
    metrics::describe_counter!(FETCH_SKIPPED, "Evaluations skipped as duplicates");
    metrics::describe_counter!(FETCH_SUPERSEDED, "Stale fetch responses discarded");
    metrics::describe_counter!(FETCH_FAILED, "Fetches that failed at the source");
    metrics::describe_counter!(SYNC_FAILED, "Failed backend sync attempts");
    metrics::describe_counter!(PERSIST_FAILED, "Failed local persistence writes");
}

pub(crate) fn increment(name: &'static str) {
    metrics::counter!(name).increment(1);
}
