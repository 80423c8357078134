//! Instance lifecycle: teardown signal and in-flight fetch tracking.
//!
//! The instance state lives in an `ArcSwap` for lock-free reads on every
//! patch. In-flight fetches are counted in a watch channel so teardown can
//! wait for the count to reach zero instead of polling.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;

/// Lifecycle of one table instance.
///
/// State machine: Active -> TearingDown -> Destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Accepting patches and dispatching fetches.
    Active,
    /// Teardown started; no new fetches, late responses are dropped.
    TearingDown,
    /// All in-flight fetches finished.
    Destroyed,
}

/// Coordinates teardown across the fetch tasks and the sync worker.
///
/// Fetch tasks hold an [`InFlightGuard`] while their source runs and select
/// on [`shutdown_receiver`](Self::shutdown_receiver) so they can abandon the
/// await once teardown starts.
#[derive(Debug)]
pub struct LifecycleController {
    teardown: watch::Sender<bool>,
    in_flight: Arc<watch::Sender<usize>>,
    state: ArcSwap<InstanceState>,
}

impl LifecycleController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            teardown: watch::Sender::new(false),
            in_flight: Arc::new(watch::Sender::new(0)),
            state: ArcSwap::from_pointee(InstanceState::Active),
        }
    }

    /// Receiver that flips to `true` when teardown starts.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.teardown.subscribe()
    }

    /// Starts teardown. Idempotent.
    pub fn trigger_shutdown(&self) {
        self.state.rcu(|current| match **current {
            InstanceState::Active => Arc::new(InstanceState::TearingDown),
            other => Arc::new(other),
        });
        self.teardown.send_replace(true);
    }

    #[must_use]
    pub fn state(&self) -> InstanceState {
        **self.state.load()
    }

    /// Whether the instance still accepts work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == InstanceState::Active
    }

    /// Counts one in-flight fetch until the guard is dropped.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.send_modify(|count| *count += 1);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Number of fetch tasks still running.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Waits up to `timeout` for every in-flight fetch to finish.
    ///
    /// Moves to `Destroyed` and returns `true` once drained. On timeout the
    /// state stays `TearingDown` and this returns `false`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let mut count = self.in_flight.subscribe();
        // The sender lives in `self`, so `wait_for` cannot see a closed channel.
        let drained = tokio::time::timeout(timeout, count.wait_for(|n| *n == 0))
            .await
            .is_ok();
        if drained {
            self.state.store(Arc::new(InstanceState::Destroyed));
        }
        drained
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases one in-flight slot on drop, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.send_modify(|count| *count = count.saturating_sub(1));
    }
}
