//! Backend sync task handler.
//!
//! Automatic syncs are coalesced: while throttled, each change replaces the
//! pending snapshot and the next tick pushes whatever is pending at that
//! moment. Failed pushes are not retried until the next change.

use std::sync::Arc;

use async_trait::async_trait;
use smarttable_core::{SyncTarget, SyncTransport, ViewState};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::worker::BackgroundRunnable;
use crate::error::SyncError;
use crate::metrics;

/// Work item for the sync worker.
#[derive(Debug)]
pub enum SyncTask {
    /// The view state changed. Carries the snapshot with interaction flags
    /// already reset.
    Changed(Arc<ViewState>),
    /// Push `snapshot` now, regardless of throttling, and report back.
    Manual {
        snapshot: Arc<ViewState>,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
}

/// Pushes snapshots through a [`SyncTransport`].
pub struct SyncRunnable {
    transport: Arc<dyn SyncTransport>,
    target: SyncTarget,
    throttled: bool,
    pending: Option<Arc<ViewState>>,
}

impl SyncRunnable {
    /// With `throttled` set, changes wait for the next tick; otherwise each
    /// change is pushed as it arrives.
    #[must_use]
    pub fn new(transport: Arc<dyn SyncTransport>, target: SyncTarget, throttled: bool) -> Self {
        Self {
            transport,
            target,
            throttled,
            pending: None,
        }
    }

    async fn push(&self, snapshot: &ViewState) -> Result<(), SyncError> {
        match self.transport.sync(&self.target, snapshot).await {
            Ok(()) => {
                debug!(endpoint = %self.target.endpoint, "view state synced");
                Ok(())
            }
            Err(source) => {
                let err = SyncError::Transport {
                    endpoint: self.target.endpoint.clone(),
                    source,
                };
                metrics::increment(metrics::SYNC_FAILED);
                warn!(error = %err, "backend sync failed, will retry on next change");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl BackgroundRunnable for SyncRunnable {
    type Task = SyncTask;

    async fn run(&mut self, task: SyncTask) {
        match task {
            SyncTask::Changed(snapshot) if self.throttled => {
                self.pending = Some(snapshot);
            }
            SyncTask::Changed(snapshot) => {
                let _ = self.push(&snapshot).await;
            }
            SyncTask::Manual { snapshot, reply } => {
                // The manual snapshot is at least as new as anything pending.
                self.pending = None;
                let result = self.push(&snapshot).await;
                // The caller may have stopped waiting.
                let _ = reply.send(result);
            }
        }
    }

    async fn on_tick(&mut self) {
        if let Some(snapshot) = self.pending.take() {
            let _ = self.push(&snapshot).await;
        }
    }

    async fn shutdown(&mut self) {
        if self.pending.take().is_some() {
            debug!(endpoint = %self.target.endpoint, "dropping pending sync at teardown");
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use smarttable_core::ViewStatePatch;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        pushed: Mutex<Vec<ViewState>>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl SyncTransport for RecordingTransport {
        async fn sync(&self, _target: &SyncTarget, snapshot: &ViewState) -> anyhow::Result<()> {
            if *self.fail.lock() {
                anyhow::bail!("503 Service Unavailable");
            }
            self.pushed.lock().push(snapshot.clone());
            Ok(())
        }
    }

    fn target() -> SyncTarget {
        SyncTarget {
            endpoint: "https://api.example.com/table-state".to_string(),
            ..SyncTarget::default()
        }
    }

    fn snapshot(filter: &str) -> Arc<ViewState> {
        Arc::new(ViewState::default().merged(&ViewStatePatch::new().global_filter(filter)))
    }

    #[tokio::test]
    async fn throttled_changes_coalesce_until_tick() {
        let transport = Arc::new(RecordingTransport::default());
        let mut runnable = SyncRunnable::new(transport.clone(), target(), true);

        runnable.run(SyncTask::Changed(snapshot("a"))).await;
        runnable.run(SyncTask::Changed(snapshot("b"))).await;
        runnable.run(SyncTask::Changed(snapshot("c"))).await;
        assert!(transport.pushed.lock().is_empty());

        runnable.on_tick().await;
        runnable.on_tick().await;

        let pushed = transport.pushed.lock();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].global_filter, "c");
    }

    #[tokio::test]
    async fn unthrottled_changes_push_immediately() {
        let transport = Arc::new(RecordingTransport::default());
        let mut runnable = SyncRunnable::new(transport.clone(), target(), false);

        runnable.run(SyncTask::Changed(snapshot("a"))).await;
        runnable.run(SyncTask::Changed(snapshot("b"))).await;

        assert_eq!(transport.pushed.lock().len(), 2);
    }

    #[tokio::test]
    async fn manual_sync_reports_and_clears_pending() {
        let transport = Arc::new(RecordingTransport::default());
        let mut runnable = SyncRunnable::new(transport.clone(), target(), true);
        runnable.run(SyncTask::Changed(snapshot("a"))).await;

        let (reply, rx) = oneshot::channel();
        runnable
            .run(SyncTask::Manual {
                snapshot: snapshot("b"),
                reply,
            })
            .await;
        assert!(rx.await.unwrap().is_ok());

        runnable.on_tick().await;
        let pushed = transport.pushed.lock();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].global_filter, "b");
    }

    #[tokio::test]
    async fn failures_are_not_retried_until_next_change() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.fail.lock() = true;
        let mut runnable = SyncRunnable::new(transport.clone(), target(), true);

        runnable.run(SyncTask::Changed(snapshot("a"))).await;
        runnable.on_tick().await;
        *transport.fail.lock() = false;
        runnable.on_tick().await;
        assert!(transport.pushed.lock().is_empty());

        runnable.run(SyncTask::Changed(snapshot("b"))).await;
        runnable.on_tick().await;
        assert_eq!(transport.pushed.lock().len(), 1);
    }

    #[tokio::test]
    async fn manual_failure_is_returned_to_caller() {
        let transport = Arc::new(RecordingTransport::default());
        *transport.fail.lock() = true;
        let mut runnable = SyncRunnable::new(transport, target(), false);

        let (reply, rx) = oneshot::channel();
        runnable
            .run(SyncTask::Manual {
                snapshot: snapshot("a"),
                reply,
            })
            .await;

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn shutdown_drops_pending_snapshot() {
        let transport = Arc::new(RecordingTransport::default());
        let mut runnable = SyncRunnable::new(transport.clone(), target(), true);
        runnable.run(SyncTask::Changed(snapshot("a"))).await;

        runnable.shutdown().await;
        runnable.on_tick().await;
        assert!(transport.pushed.lock().is_empty());
    }
}
