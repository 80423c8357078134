//! Task loop behind backend sync.
//!
//! One spawned loop per table drains an mpsc queue into a
//! [`BackgroundRunnable`] and, when throttled, calls its tick hook on a fixed
//! interval. Stopping the loop cancels the interval.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};

const CHANNEL_CAPACITY: usize = 256;

/// Task handler executed by [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);

    /// Called on each tick when the worker was started with an interval.
    async fn on_tick(&mut self) {}

    /// Called once when the worker stops.
    async fn shutdown(&mut self) {}
}

/// Owns the spawned loop of one [`BackgroundRunnable`].
///
/// Must be started from within a tokio runtime.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Starts the worker. With `tick_interval` of `None` (or zero) the worker
    /// never ticks.
    pub fn start(mut runnable: R, tick_interval: Option<Duration>) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(CHANNEL_CAPACITY);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            // First tick one full period after start, not immediately.
            let mut ticker = tick_interval.filter(|d| !d.is_zero()).map(|period| {
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break,
                        }
                    }
                    () = next_tick(ticker.as_mut()) => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Sender for the task queue, or `None` once stopped.
    ///
    /// Clones outlive the worker; sends fail after the loop exits.
    #[must_use]
    pub fn sender(&self) -> Option<mpsc::Sender<R::Task>> {
        self.tx.clone()
    }

    /// Stops the worker and waits for it to finish. Pending ticks are
    /// cancelled.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Counters {
        runs: AtomicU32,
        ticks: AtomicU32,
        shutdowns: AtomicU32,
    }

    struct CountingRunnable(Arc<Counters>);

    #[async_trait]
    impl BackgroundRunnable for CountingRunnable {
        type Task = String;

        async fn run(&mut self, _task: String) {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_tick(&mut self) {
            self.0.ticks.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&mut self) {
            self.0.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn runs_queued_tasks_and_shuts_down() {
        let counters = Arc::new(Counters::default());
        let mut worker = BackgroundWorker::start(CountingRunnable(counters.clone()), None);
        let tx = worker.sender().unwrap();

        for task in ["a", "b", "c"] {
            tx.send(task.to_string()).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.runs.load(Ordering::SeqCst), 3);

        worker.stop().await;
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_interval_but_not_at_startup() {
        let counters = Arc::new(Counters::default());
        let mut worker = BackgroundWorker::start(
            CountingRunnable(counters.clone()),
            Some(Duration::from_secs(30)),
        );

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 3);

        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_future_ticks() {
        let counters = Arc::new(Counters::default());
        let mut worker = BackgroundWorker::start(
            CountingRunnable(counters.clone()),
            Some(Duration::from_secs(1)),
        );
        worker.stop().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn senders_fail_after_stop() {
        let mut worker =
            BackgroundWorker::start(CountingRunnable(Arc::new(Counters::default())), None);
        let tx = worker.sender().unwrap();
        worker.stop().await;

        assert!(tx.send("late".to_string()).await.is_err());
        assert!(worker.sender().is_none());
    }
}
