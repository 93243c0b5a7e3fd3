//! Background refresh queue.
//!
//! Lock holders using the background strategy hand their job here and
//! return immediately. A single dispatcher task pulls jobs off a bounded
//! channel and runs them on a `JoinSet`, with a semaphore capping how many
//! fetches are in flight.

use std::sync::Arc;

use linkpeek_core::Error;
use tokio::sync::{Mutex, Notify, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use super::refresher::{RefreshJob, Refresher};

/// Handle to the refresh workers.
pub struct RefreshQueue {
    tx: mpsc::Sender<RefreshJob>,
    shutdown: Arc<Notify>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshQueue {
    /// Spawn the dispatcher. Must be called from within a Tokio runtime.
    pub fn start(refresher: Arc<Refresher>, capacity: usize, concurrency: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = Arc::new(Notify::new());
        let limit = Arc::new(Semaphore::new(concurrency.max(1)));

        let dispatcher = tokio::spawn(dispatch(rx, refresher, limit, shutdown.clone()));

        Self { tx, shutdown, dispatcher: Mutex::new(Some(dispatcher)) }
    }

    /// Enqueue a job without waiting.
    ///
    /// Fails with `QueueFull` when the queue is at capacity or shut down;
    /// the caller still owns the job's lock in that case.
    pub fn submit(&self, job: RefreshJob) -> Result<(), Error> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => Error::QueueFull(format!("refresh queue full, dropped {}", job.url)),
            mpsc::error::TrySendError::Closed(job) => {
                Error::QueueFull(format!("refresh queue closed, dropped {}", job.url))
            }
        })
    }

    /// Stop accepting jobs and wait for queued and running ones to finish.
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "refresh dispatcher terminated abnormally");
        }
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<RefreshJob>, refresher: Arc<Refresher>, limit: Arc<Semaphore>, shutdown: Arc<Notify>,
) {
    let mut running = JoinSet::new();

    loop {
        let job = tokio::select! {
            job = rx.recv() => job,
            _ = shutdown.notified() => {
                // Closing keeps already-buffered jobs readable.
                rx.close();
                rx.recv().await
            }
        };
        let Some(job) = job else { break };

        let Ok(permit) = limit.clone().acquire_owned().await else { break };
        let refresher = refresher.clone();
        running.spawn(async move {
            let _permit = permit;
            // Outcome is logged by the refresher; nobody awaits it.
            let _ = refresher.run(&job).await;
        });

        while let Some(done) = running.try_join_next() {
            log_join(done);
        }
    }

    while let Some(done) = running.join_next().await {
        log_join(done);
    }
    tracing::debug!("refresh dispatcher stopped");
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "refresh job panicked; its lock will lapse by TTL");
    }
}
