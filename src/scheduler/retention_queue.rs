use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::config::RetentionConfig;
use crate::errors::RetentionError;
use crate::metrics::FAILED_DESTROYS;
use crate::metrics::RETENTION_QUEUE_DEPTH_METRIC;
use crate::metrics::SNAPSHOTS_DESTROYED_METRIC;
use crate::DatasetEngine;
use crate::DestroyOutcome;
use crate::Error;
use crate::Result;

/// One snapshot deletion owed to a retention policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionTask {
    pub dataset: String,
    pub snapshot: String,
    pub recursive: bool,
}

impl DeletionTask {
    fn key(&self) -> (String, String) {
        (self.dataset.clone(), self.snapshot.clone())
    }
}

/// Producer handle of the deletion FIFO.
///
/// Enqueueing is an atomic check-and-insert: a `(dataset, snapshot)`
/// pair that is already pending (queued or mid-destroy) is dropped, so
/// overlapping pruning passes can never double-book a deletion. The
/// pair is released only when the consumer finishes the task.
#[derive(Clone)]
pub struct RetentionQueue {
    pending: Arc<DashSet<(String, String)>>,
    tx: mpsc::Sender<DeletionTask>,
}

impl RetentionQueue {
    /// Builds the queue and the receiver half that feeds a
    /// [`RetentionConsumer`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DeletionTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Self {
            pending: Arc::new(DashSet::new()),
            tx,
        };
        (queue, rx)
    }

    /// Queues one deletion. Returns `Ok(false)` when the same pair is
    /// already pending.
    pub async fn enqueue(&self, task: DeletionTask) -> Result<bool> {
        let key = task.key();
        if !self.pending.insert(key.clone()) {
            debug!(
                "deletion of {}@{} already pending, dropping duplicate",
                task.dataset, task.snapshot
            );
            return Ok(false);
        }
        self.publish_depth();

        if self.tx.send(task).await.is_err() {
            self.pending.remove(&key);
            self.publish_depth();
            return Err(RetentionError::QueueClosed.into());
        }
        Ok(true)
    }

    /// Number of pairs still owned by the queue, including the one the
    /// consumer is working on.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn release(&self, task: &DeletionTask) {
        self.pending.remove(&task.key());
        self.publish_depth();
    }

    fn publish_depth(&self) {
        RETENTION_QUEUE_DEPTH_METRIC
            .with_label_values(&["pending"])
            .set(self.pending.len() as f64);
    }
}

/// Single consumer draining [`DeletionTask`]s strictly in enqueue
/// order, one at a time, with a pause between tasks to bound load on
/// the engine.
pub struct RetentionConsumer {
    engine: Arc<dyn DatasetEngine>,
    queue: RetentionQueue,
    rx: mpsc::Receiver<DeletionTask>,
    config: RetentionConfig,
}

impl RetentionConsumer {
    pub fn new(
        engine: Arc<dyn DatasetEngine>,
        queue: RetentionQueue,
        rx: mpsc::Receiver<DeletionTask>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            engine,
            queue,
            rx,
            config,
        }
    }

    /// Drains the queue until shutdown flips or every producer is gone.
    pub async fn run(mut self, mut shutdown_signal: watch::Receiver<()>) {
        info!("retention consumer started");
        loop {
            let task = tokio::select! {
                task = self.rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
                _ = shutdown_signal.changed() => break,
            };

            self.process(task).await;

            tokio::select! {
                () = sleep(self.config.drain_delay()) => {}
                _ = shutdown_signal.changed() => break,
            }
        }
        info!("retention consumer stopped");
    }

    /// Destroys one snapshot under the retry policy. An already-absent
    /// snapshot counts as success; exhausted retries drop the task.
    async fn process(&self, task: DeletionTask) {
        let engine = self.engine.clone();
        let dataset = task.dataset.clone();
        let snapshot = task.snapshot.clone();
        let recursive = task.recursive;
        let destroy = move || {
            let engine = engine.clone();
            let dataset = dataset.clone();
            let snapshot = snapshot.clone();
            async move { engine.destroy_snapshot(dataset, snapshot, recursive).await }
        };

        let outcome =
            task_with_timeout_and_exponential_backoff("snapshot destroy", destroy, &self.config.retry)
                .await;

        match outcome {
            Ok(DestroyOutcome::Destroyed) => {
                info!("pruned {}@{}", task.dataset, task.snapshot);
                SNAPSHOTS_DESTROYED_METRIC
                    .with_label_values(&[&task.dataset])
                    .inc();
            }
            Ok(DestroyOutcome::AlreadyAbsent) => {
                debug!("{}@{} was already gone", task.dataset, task.snapshot);
            }
            Err(e) => {
                FAILED_DESTROYS.with_label_values(&[&task.dataset]).inc();
                error!(
                    "{}",
                    Error::from(RetentionError::DestroyFailed {
                        dataset: task.dataset.clone(),
                        snapshot: task.snapshot.clone(),
                        attempts: self.config.retry.max_retries,
                        last_error: e.to_string(),
                    })
                );
            }
        }

        self.queue.release(&task);
    }
}
