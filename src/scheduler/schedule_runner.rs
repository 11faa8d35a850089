use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::ScheduleConfig;
use crate::constants::SNAPSHOT_TIMESTAMP_FORMAT;
use crate::metrics::SNAPSHOTS_CREATED_METRIC;
use crate::DatasetEngine;
use crate::DeletionTask;
use crate::RetentionQueue;
use crate::Result;
use crate::SnapshotSet;

/// One repeating snapshot schedule.
///
/// Firings are paced from the end of the previous firing, not from a
/// fixed phase, so a slow engine stretches the cadence instead of
/// stacking up overlapping work.
pub struct ScheduleRunner {
    schedule: ScheduleConfig,
    engine: Arc<dyn DatasetEngine>,
    queue: RetentionQueue,
}

impl ScheduleRunner {
    pub fn new(
        schedule: ScheduleConfig,
        engine: Arc<dyn DatasetEngine>,
        queue: RetentionQueue,
    ) -> Self {
        Self {
            schedule,
            engine,
            queue,
        }
    }

    /// Loops until the token is cancelled. A failed firing is logged
    /// and skipped; it never stops the schedule.
    pub async fn run(self, token: CancellationToken) {
        let interval = Duration::from_secs(self.schedule.every_secs);
        info!(
            "schedule '{}' started: {} every {}s, keep {}",
            self.schedule.name, self.schedule.dataset, self.schedule.every_secs, self.schedule.keep
        );

        loop {
            tokio::select! {
                () = sleep(interval) => {}
                () = token.cancelled() => break,
            }

            if let Err(e) = self.fire().await {
                warn!("schedule '{}' firing failed: {:?}", self.schedule.name, e);
            }
        }

        info!("schedule '{}' stopped", self.schedule.name);
    }

    /// One firing: snapshot now, then queue everything this schedule
    /// owns beyond `keep` for deletion.
    pub async fn fire(&self) -> Result<()> {
        let snapshot = self.snapshot_name(Utc::now());
        self.engine
            .create_snapshot(
                self.schedule.dataset.clone(),
                snapshot.clone(),
                self.schedule.recursive,
            )
            .await?;
        SNAPSHOTS_CREATED_METRIC
            .with_label_values(&[&self.schedule.name])
            .inc();
        info!(
            "schedule '{}' created {}@{}",
            self.schedule.name, self.schedule.dataset, snapshot
        );

        self.prune().await
    }

    /// Enqueues stale schedule-owned snapshots oldest first, so a
    /// backlogged retention queue drains the most obsolete ones first.
    async fn prune(&self) -> Result<()> {
        let set = SnapshotSet::load(self.engine.as_ref(), &self.schedule.dataset).await?;
        let prefix = self.schedule.snapshot_prefix();
        let owned = set.matching_prefix(&prefix);

        if owned.len() <= self.schedule.keep {
            return Ok(());
        }

        let stale = &owned[..owned.len() - self.schedule.keep];
        debug!(
            "schedule '{}': {} owned snapshots, pruning {}",
            self.schedule.name,
            owned.len(),
            stale.len()
        );
        for entry in stale {
            self.queue
                .enqueue(DeletionTask {
                    dataset: self.schedule.dataset.clone(),
                    snapshot: entry.name.clone(),
                    recursive: self.schedule.recursive,
                })
                .await?;
        }
        Ok(())
    }

    pub(crate) fn snapshot_name(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}{}",
            self.schedule.snapshot_prefix(),
            at.format(SNAPSHOT_TIMESTAMP_FORMAT)
        )
    }
}

/// Owns one runner task per enabled schedule.
///
/// Cancelling a single schedule leaves the others firing; shutdown
/// cancels the shared root token and joins every task.
pub struct ScheduleSupervisor {
    root: CancellationToken,
    tokens: Vec<(String, CancellationToken)>,
    handles: Vec<JoinHandle<()>>,
}

impl ScheduleSupervisor {
    pub fn start(
        schedules: &[ScheduleConfig],
        engine: Arc<dyn DatasetEngine>,
        queue: RetentionQueue,
    ) -> Self {
        let root = CancellationToken::new();
        let mut tokens = Vec::new();
        let mut handles = Vec::new();

        for schedule in schedules.iter().filter(|s| s.enabled) {
            let token = root.child_token();
            tokens.push((schedule.name.clone(), token.clone()));

            let runner = ScheduleRunner::new(schedule.clone(), engine.clone(), queue.clone());
            handles.push(tokio::spawn(runner.run(token)));
        }

        info!("schedule supervisor started {} schedule(s)", handles.len());
        Self {
            root,
            tokens,
            handles,
        }
    }

    /// Stops one schedule by name. Returns false when no such schedule
    /// is running.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tokens.iter().find(|(n, _)| n == name) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn running(&self) -> usize {
        self.handles.len()
    }

    pub async fn shutdown(self) {
        self.root.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("schedule supervisor stopped");
    }
}
