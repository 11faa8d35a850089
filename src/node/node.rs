//! The long-running daemon object owning one host's replication duties.
//!
//! ## Key Responsibilities
//! - Runs one schedule task per enabled snapshot schedule
//! - Drains queued snapshot deletions through a single paced consumer
//! - Maintains node readiness state for the replication RPC surface
//! - Parks on the shutdown signal and tears everything down in order
//!
//! ## Example Usage
//! ```rust,no_run
//! use snap_engine::NodeBuilder;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
//! let node = NodeBuilder::new(None, shutdown_rx).build().ready().unwrap();
//! tokio::spawn(async move {
//!     node.run().await.expect("Engine node execution failed");
//! });
//! ```

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::watch;
use tokio::sync::Mutex;
use tracing::info;
use tracing::warn;

use crate::config::Settings;
use crate::DatasetEngine;
use crate::Result;
use crate::RetentionConsumer;
use crate::RetentionQueue;
use crate::ScheduleSupervisor;
use crate::SystemError;

pub struct EngineNode {
    pub(crate) engine: Arc<dyn DatasetEngine>,
    pub(crate) queue: RetentionQueue,

    // Taken exactly once by run(); the consumer owns the receiver half
    // of the deletion FIFO.
    pub(crate) retention_consumer: Mutex<Option<RetentionConsumer>>,
    pub(crate) ready: AtomicBool,
    pub(crate) shutdown_signal: watch::Receiver<()>,

    pub settings: Arc<Settings>,
}

impl fmt::Debug for EngineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineNode")
            .field("node_name", &self.settings.node.node_name)
            .field("ready", &self.ready)
            .finish()
    }
}

impl EngineNode {
    pub fn node_name(&self) -> &str {
        &self.settings.node.node_name
    }

    /// Confirms the dataset tooling answers at all before any schedule
    /// fires. A schedule whose dataset is missing only draws a warning;
    /// the dataset may appear later and firings fail soft anyway.
    async fn probe_datasets(&self) -> Result<()> {
        for schedule in self.settings.schedules.iter().filter(|s| s.enabled) {
            if !self.engine.dataset_exists(schedule.dataset.clone()).await? {
                warn!(
                    "schedule '{}': dataset '{}' does not exist yet",
                    schedule.name, schedule.dataset
                );
            }
        }
        Ok(())
    }

    pub async fn run(&self) -> Result<()> {
        // 1. Make sure the snapshot tooling is reachable
        self.probe_datasets().await?;

        // 2. Start the single retention consumer
        let consumer = self
            .retention_consumer
            .lock()
            .await
            .take()
            .ok_or_else(|| SystemError::NodeStartFailed("node is already running".to_string()))?;
        let consumer_handle = tokio::spawn(consumer.run(self.shutdown_signal.clone()));

        // 3. Start one runner per enabled schedule
        let supervisor = ScheduleSupervisor::start(
            &self.settings.schedules,
            self.engine.clone(),
            self.queue.clone(),
        );

        // 4. Node is ready to serve replication RPCs
        self.set_ready(true);
        info!("node '{}' is up", self.node_name());

        // 5. Park until shutdown, then unwind in reverse order
        let mut shutdown_signal = self.shutdown_signal.clone();
        let _ = shutdown_signal.changed().await;

        self.set_ready(false);
        supervisor.shutdown().await;
        let _ = consumer_handle.await;
        info!("node '{}' stopped", self.node_name());

        Ok(())
    }

    pub fn set_ready(&self, is_ready: bool) {
        self.ready.store(is_ready, Ordering::SeqCst);
    }

    pub fn server_is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
