use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::process::Command;
use tonic::async_trait;

use crate::errors::EngineError;
use crate::DatasetEngine;
use crate::DestroyOutcome;
use crate::Result;
use crate::SnapshotEntry;

/// In-memory [`DatasetEngine`]: datasets are name-to-snapshot-list
/// entries with a process-wide creation counter, and the transfer legs
/// are plain shell commands with a deterministic payload.
pub struct FakeEngine {
    datasets: DashMap<String, Vec<SnapshotEntry>>,
    next_index: AtomicU64,
    fail_creates: AtomicBool,
    fail_destroys: AtomicBool,
    create_calls: Mutex<Vec<(String, String)>>,
    created: Mutex<Vec<(String, String)>>,
    destroyed: Mutex<Vec<(String, String)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            datasets: DashMap::new(),
            next_index: AtomicU64::new(1),
            fail_creates: AtomicBool::new(false),
            fail_destroys: AtomicBool::new(false),
            create_calls: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
        }
    }

    /// Seeds a dataset whose snapshots were created in slice order.
    pub fn with_dataset(self, dataset: &str, snapshots: &[&str]) -> Self {
        let entries = snapshots
            .iter()
            .map(|name| SnapshotEntry {
                name: (*name).to_string(),
                created_index: self.next_index.fetch_add(1, Ordering::SeqCst),
            })
            .collect();
        self.datasets.insert(dataset.to_string(), entries);
        self
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_destroys(&self, fail: bool) {
        self.fail_destroys.store(fail, Ordering::SeqCst);
    }

    /// Every `create_snapshot` call, including rejected ones.
    pub fn create_calls(&self) -> Vec<(String, String)> {
        self.create_calls.lock().clone()
    }

    /// `(dataset, snapshot)` pairs in creation order.
    pub fn created(&self) -> Vec<(String, String)> {
        self.created.lock().clone()
    }

    /// `(dataset, snapshot)` pairs in destruction order.
    pub fn destroyed(&self) -> Vec<(String, String)> {
        self.destroyed.lock().clone()
    }

    pub fn snapshot_names(&self, dataset: &str) -> Vec<String> {
        self.datasets
            .get(dataset)
            .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatasetEngine for FakeEngine {
    async fn dataset_exists(&self, dataset: String) -> Result<bool> {
        Ok(self.datasets.contains_key(&dataset))
    }

    async fn list_snapshots(&self, dataset: String) -> Result<Vec<SnapshotEntry>> {
        match self.datasets.get(&dataset) {
            Some(entries) => Ok(entries.clone()),
            None => Err(EngineError::DatasetNotFound(dataset).into()),
        }
    }

    async fn create_snapshot(&self, dataset: String, snapshot: String, _recursive: bool) -> Result<()> {
        self.create_calls
            .lock()
            .push((dataset.clone(), snapshot.clone()));

        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(EngineError::CommandFailed {
                verb: "snapshot",
                status: Some(1),
                stderr: "injected create failure".to_string(),
            }
            .into());
        }

        let mut entries = self
            .datasets
            .get_mut(&dataset)
            .ok_or_else(|| EngineError::DatasetNotFound(dataset.clone()))?;
        if entries.iter().any(|e| e.name == snapshot) {
            return Err(EngineError::CommandFailed {
                verb: "snapshot",
                status: Some(1),
                stderr: format!("cannot create snapshot '{dataset}@{snapshot}': already exists"),
            }
            .into());
        }
        entries.push(SnapshotEntry {
            name: snapshot.clone(),
            created_index: self.next_index.fetch_add(1, Ordering::SeqCst),
        });
        drop(entries);

        self.created.lock().push((dataset, snapshot));
        Ok(())
    }

    async fn destroy_snapshot(
        &self,
        dataset: String,
        snapshot: String,
        _recursive: bool,
    ) -> Result<DestroyOutcome> {
        if self.fail_destroys.load(Ordering::SeqCst) {
            return Err(EngineError::CommandFailed {
                verb: "destroy",
                status: Some(1),
                stderr: "injected destroy failure".to_string(),
            }
            .into());
        }

        let Some(mut entries) = self.datasets.get_mut(&dataset) else {
            return Err(EngineError::DatasetNotFound(dataset).into());
        };
        let before = entries.len();
        entries.retain(|e| e.name != snapshot);
        if entries.len() == before {
            return Ok(DestroyOutcome::AlreadyAbsent);
        }
        drop(entries);

        self.destroyed.lock().push((dataset, snapshot));
        Ok(DestroyOutcome::Destroyed)
    }

    fn send_command(
        &self,
        dataset: String,
        target_snapshot: String,
        anchor_snapshot: Option<String>,
    ) -> Command {
        let payload = match anchor_snapshot {
            Some(anchor) => format!("incremental {dataset} {anchor}..{target_snapshot}"),
            None => format!("full {dataset} @{target_snapshot}"),
        };
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(format!("printf '%s' '{payload}'"));
        cmd
    }

    fn receive_command(&self, _dataset: String) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg("cat >/dev/null");
        cmd
    }
}
