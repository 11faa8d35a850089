//! Dataset engine abstraction over the platform snapshot tooling.
//!
//! Everything the engine knows about pools and snapshots flows through
//! [`DatasetEngine`]; the production implementation shells out to the
//! zfs binary, tests substitute an in-memory double.

mod cli;
pub use cli::*;

#[cfg(test)]
mod cli_test;

#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tonic::async_trait;

use crate::Result;

/// One row of a snapshot listing: bare snapshot name plus the pool's
/// monotonically increasing creation index (`createtxg`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub name: String,
    pub created_index: u64,
}

/// Outcome of a destroy request.
///
/// Destroys are idempotent: a snapshot that is already gone counts as
/// success, it only takes a different label in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    Destroyed,
    AlreadyAbsent,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatasetEngine: Send + Sync {
    /// Whether `dataset` exists in the pool.
    async fn dataset_exists(&self, dataset: String) -> Result<bool>;

    /// Snapshots of `dataset`, oldest first by creation index.
    async fn list_snapshots(&self, dataset: String) -> Result<Vec<SnapshotEntry>>;

    /// Creates `dataset@snapshot`, optionally recursing into children.
    async fn create_snapshot(
        &self,
        dataset: String,
        snapshot: String,
        recursive: bool,
    ) -> Result<()>;

    /// Destroys `dataset@snapshot`; absent snapshots count as success.
    async fn destroy_snapshot(
        &self,
        dataset: String,
        snapshot: String,
        recursive: bool,
    ) -> Result<DestroyOutcome>;

    /// Builds the send half of a transfer: a full stream of
    /// `dataset@target_snapshot`, or a delta from `anchor_snapshot`.
    fn send_command(
        &self,
        dataset: String,
        target_snapshot: String,
        anchor_snapshot: Option<String>,
    ) -> Command;

    /// Builds the receive half of a transfer into `dataset`.
    fn receive_command(&self, dataset: String) -> Command;
}
