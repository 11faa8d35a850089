use std::process::Output;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tonic::async_trait;
use tracing::debug;

use super::DatasetEngine;
use super::DestroyOutcome;
use super::SnapshotEntry;
use crate::EngineConfig;
use crate::EngineError;
use crate::Result;

/// [`DatasetEngine`] backed by the zfs command line tooling.
///
/// Listing relies on `createtxg` as the creation index: it is assigned
/// when the snapshot is taken and never reused, so sorting by it
/// reproduces creation order even when snapshot names do not sort.
pub struct ZfsCli {
    config: EngineConfig,
}

impl ZfsCli {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.zfs_path);
        cmd.stdin(Stdio::null());
        cmd
    }

    async fn run(&self, verb: &'static str, mut cmd: Command) -> Result<Output> {
        let timeout = Duration::from_millis(self.config.command_timeout_ms);
        debug!("running zfs {} ({:?})", verb, cmd.as_std().get_args());

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| EngineError::CommandFailed {
                verb,
                status: None,
                stderr: format!("timed out after {timeout:?}"),
            })?
            .map_err(|e| EngineError::Launch {
                program: self.config.zfs_path.display().to_string(),
                source: e,
            })?;
        Ok(output)
    }
}

#[async_trait]
impl DatasetEngine for ZfsCli {
    async fn dataset_exists(&self, dataset: String) -> Result<bool> {
        let mut cmd = self.command();
        cmd.args(["list", "-H", "-o", "name"]).arg(&dataset);

        let output = self.run("list", cmd).await?;
        if output.status.success() {
            return Ok(true);
        }
        if stderr_reports_missing(&output) {
            return Ok(false);
        }
        Err(command_failure("list", &dataset, &output).into())
    }

    async fn list_snapshots(&self, dataset: String) -> Result<Vec<SnapshotEntry>> {
        let mut cmd = self.command();
        cmd.args([
            "list",
            "-H",
            "-p",
            "-t",
            "snapshot",
            "-o",
            "name,createtxg",
            "-s",
            "createtxg",
        ])
        .arg(&dataset);

        let output = self.run("list", cmd).await?;
        if !output.status.success() {
            return Err(command_failure("list", &dataset, &output).into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_snapshot_listing(&dataset, &stdout)?)
    }

    async fn create_snapshot(
        &self,
        dataset: String,
        snapshot: String,
        recursive: bool,
    ) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("snapshot");
        if recursive {
            cmd.arg("-r");
        }
        cmd.arg(format!("{dataset}@{snapshot}"));

        let output = self.run("snapshot", cmd).await?;
        if !output.status.success() {
            return Err(command_failure("snapshot", &dataset, &output).into());
        }
        Ok(())
    }

    async fn destroy_snapshot(
        &self,
        dataset: String,
        snapshot: String,
        recursive: bool,
    ) -> Result<DestroyOutcome> {
        let mut cmd = self.command();
        cmd.arg("destroy");
        if recursive {
            cmd.arg("-r");
        }
        cmd.arg(format!("{dataset}@{snapshot}"));

        let output = self.run("destroy", cmd).await?;
        if output.status.success() {
            return Ok(DestroyOutcome::Destroyed);
        }
        if stderr_reports_missing(&output) {
            return Ok(DestroyOutcome::AlreadyAbsent);
        }
        Err(command_failure("destroy", &dataset, &output).into())
    }

    fn send_command(
        &self,
        dataset: String,
        target_snapshot: String,
        anchor_snapshot: Option<String>,
    ) -> Command {
        let mut cmd = self.command();
        cmd.arg("send").arg("-pPv");
        if let Some(anchor) = anchor_snapshot {
            cmd.arg("-i").arg(format!("@{anchor}"));
        }
        cmd.arg(format!("{dataset}@{target_snapshot}"));
        cmd
    }

    fn receive_command(&self, dataset: String) -> Command {
        let mut cmd = self.command();
        cmd.args(["receive", "-vFu"]).arg(&dataset);
        cmd
    }
}

/// True when the tool blames a missing dataset or snapshot rather than
/// a real failure.
pub(crate) fn stderr_reports_missing(output: &Output) -> bool {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr.contains("does not exist") || stderr.contains("could not find any snapshots to destroy")
}

pub(crate) fn command_failure(
    verb: &'static str,
    dataset: &str,
    output: &Output,
) -> EngineError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.contains("does not exist") {
        return EngineError::DatasetNotFound(dataset.to_string());
    }
    EngineError::CommandFailed {
        verb,
        status: output.status.code(),
        stderr,
    }
}

/// Parses `zfs list -H -p -o name,createtxg` output into entries.
///
/// Lines for other datasets (recursive listings include children) are
/// skipped rather than rejected.
pub(crate) fn parse_snapshot_listing(
    dataset: &str,
    stdout: &str,
) -> std::result::Result<Vec<SnapshotEntry>, EngineError> {
    let qualifier = format!("{dataset}@");
    let mut entries = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (full_name, txg) = line
            .split_once('\t')
            .ok_or_else(|| EngineError::UnexpectedOutput(line.to_string()))?;

        let Some(name) = full_name.strip_prefix(&qualifier) else {
            continue;
        };

        let created_index: u64 = txg
            .trim()
            .parse()
            .map_err(|_| EngineError::UnexpectedOutput(line.to_string()))?;

        entries.push(SnapshotEntry {
            name: name.to_string(),
            created_index,
        });
    }

    Ok(entries)
}
