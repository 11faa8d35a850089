use std::process::Stdio;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use nanoid::nanoid;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::ReplicationConfig;
use crate::errors::Leg;
use crate::errors::TransferError;
use crate::metrics::FAILED_TRANSFERS;
use crate::metrics::TRANSFER_BYTES_METRIC;
use crate::metrics::TRANSFER_DURATION_METRIC;
use crate::proto::replication::ReceiveChunk;
use crate::proto::replication::ReceiveSummary;
use crate::snapshots;
use crate::CaptureBuffer;
use crate::DatasetEngine;
use crate::PlanOutcome;
use crate::ReplicationClient;
use crate::ReplicationPlan;
use crate::Result;
use crate::SideChannelReader;
use crate::SnapshotSet;
use crate::TransferMode;

/// Result of one push attempt.
#[derive(Debug, Clone)]
pub enum PushOutcome {
    /// The peer already held the youngest local snapshot.
    UpToDate,
    /// Exactly one snapshot travelled.
    Transferred(PushReport),
}

#[derive(Debug, Clone)]
pub struct PushReport {
    pub transfer_id: String,
    pub target: String,
    pub mode: TransferMode,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// How the request stream ended, when it ended before the deadline.
enum StreamEnd {
    /// The pump ran to completion; `Some` names the broken leg.
    Pumped(Option<Leg>),
    /// The peer answered while payload was still flowing.
    EarlyReply(std::result::Result<ReceiveSummary, tonic::Status>),
}

/// Pushes local snapshots into a peer node.
///
/// One push negotiates a target over the wire, re-derives anchor and
/// mode against the local inventory, then streams the send process's
/// stdout to the peer's import RPC. The peer's summary is the verdict;
/// a clean send with a rejected import is still a failed push.
pub struct PushReplicator {
    client: ReplicationClient,
    engine: Arc<dyn DatasetEngine>,
    config: ReplicationConfig,
}

impl PushReplicator {
    pub fn new(
        client: ReplicationClient,
        engine: Arc<dyn DatasetEngine>,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            client,
            engine,
            config,
        }
    }

    /// Replicates `source_dataset` into the peer's `destination_dataset`.
    ///
    /// The peer picks the target (the youngest snapshot it lacks); the
    /// anchor comes from the shared-snapshot listing so the planner's
    /// stale-destination guard runs on this side too.
    pub async fn push(&self, source_dataset: &str, destination_dataset: &str) -> Result<PushOutcome> {
        let local = SnapshotSet::load(self.engine.as_ref(), source_dataset).await?;
        let names = local.names();

        let Some(target) = self
            .client
            .latest_snapshot_needed(destination_dataset, names.clone())
            .await?
        else {
            info!(
                "'{}' on {} is up to date",
                destination_dataset,
                self.client.peer()
            );
            return Ok(PushOutcome::UpToDate);
        };

        let shared = self
            .client
            .common_snapshots(destination_dataset, names)
            .await?;
        let destination = SnapshotSet::from_remote(destination_dataset, shared);

        let plan = match snapshots::plan(&local, &destination, Some(&target))? {
            PlanOutcome::Plan(plan) => plan,
            PlanOutcome::UpToDate => {
                // Raced with another sender; the target landed already.
                debug!("peer already holds '{}', nothing to push", target);
                return Ok(PushOutcome::UpToDate);
            }
        };

        match self.stream(&plan).await {
            Ok(report) => {
                TRANSFER_BYTES_METRIC
                    .with_label_values(&[&plan.source_dataset])
                    .inc_by(report.bytes_sent);
                TRANSFER_DURATION_METRIC
                    .with_label_values(&[&plan.source_dataset])
                    .observe(report.elapsed.as_secs_f64());
                Ok(PushOutcome::Transferred(report))
            }
            Err(e) => {
                FAILED_TRANSFERS
                    .with_label_values(&[&plan.source_dataset])
                    .inc();
                Err(e)
            }
        }
    }

    /// Spawns the send leg and drives its stdout through the import RPC.
    async fn stream(&self, plan: &ReplicationPlan) -> Result<PushReport> {
        let transfer_id = nanoid!(10);
        let started = Instant::now();

        info!(
            "[{}] pushing {}@{} to {} ({:?}, anchor: {:?})",
            transfer_id,
            plan.source_dataset,
            plan.target,
            self.client.peer(),
            plan.mode,
            plan.anchor
        );

        let mut send_cmd = self.engine.send_command(
            plan.source_dataset.clone(),
            plan.target.clone(),
            plan.anchor.clone(),
        );
        send_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = send_cmd.spawn().map_err(|e| TransferError::Spawn {
            leg: Leg::Send,
            source: e,
        })?;

        let capture = CaptureBuffer::new(self.config.capture_lines);
        let stderr = child.stderr.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Send,
            stream: "stderr",
        })?;
        let reader =
            SideChannelReader::spawn(transfer_id.clone(), "send/err", stderr, capture.clone());
        let payload = child.stdout.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Send,
            stream: "stdout",
        })?;

        let progress = AtomicU64::new(0);
        let (tx, rx) = mpsc::channel::<ReceiveChunk>(32);
        let mut service = self.client.service();
        let response = service.receive(ReceiverStream::new(rx));
        tokio::pin!(response);

        let deadline = self.config.transfer_deadline();

        // The pump future holds its own sender clone, so it lives in a
        // block: dropping it below is what releases that clone before
        // the stream is closed for good.
        let end = {
            let pump = pump_chunks(
                payload,
                plan.destination_dataset.clone(),
                self.config.chunk_size,
                tx.clone(),
                &progress,
            );
            tokio::pin!(pump);

            // None means the deadline fired first.
            match deadline {
                Some(limit) => {
                    tokio::select! {
                        broken = &mut pump => Some(StreamEnd::Pumped(broken)),
                        early = &mut response => Some(StreamEnd::EarlyReply(early.map(|r| r.into_inner()))),
                        () = sleep(limit) => None,
                    }
                }
                None => {
                    tokio::select! {
                        broken = &mut pump => Some(StreamEnd::Pumped(broken)),
                        early = &mut response => Some(StreamEnd::EarlyReply(early.map(|r| r.into_inner()))),
                    }
                }
            }
        };

        let Some(end) = end else {
            warn!(
                "[{}] deadline {:?} exceeded, killing send process",
                transfer_id, deadline
            );
            let _ = child.start_kill();
            let _ = child.wait().await;
            reader.join().await.map_err(TransferError::TaskFailed)?;
            return Err(TransferError::DeadlineExceeded {
                deadline: deadline.unwrap_or_default(),
                diagnostics: capture.snapshot(),
            }
            .into());
        };

        let summary = match end {
            StreamEnd::EarlyReply(reply) => {
                // Stop producing; the peer has spoken.
                let _ = child.start_kill();
                let _ = child.wait().await;
                reader.join().await.map_err(TransferError::TaskFailed)?;
                match reply {
                    Ok(summary) => summary,
                    Err(status) => {
                        warn!(
                            "[{}] peer aborted the import mid-stream: {:?}",
                            transfer_id, status
                        );
                        return Err(status.into());
                    }
                }
            }
            StreamEnd::Pumped(broken) => {
                let status = child.wait().await.map_err(|e| TransferError::Wait {
                    leg: Leg::Send,
                    source: e,
                })?;
                reader.join().await.map_err(TransferError::TaskFailed)?;

                if let Some(leg) = broken {
                    warn!(
                        "[{}] {} pipe broke after {} bytes (send exit: {:?})",
                        transfer_id,
                        leg,
                        progress.load(Ordering::Relaxed),
                        status.code()
                    );
                    return Err(TransferError::BrokenPipe {
                        leg,
                        bytes_copied: progress.load(Ordering::Relaxed),
                        diagnostics: capture.snapshot(),
                    }
                    .into());
                }

                if !status.success() {
                    // Dropping the in-flight call here resets the stream,
                    // so the peer aborts instead of committing a
                    // truncated import.
                    return Err(TransferError::ToolExit {
                        send_status: status.code(),
                        receive_status: None,
                        diagnostics: capture.snapshot(),
                    }
                    .into());
                }

                drop(tx);
                response.await?.into_inner()
            }
        };

        let bytes_sent = progress.load(Ordering::Relaxed);
        let elapsed = started.elapsed();

        if !summary.success {
            warn!(
                "[{}] peer rejected '{}' after {} bytes: {}",
                transfer_id, plan.target, summary.bytes_received, summary.detail
            );
            return Err(TransferError::RemoteRejected {
                bytes_received: summary.bytes_received,
                detail: summary.detail,
            }
            .into());
        }

        info!(
            "[{}] pushed {}@{} in {:?} ({} bytes)",
            transfer_id, plan.source_dataset, plan.target, elapsed, bytes_sent
        );
        Ok(PushReport {
            transfer_id,
            target: plan.target.clone(),
            mode: plan.mode,
            bytes_sent,
            elapsed,
        })
    }
}

/// Forwards payload blocks as chunks until EOF. The first chunk names
/// the destination dataset; byte progress goes through `copied`.
/// `Some(leg)` reports which side vanished mid-stream.
async fn pump_chunks(
    mut payload: ChildStdout,
    dataset: String,
    chunk_size: usize,
    tx: mpsc::Sender<ReceiveChunk>,
    copied: &AtomicU64,
) -> Option<Leg> {
    let mut buf = vec![0u8; chunk_size];
    let mut first = true;
    loop {
        let n = match payload.read(&mut buf).await {
            Ok(0) => {
                if first {
                    // An empty payload still has to name the dataset.
                    let naming = ReceiveChunk {
                        dataset: dataset.clone(),
                        data: Vec::new(),
                    };
                    if tx.send(naming).await.is_err() {
                        return Some(Leg::Receive);
                    }
                }
                return None;
            }
            Ok(n) => n,
            Err(_) => return Some(Leg::Send),
        };

        let chunk = ReceiveChunk {
            dataset: if first {
                dataset.clone()
            } else {
                String::new()
            },
            data: buf[..n].to_vec(),
        };
        first = false;

        if tx.send(chunk).await.is_err() {
            return Some(Leg::Receive);
        }
        copied.fetch_add(n as u64, Ordering::Relaxed);
    }
}
