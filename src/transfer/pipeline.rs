use std::process::Stdio;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use nanoid::nanoid;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::info;
use tracing::warn;

use super::CaptureBuffer;
use super::SideChannelReader;
use crate::config::ReplicationConfig;
use crate::errors::Leg;
use crate::errors::TransferError;
use crate::metrics::FAILED_TRANSFERS;
use crate::metrics::TRANSFER_BYTES_METRIC;
use crate::metrics::TRANSFER_DURATION_METRIC;
use crate::DatasetEngine;
use crate::ReplicationPlan;
use crate::Result;

/// What a finished transfer looked like.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub transfer_id: String,
    pub bytes_copied: u64,
    pub elapsed: Duration,
}

/// Pumps a send process into a receive process.
///
/// The pipeline owns no state between transfers. Each call spawns both
/// children, copies payload blocks from one to the other, and tears
/// everything down in a fixed order: payload pipes first, side-channel
/// readers second, process reaping last.
pub struct TransferPipeline {
    engine: Arc<dyn DatasetEngine>,
    config: ReplicationConfig,
}

impl TransferPipeline {
    pub fn new(engine: Arc<dyn DatasetEngine>, config: ReplicationConfig) -> Self {
        Self { engine, config }
    }

    /// Runs a planned transfer end to end.
    pub async fn execute(&self, plan: &ReplicationPlan) -> Result<TransferReport> {
        plan.validate()?;

        info!(
            "replicating {}@{} to {} ({:?}, anchor: {:?})",
            plan.source_dataset, plan.target, plan.destination_dataset, plan.mode, plan.anchor
        );

        let send_cmd = self.engine.send_command(
            plan.source_dataset.clone(),
            plan.target.clone(),
            plan.anchor.clone(),
        );
        let recv_cmd = self.engine.receive_command(plan.destination_dataset.clone());

        match self.run(send_cmd, recv_cmd).await {
            Ok(report) => {
                TRANSFER_BYTES_METRIC
                    .with_label_values(&[&plan.source_dataset])
                    .inc_by(report.bytes_copied);
                TRANSFER_DURATION_METRIC
                    .with_label_values(&[&plan.source_dataset])
                    .observe(report.elapsed.as_secs_f64());
                Ok(report)
            }
            Err(e) => {
                FAILED_TRANSFERS
                    .with_label_values(&[&plan.source_dataset])
                    .inc();
                Err(e)
            }
        }
    }

    /// Drives an arbitrary producer/consumer command pair through the
    /// pump. Split out from [`execute`](Self::execute) so transports
    /// other than the local engine can reuse the plumbing.
    pub async fn run(&self, mut send_cmd: Command, mut recv_cmd: Command) -> Result<TransferReport> {
        let transfer_id = nanoid!(10);
        let started = Instant::now();

        // Children must not outlive a cancelled pipeline future.
        send_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        recv_cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut send_child = send_cmd.spawn().map_err(|e| TransferError::Spawn {
            leg: Leg::Send,
            source: e,
        })?;
        let mut recv_child = recv_cmd.spawn().map_err(|e| TransferError::Spawn {
            leg: Leg::Receive,
            source: e,
        })?;

        let capture = CaptureBuffer::new(self.config.capture_lines);

        // Side channels attach before the first payload byte moves, so
        // a chatty child can never fill its pipe and stall the pump.
        let send_stderr = send_child.stderr.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Send,
            stream: "stderr",
        })?;
        let recv_stderr = recv_child.stderr.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Receive,
            stream: "stderr",
        })?;
        let recv_stdout = recv_child.stdout.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Receive,
            stream: "stdout",
        })?;
        let readers = vec![
            SideChannelReader::spawn(transfer_id.clone(), "send/err", send_stderr, capture.clone()),
            SideChannelReader::spawn(transfer_id.clone(), "recv/err", recv_stderr, capture.clone()),
            SideChannelReader::spawn(transfer_id.clone(), "recv/out", recv_stdout, capture.clone()),
        ];

        let mut payload = send_child.stdout.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Send,
            stream: "stdout",
        })?;
        let mut sink = recv_child.stdin.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Receive,
            stream: "stdin",
        })?;

        let progress = AtomicU64::new(0);
        let deadline = self.config.transfer_deadline();

        // None means the deadline fired before the pump finished.
        let pumped = match deadline {
            Some(limit) => {
                tokio::select! {
                    broken = pump(&mut payload, &mut sink, self.config.chunk_size, &progress) => Some(broken),
                    () = sleep(limit) => None,
                }
            }
            None => Some(pump(&mut payload, &mut sink, self.config.chunk_size, &progress).await),
        };

        if pumped.is_none() {
            warn!(
                "[{}] deadline {:?} exceeded, killing both processes",
                transfer_id, deadline
            );
            let _ = send_child.start_kill();
            let _ = recv_child.start_kill();
        }

        // Shutdown ladder: close the payload pipes so both children see
        // EOF, drain the side channels, then reap the processes.
        drop(payload);
        drop(sink);
        for reader in readers {
            reader.join().await.map_err(TransferError::TaskFailed)?;
        }
        let send_status = send_child.wait().await.map_err(|e| TransferError::Wait {
            leg: Leg::Send,
            source: e,
        })?;
        let recv_status = recv_child.wait().await.map_err(|e| TransferError::Wait {
            leg: Leg::Receive,
            source: e,
        })?;

        let bytes_copied = progress.load(Ordering::Relaxed);
        let elapsed = started.elapsed();

        let broken = match pumped {
            None => {
                return Err(TransferError::DeadlineExceeded {
                    deadline: deadline.unwrap_or_default(),
                    diagnostics: capture.snapshot(),
                }
                .into());
            }
            Some(broken) => broken,
        };

        if let Some(leg) = broken {
            warn!(
                "[{}] {} pipe broke after {} bytes (send exit: {:?}, receive exit: {:?})",
                transfer_id,
                leg,
                bytes_copied,
                send_status.code(),
                recv_status.code()
            );
            return Err(TransferError::BrokenPipe {
                leg,
                bytes_copied,
                diagnostics: capture.snapshot(),
            }
            .into());
        }

        if !send_status.success() || !recv_status.success() {
            return Err(TransferError::ToolExit {
                send_status: send_status.code(),
                receive_status: recv_status.code(),
                diagnostics: capture.snapshot(),
            }
            .into());
        }

        info!(
            "[{}] transfer finished: {} bytes in {:?}",
            transfer_id, bytes_copied, elapsed
        );
        Ok(TransferReport {
            transfer_id,
            bytes_copied,
            elapsed,
        })
    }
}

/// Copies payload blocks until EOF, reporting which leg failed when a
/// stream breaks. Progress is published through `copied` so the byte
/// count survives cancellation of this future.
async fn pump<R, W>(payload: &mut R, sink: &mut W, chunk_size: usize, copied: &AtomicU64) -> Option<Leg>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    loop {
        let read = match payload.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("payload read failed: {}", e);
                return Some(Leg::Send);
            }
        };
        if let Err(e) = sink.write_all(&buf[..read]).await {
            warn!("payload write failed: {}", e);
            return Some(Leg::Receive);
        }
        copied.fetch_add(read as u64, Ordering::Relaxed);
    }
    if let Err(e) = sink.flush().await {
        warn!("payload flush failed: {}", e);
        return Some(Leg::Receive);
    }
    None
}
