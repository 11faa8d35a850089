use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;

use super::CaptureBuffer;
use super::SideChannelReader;
use crate::errors::Leg;
use crate::errors::TransferError;
use crate::Result;

/// Terminal state of a receive-only transfer.
#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    pub success: bool,
    pub bytes_received: u64,
    pub status_code: Option<i32>,
    pub diagnostics: Vec<String>,
}

/// Receive half of the pipeline, fed by remote chunks instead of a
/// local send process.
///
/// The lifecycle mirrors [`TransferPipeline::run`](super::TransferPipeline):
/// spawn with side channels attached, write chunks, then `finish` or
/// `abort` to walk the same shutdown ladder.
pub struct ReceiveSink {
    transfer_id: String,
    child: Child,
    stdin: Option<ChildStdin>,
    readers: Vec<SideChannelReader>,
    capture: CaptureBuffer,
    bytes_received: u64,
}

impl ReceiveSink {
    pub fn spawn(transfer_id: String, mut recv_cmd: Command, capture_lines: usize) -> Result<Self> {
        recv_cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = recv_cmd.spawn().map_err(|e| TransferError::Spawn {
            leg: Leg::Receive,
            source: e,
        })?;

        let capture = CaptureBuffer::new(capture_lines);
        let stderr = child.stderr.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Receive,
            stream: "stderr",
        })?;
        let stdout = child.stdout.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Receive,
            stream: "stdout",
        })?;
        let readers = vec![
            SideChannelReader::spawn(transfer_id.clone(), "recv/err", stderr, capture.clone()),
            SideChannelReader::spawn(transfer_id.clone(), "recv/out", stdout, capture.clone()),
        ];
        let stdin = child.stdin.take().ok_or(TransferError::MissingPipe {
            leg: Leg::Receive,
            stream: "stdin",
        })?;

        Ok(Self {
            transfer_id,
            child,
            stdin: Some(stdin),
            readers,
            capture,
            bytes_received: 0,
        })
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Forwards one payload chunk into the receive process.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(TransferError::MissingPipe {
            leg: Leg::Receive,
            stream: "stdin",
        })?;
        if let Err(e) = stdin.write_all(data).await {
            warn!(
                "[{}] receive process rejected chunk after {} bytes: {}",
                self.transfer_id, self.bytes_received, e
            );
            return Err(TransferError::BrokenPipe {
                leg: Leg::Receive,
                bytes_copied: self.bytes_received,
                diagnostics: self.capture.snapshot(),
            }
            .into());
        }
        self.bytes_received += data.len() as u64;
        Ok(())
    }

    /// Closes the payload pipe and reaps the process. Safe to call
    /// after a failed `write_chunk` as well.
    pub async fn finish(mut self) -> Result<ReceiveOutcome> {
        drop(self.stdin.take());
        for reader in self.readers.drain(..) {
            reader.join().await.map_err(TransferError::TaskFailed)?;
        }
        let status = self.child.wait().await.map_err(|e| TransferError::Wait {
            leg: Leg::Receive,
            source: e,
        })?;
        debug!(
            "[{}] receive process exited with {:?} after {} bytes",
            self.transfer_id,
            status.code(),
            self.bytes_received
        );
        Ok(ReceiveOutcome {
            success: status.success(),
            bytes_received: self.bytes_received,
            status_code: status.code(),
            diagnostics: self.capture.snapshot(),
        })
    }

    /// Kills the process first, then walks the normal teardown. The
    /// outcome is always marked failed; an interrupted stream is never
    /// trusted, even when the process managed to exit cleanly.
    pub async fn abort(mut self) -> Result<ReceiveOutcome> {
        let _ = self.child.start_kill();
        let mut outcome = self.finish().await?;
        outcome.success = false;
        Ok(outcome)
    }
}
