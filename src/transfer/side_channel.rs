use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;
use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tracing::debug;

/// Shared tail of diagnostic lines produced by transfer children.
///
/// Every side channel of a transfer pushes into the same buffer, so an
/// error report carries the interleaved output of both processes. The
/// buffer keeps only the most recent lines; older ones are counted and
/// dropped.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<CaptureInner>>,
}

#[derive(Debug)]
struct CaptureInner {
    lines: VecDeque<String>,
    capacity: usize,
    dropped: u64,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureInner {
                lines: VecDeque::with_capacity(capacity),
                capacity,
                dropped: 0,
            })),
        }
    }

    fn push(&self, line: String) {
        let mut inner = self.inner.lock();
        if inner.capacity == 0 {
            inner.dropped += 1;
            return;
        }
        if inner.lines.len() == inner.capacity {
            inner.lines.pop_front();
            inner.dropped += 1;
        }
        inner.lines.push_back(line);
    }

    /// Returns the captured tail. When older lines were evicted the
    /// first entry says how many.
    pub fn snapshot(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut lines = Vec::with_capacity(inner.lines.len() + 1);
        if inner.dropped > 0 {
            lines.push(format!("({} earlier lines dropped)", inner.dropped));
        }
        lines.extend(inner.lines.iter().cloned());
        lines
    }
}

/// Drains one diagnostic stream of a transfer child into the log and a
/// [`CaptureBuffer`].
///
/// The reader starts immediately on spawn. Leaving a side channel
/// unread lets the kernel pipe buffer fill up and blocks the child, so
/// readers must be attached before the first payload byte is pumped.
pub struct SideChannelReader {
    handle: JoinHandle<()>,
}

impl SideChannelReader {
    pub fn spawn<R>(
        transfer_id: String,
        label: &'static str,
        stream: R,
        capture: CaptureBuffer,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        debug!("[{}|{}] {}", transfer_id, label, line);
                        capture.push(format!("{}: {}", label, line));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("[{}|{}] side channel closed: {}", transfer_id, label, e);
                        break;
                    }
                }
            }
        });
        Self { handle }
    }

    /// Waits for the stream to hit EOF. The owning child's pipes must
    /// already be closed or killed, otherwise this never returns.
    pub async fn join(self) -> std::result::Result<(), JoinError> {
        self.handle.await
    }
}
