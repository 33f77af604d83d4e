//! Heartbeat writer: lifecycle lines on the supervisor pipe.

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use vigil_core::protocol::WorkerLine;

/// Serializes worker status lines onto stdout (the supervisor pipe).
///
/// A dedicated task owns the stream so heartbeat ticks, readiness and drain
/// notices never interleave mid-line.
pub(crate) struct Heartbeat {
    tx: mpsc::UnboundedSender<WorkerLine>,
    task: tokio::task::JoinHandle<()>,
}

impl Heartbeat {
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerLine>();
        let task = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(line) = rx.recv().await {
                let mut buf = line.as_str().as_bytes().to_vec();
                buf.push(b'\n');
                if stdout.write_all(&buf).await.is_err() {
                    // The supervisor end is gone; nothing left to report to.
                    break;
                }
                let _ = stdout.flush().await;
            }
        });
        Self { tx, task }
    }

    pub fn send(&self, line: WorkerLine) {
        let _ = self.tx.send(line);
    }

    /// Handle suitable for timer callbacks.
    pub fn sender(&self) -> mpsc::UnboundedSender<WorkerLine> {
        self.tx.clone()
    }

    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}
