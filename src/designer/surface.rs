use super::{DesignerApi, ExecRequest, LogSurface};
use crate::model::TaskDescriptor;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Why a log surface closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceExit {
    /// The job's output ended normally.
    Completed,
    /// The stream could not be opened or broke off.
    Failed(String),
    /// The surface went away without reporting (closed by the user).
    Dropped,
}

/// Resolves once the surface it was returned from has closed.
#[derive(Debug)]
pub struct SurfaceHandle {
    rx: oneshot::Receiver<SurfaceExit>,
}

/// Sending half held by the surface implementation.
#[derive(Debug)]
pub struct SurfaceCloser {
    tx: oneshot::Sender<SurfaceExit>,
}

impl SurfaceHandle {
    pub fn pair() -> (SurfaceCloser, SurfaceHandle) {
        let (tx, rx) = oneshot::channel();
        (SurfaceCloser { tx }, SurfaceHandle { rx })
    }

    pub async fn closed(self) -> SurfaceExit {
        self.rx.await.unwrap_or(SurfaceExit::Dropped)
    }
}

impl SurfaceCloser {
    pub fn close(self, exit: SurfaceExit) {
        let _ = self.tx.send(exit);
    }
}

/// Streams a job's output lines from the designer exec endpoint into a line
/// sink; the surface closes when the stream ends.
pub struct StreamingSurface {
    api: Arc<dyn DesignerApi>,
    lines: mpsc::UnboundedSender<String>,
}

impl StreamingSurface {
    pub fn new(api: Arc<dyn DesignerApi>, lines: mpsc::UnboundedSender<String>) -> Self {
        Self { api, lines }
    }
}

impl LogSurface for StreamingSurface {
    fn open(&self, descriptor: TaskDescriptor) -> SurfaceHandle {
        let (closer, handle) = SurfaceHandle::pair();
        let api = self.api.clone();
        let lines = self.lines.clone();
        let request = ExecRequest {
            base_dir: descriptor.base_dir.clone(),
            cmd: descriptor.command(),
        };
        tokio::spawn(async move {
            tracing::debug!(base_dir = %request.base_dir, cmd = %request.cmd, "opening log stream");
            let mut stream = match api.exec(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    closer.close(SurfaceExit::Failed(e.to_string()));
                    return;
                }
            };
            while let Some(line) = stream.next().await {
                match line {
                    Ok(line) => {
                        if lines.send(line).is_err() {
                            // Nobody is watching anymore.
                            closer.close(SurfaceExit::Dropped);
                            return;
                        }
                    }
                    Err(e) => {
                        closer.close(SurfaceExit::Failed(e.to_string()));
                        return;
                    }
                }
            }
            closer.close(SurfaceExit::Completed);
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_closer_reports_dropped() {
        let (closer, handle) = SurfaceHandle::pair();
        drop(closer);
        assert_eq!(handle.closed().await, SurfaceExit::Dropped);
    }

    #[tokio::test]
    async fn closer_reports_exit_reason() {
        let (closer, handle) = SurfaceHandle::pair();
        closer.close(SurfaceExit::Failed("exit 1".into()));
        assert_eq!(handle.closed().await, SurfaceExit::Failed("exit 1".into()));
    }
}
