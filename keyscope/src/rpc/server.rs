//! Line loop: concurrent request tasks feeding a single output writer.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::error::RpcError;
use super::handlers::Handler;
use super::proto::Response;
use crate::config::ServerConfig;

/// Serves the line protocol over an input/output stream pair.
///
/// Every non-empty input line is handled on its own task, so a slow query
/// never holds up the lines behind it. Responses are written by one writer
/// task in completion order, one whole line at a time; callers correlate
/// them by `id`. A line that is not UTF-8 gets a malformed-request error
/// with an empty id.
pub struct Server {
    handler: Arc<Handler>,
    queue_depth: usize,
}

impl Server {
    pub fn new(handler: Arc<Handler>, config: &ServerConfig) -> Self {
        Self {
            handler,
            queue_depth: config.response_queue_depth.max(1),
        }
    }

    /// Reads requests until `input` reaches end of file, waits for every
    /// in-flight request, and returns `output` once all responses are
    /// flushed.
    pub async fn run<R, W>(&self, input: R, output: W) -> std::io::Result<W>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let writer = ResponseWriter { output, rx }.run();

        let mut tasks = JoinSet::new();
        let mut lines = input.split(b'\n');
        let mut received = 0u64;
        while let Some(segment) = lines.next_segment().await? {
            let raw = segment.strip_suffix(b"\r").unwrap_or(segment.as_slice());
            let line = match std::str::from_utf8(raw) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => line.to_string(),
                Err(e) => {
                    received += 1;
                    debug!(error = %e, "request line is not valid UTF-8");
                    if tx.send(RpcError::Malformed.into_response(String::new())).await.is_err() {
                        warn!("response writer stopped; dropping response");
                    }
                    continue;
                }
            };
            received += 1;
            let handler = Arc::clone(&self.handler);
            let tx = tx.clone();
            tasks.spawn(async move {
                let response = handler.handle_line(&line).await;
                if tx.send(response).await.is_err() {
                    warn!("response writer stopped; dropping response");
                }
            });
            // Reap finished tasks so the set does not grow with the input.
            while let Some(joined) = tasks.try_join_next() {
                log_join_error(joined);
            }
        }

        debug!(received, "input closed, draining in-flight requests");
        while let Some(joined) = tasks.join_next().await {
            log_join_error(joined);
        }
        drop(tx);

        let output = writer
            .await
            .map_err(|e| std::io::Error::other(format!("response writer panicked: {}", e)))??;
        info!(received, "server stopped");
        Ok(output)
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "request task failed");
    }
}

/// Sole owner of the output stream.
struct ResponseWriter<W> {
    output: W,
    rx: mpsc::Receiver<Response>,
}

impl<W: AsyncWrite + Unpin + Send + 'static> ResponseWriter<W> {
    fn run(mut self) -> tokio::task::JoinHandle<std::io::Result<W>> {
        tokio::spawn(async move {
            while let Some(response) = self.rx.recv().await {
                self.output.write_all(&response.to_line()).await?;
                self.output.flush().await?;
            }
            Ok(self.output)
        })
    }
}
