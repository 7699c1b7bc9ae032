// Socket transport - delivers apply units to an agent over its controller connection

use crate::control::{AppliedSummary, ApplyUnit};
use crate::error::{LogCtlError, Result};
use crate::ipc::framing::{read_json_line, write_json_line};
use crate::ipc::{AgentRequest, AgentResponse};
use crate::workers::WorkerTransport;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long an agent may take to acknowledge a unit
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// [`WorkerTransport`] writing [`AgentRequest`] lines and awaiting the
/// matching [`AgentResponse`]
///
/// Responses arrive through the [`ResponseReader`] returned alongside the
/// transport. Nothing is read until that reader is spawned, so the owner can
/// register the worker first and have `on_close` always find it.
pub struct SocketTransport<W> {
    writer: W,
    responses: mpsc::UnboundedReceiver<AgentResponse>,
    next_id: u64,
    ack_timeout: Duration,
}

/// Read half of a [`SocketTransport`], idle until [`ResponseReader::spawn`]
pub struct ResponseReader<R> {
    reader: R,
    tx: mpsc::UnboundedSender<AgentResponse>,
}

impl<W> SocketTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new<R>(reader: R, writer: W) -> (Self, ResponseReader<R>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            writer,
            responses: rx,
            next_id: 0,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        };
        (transport, ResponseReader { reader, tx })
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }
}

impl<R> ResponseReader<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Start reading responses; `on_close` runs once when the agent hangs up
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(self, on_close: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        tokio::spawn(self.run(on_close))
    }

    async fn run<F>(mut self, on_close: F)
    where
        F: FnOnce(),
    {
        loop {
            match read_json_line::<AgentResponse, _>(&mut self.reader).await {
                Ok(Some(response)) => {
                    if self.tx.send(response).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Agent closed its connection");
                    break;
                }
                Err(e) => {
                    warn!("Dropping agent connection: {}", e);
                    break;
                }
            }
        }
        on_close();
    }
}

impl<W> WorkerTransport for SocketTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn deliver(&mut self, unit: ApplyUnit) -> Result<AppliedSummary> {
        self.next_id += 1;
        let id = self.next_id;
        write_json_line(&mut self.writer, &AgentRequest { id, unit }).await?;

        loop {
            let response = tokio::time::timeout(self.ack_timeout, self.responses.recv())
                .await
                .map_err(|_| {
                    LogCtlError::ConnectionError(format!(
                        "No acknowledgement for request {} within {:?}",
                        id, self.ack_timeout
                    ))
                })?
                .ok_or_else(|| LogCtlError::ConnectionError("Agent disconnected".to_string()))?;

            // late answers to requests that already timed out
            if response.id != id {
                debug!("Ignoring stale agent response {} while waiting for {}", response.id, id);
                continue;
            }

            return response.result.map_err(LogCtlError::ApplyRejected);
        }
    }
}
