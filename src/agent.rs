// Agent - Worker process applying the controller's logging configuration

use crate::control::RemoteApplyState;
use crate::error::{LogCtlError, Result};
use crate::ipc::framing::{read_json_line, write_json_line};
use crate::ipc::{AgentHello, AgentRequest, AgentResponse, Command, Request, Response, ResponseData};
use crate::workers::WorkerId;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

/// Delay between reconnection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// A worker connected to one controller
///
/// Everything the controller applied is reverted when the connection ends;
/// the controller re-sends its current configuration on reconnect.
pub struct Agent {
    name: String,
    socket_path: PathBuf,
    state: Arc<RemoteApplyState>,
    reconnect_delay: Option<Duration>,
}

impl Agent {
    pub fn new<P: AsRef<Path>>(name: &str, socket_path: P, state: Arc<RemoteApplyState>) -> Self {
        Self {
            name: name.to_string(),
            socket_path: socket_path.as_ref().to_path_buf(),
            state,
            reconnect_delay: None,
        }
    }

    /// Keep reconnecting after the controller goes away
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect, introduce ourselves, and apply units until the controller hangs up
    ///
    /// # Arguments
    /// * `on_welcome` - Called with the worker id the controller assigned
    pub async fn run_session<F>(&self, on_welcome: F) -> Result<()>
    where
        F: FnOnce(WorkerId),
    {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused
                || e.kind() == std::io::ErrorKind::NotFound
            {
                LogCtlError::ControllerNotRunning
            } else {
                LogCtlError::ConnectionError(format!("Failed to connect to controller: {}", e))
            }
        })?;
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let hello = Request::new(
            1,
            Command::AgentHello(AgentHello {
                name: self.name.clone(),
                pid: std::process::id(),
            }),
        );
        write_json_line(&mut writer, &hello).await?;

        let response: Response = read_json_line(&mut reader).await?.ok_or_else(|| {
            LogCtlError::ConnectionError("Controller closed the connection".to_string())
        })?;
        let worker_id = match response.result {
            Ok(ResponseData::Welcome { worker_id }) => worker_id,
            Ok(other) => {
                return Err(LogCtlError::ProtocolError(format!(
                    "Unexpected answer to hello: {:?}",
                    other
                )))
            }
            Err(e) => return Err(LogCtlError::ConnectionError(e)),
        };
        info!("Agent {} joined as worker {}", self.name, worker_id);
        on_welcome(worker_id);

        let result = self.apply_loop(&mut reader, &mut writer).await;
        self.state.clear();
        result
    }

    async fn apply_loop<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: tokio::io::AsyncBufRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        while let Some(request) = read_json_line::<AgentRequest, _>(reader).await? {
            debug!(
                "Applying {} generation {} ({} bindings)",
                request.unit.channel,
                request.unit.generation,
                request.unit.bindings.len()
            );
            let summary = self.state.apply_idempotent(&request.unit);
            let response = AgentResponse {
                id: request.id,
                result: Ok(summary),
            };
            write_json_line(writer, &response).await?;
        }

        info!("Controller closed the connection");
        Ok(())
    }

    /// Run sessions until `shutdown` resolves
    ///
    /// Without a reconnect delay this returns after the first session.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                outcome = self.run_session(|_| {}) => outcome,
            };

            let Some(delay) = self.reconnect_delay else {
                self.state.clear();
                return outcome;
            };
            if let Err(e) = outcome {
                warn!("Agent {} lost the controller: {}", self.name, e);
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state.clear();
        Ok(())
    }
}
