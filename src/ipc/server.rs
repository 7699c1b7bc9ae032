// IPC Server - Listens for client and agent connections

use crate::config::DEFAULT_SOCKET_PATH;
use crate::error::{LogCtlError, Result};
use crate::ipc::framing::{read_json_line, write_json_line};
use crate::ipc::{Request, Response};
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};

/// IPC server for handling client connections
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl IpcServer {
    /// Create a new IPC server with the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(DEFAULT_SOCKET_PATH)
    }

    /// Create a new IPC server with a custom socket path
    pub fn with_socket_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            socket_path: path.as_ref().to_path_buf(),
            listener: None,
        }
    }

    /// Bind to the Unix socket; must be called from within a tokio runtime
    pub fn start(&mut self) -> Result<()> {
        // Remove a stale socket file left by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| {
                LogCtlError::IpcError(format!("Failed to remove existing socket: {}", e))
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| LogCtlError::IpcError(format!("Failed to bind to socket: {}", e)))?;

        // Owner-only access; peers are still checked per command
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, permissions).map_err(|e| {
                LogCtlError::IpcError(format!("Failed to set socket permissions: {}", e))
            })?;
        }

        self.listener = Some(listener);
        Ok(())
    }

    /// Accept a single incoming connection
    pub async fn accept(&self) -> Result<Connection> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| LogCtlError::IpcError("Server not started".to_string()))?;

        let (stream, _addr) = listener
            .accept()
            .await
            .map_err(|e| LogCtlError::IpcError(format!("Failed to accept connection: {}", e)))?;

        Ok(Connection::new(stream))
    }

    /// Stop the server and clean up the socket file
    pub fn stop(&mut self) -> Result<()> {
        self.listener = None;

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| {
                LogCtlError::IpcError(format!("Failed to remove socket file: {}", e))
            })?;
        }

        Ok(())
    }

    /// Get the socket path being used
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_started(&self) -> bool {
        self.listener.is_some()
    }
}

impl Default for IpcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.listener.is_some() {
            let _ = self.stop();
        }
    }
}

/// One accepted connection, with the peer's uid when the OS reports it
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer_uid: Option<u32>,
}

impl Connection {
    pub fn new(stream: UnixStream) -> Self {
        let peer_uid = stream.peer_cred().ok().map(|cred| cred.uid());
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
            peer_uid,
        }
    }

    pub fn peer_uid(&self) -> Option<u32> {
        self.peer_uid
    }

    /// Read the next request; `None` once the peer hung up
    pub async fn read_request(&mut self) -> Result<Option<Request>> {
        read_json_line(&mut self.reader).await
    }

    pub async fn write_response(&mut self, response: &Response) -> Result<()> {
        write_json_line(&mut self.writer, response).await
    }

    /// Hand both halves over to a long-lived session
    pub fn into_split(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}
