// IPC Client - Communicates with the controller via Unix socket

use crate::config::DEFAULT_SOCKET_PATH;
use crate::error::{LogCtlError, Result};
use crate::ipc::{Command, Request, Response, ResponseData, TailOptions};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Maximum number of connection retry attempts
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// IPC client for communicating with the controller
pub struct IpcClient {
    socket_path: PathBuf,
    request_id: AtomicU64,
}

impl IpcClient {
    /// Create a new IPC client with the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(DEFAULT_SOCKET_PATH)
    }

    /// Create a new IPC client with a custom socket path
    pub fn with_socket_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            socket_path: path.as_ref().to_path_buf(),
            request_id: AtomicU64::new(1),
        }
    }

    /// Send a command to the controller and wait for a response
    pub fn send_command(&self, command: Command) -> Result<Response> {
        let request = Request::new(self.next_request_id(), command);

        let mut last_error = None;
        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            match self.try_send_request(&request) {
                Ok(response) => {
                    check_response_id(request.id, &response)?;
                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < MAX_RETRY_ATTEMPTS {
                        std::thread::sleep(RETRY_DELAY);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LogCtlError::ConnectionError("Failed to connect after retries".to_string())
        }))
    }

    /// Start a tail session and copy every streamed record to `out`
    ///
    /// Returns the logger names the controller is tailing once the controller
    /// ends the stream. Not retried: a tail is a live session.
    pub fn tail<W: Write>(&self, options: TailOptions, out: &mut W) -> Result<Vec<String>> {
        let request = Request::new(self.next_request_id(), Command::TailLog(options));
        let mut stream = self.connect()?;
        write_request(&mut stream, &request)?;

        let mut reader = BufReader::new(stream);
        let response = read_response(&mut reader)?;
        check_response_id(request.id, &response)?;

        let names = match response.result {
            Ok(ResponseData::TailStarted { names }) => names,
            Ok(other) => {
                return Err(LogCtlError::ProtocolError(format!(
                    "Unexpected response to tail request: {:?}",
                    other
                )))
            }
            Err(e) => return Err(LogCtlError::Other(e)),
        };

        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|e| LogCtlError::IpcError(format!("Failed to read record: {}", e)))?;
            if read == 0 {
                break;
            }
            out.write_all(line.as_bytes())?;
            out.flush()?;
        }

        Ok(names)
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Attempt to send a request to the controller (single attempt)
    fn try_send_request(&self, request: &Request) -> Result<Response> {
        let mut stream = self.connect()?;
        write_request(&mut stream, request)?;

        let mut reader = BufReader::new(stream);
        read_response(&mut reader)
    }

    /// Establish a connection to the controller's Unix socket
    fn connect(&self) -> Result<UnixStream> {
        if !self.socket_path.exists() {
            return Err(LogCtlError::ControllerNotRunning);
        }

        UnixStream::connect(&self.socket_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused
                || e.kind() == std::io::ErrorKind::NotFound
            {
                LogCtlError::ControllerNotRunning
            } else {
                LogCtlError::ConnectionError(format!("Failed to connect to controller: {}", e))
            }
        })
    }

    /// Get the socket path being used
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

fn write_request(stream: &mut UnixStream, request: &Request) -> Result<()> {
    let request_json = serde_json::to_string(request).map_err(|e| {
        LogCtlError::SerializationError(format!("Failed to serialize request: {}", e))
    })?;

    writeln!(stream, "{}", request_json)
        .map_err(|e| LogCtlError::IpcError(format!("Failed to write request: {}", e)))?;
    stream
        .flush()
        .map_err(|e| LogCtlError::IpcError(format!("Failed to flush stream: {}", e)))
}

fn read_response<R: BufRead>(reader: &mut R) -> Result<Response> {
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| LogCtlError::IpcError(format!("Failed to read response: {}", e)))?;

    serde_json::from_str(&response_line).map_err(|e| {
        LogCtlError::DeserializationError(format!("Failed to deserialize response: {}", e))
    })
}

fn check_response_id(expected: u64, response: &Response) -> Result<()> {
    if response.id != expected {
        return Err(LogCtlError::ProtocolError(format!(
            "Response ID mismatch: expected {}, got {}",
            expected, response.id
        )));
    }
    Ok(())
}
