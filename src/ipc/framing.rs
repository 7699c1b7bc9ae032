// Newline-delimited JSON framing shared by the controller and agents

use crate::error::{LogCtlError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Read one JSON message; `None` when the peer closed the connection
pub async fn read_json_line<T, R>(reader: &mut R) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| LogCtlError::IpcError(format!("Failed to read message: {}", e)))?;
    if read == 0 {
        return Ok(None);
    }

    serde_json::from_str(line.trim_end()).map(Some).map_err(|e| {
        LogCtlError::DeserializationError(format!("Failed to deserialize message: {}", e))
    })
}

/// Write one JSON message followed by a newline, then flush
pub async fn write_json_line<T, W>(writer: &mut W, message: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(message).map_err(|e| {
        LogCtlError::SerializationError(format!("Failed to serialize message: {}", e))
    })?;
    json.push('\n');

    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| LogCtlError::IpcError(format!("Failed to write message: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| LogCtlError::IpcError(format!("Failed to flush stream: {}", e)))?;

    Ok(())
}
