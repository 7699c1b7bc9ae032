use thiserror::Error;

/// Main error type for the logging control plane
#[derive(Debug, Error)]
pub enum LogCtlError {
    // Level and binding errors
    #[error("Invalid level: {0}")]
    InvalidLevel(String),

    #[error("Invalid logger target: {0}")]
    InvalidTarget(String),

    // Session errors
    #[error("Tail session error: {0}")]
    SessionError(String),

    #[error("Sink write failed: {0}")]
    SinkError(String),

    // Worker errors
    #[error("Failed to deliver to worker {0}: {1}")]
    DeliveryError(String, String),

    #[error("Worker rejected apply unit: {0}")]
    ApplyRejected(String),

    // IPC-related errors
    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Failed to connect to controller: {0}")]
    ConnectionError(String),

    #[error("IPC protocol error: {0}")]
    ProtocolError(String),

    #[error("Controller not running")]
    ControllerNotRunning,

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Permission and security errors
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for control plane operations
pub type Result<T> = std::result::Result<T, LogCtlError>;
