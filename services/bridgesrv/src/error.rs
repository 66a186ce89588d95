//! Error handling for the chamber bridge service
//!
//! One consolidated error type covers the whole service; callers match on
//! the variant when they need to distinguish transport conditions (poll
//! cycles absorb them, command writes retry or drop them).

use thiserror::Error;

/// Bridge service error type
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// Configuration-related errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport session could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation attempted while the transport is down
    #[error("Not connected")]
    NotConnected,

    /// A poll read exceeded its deadline
    #[error("Read timeout: {0}")]
    ReadTimeout(String),

    /// The device refused a write
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// A register name has no entry in the map (configuration mismatch)
    #[error("Unknown register: {0}")]
    UnknownRegister(String),

    /// Command backlog exceeded its bound
    #[error("Command queue full")]
    QueueFull,

    /// Input/output errors outside the transport session
    #[error("IO error: {0}")]
    Io(String),

    /// Data handling errors (decoding, validation, serialization)
    #[error("Data error: {0}")]
    Data(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the bridge service
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        BridgeError::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        BridgeError::Connection(msg.into())
    }

    pub fn read_timeout(msg: impl Into<String>) -> Self {
        BridgeError::ReadTimeout(msg.into())
    }

    pub fn write_rejected(msg: impl Into<String>) -> Self {
        BridgeError::WriteRejected(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        BridgeError::Data(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        BridgeError::Internal(msg.into())
    }

    /// Transport conditions the poll loop absorbs into a stale cycle
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::NotConnected | BridgeError::ReadTimeout(_) | BridgeError::Connection(_)
        )
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Data(format!("JSON: {err}"))
    }
}

impl From<serde_yaml::Error> for BridgeError {
    fn from(err: serde_yaml::Error) -> Self {
        BridgeError::Data(format!("YAML: {err}"))
    }
}

impl From<figment::Error> for BridgeError {
    fn from(err: figment::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

impl From<chamber_model::ModelError> for BridgeError {
    fn from(err: chamber_model::ModelError) -> Self {
        use chamber_model::ModelError;
        match err {
            ModelError::UnknownRegister(name) => BridgeError::UnknownRegister(name),
            other => BridgeError::Data(other.to_string()),
        }
    }
}
