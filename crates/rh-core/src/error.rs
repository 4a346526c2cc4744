//! Core error types for ReconHive

use std::path::PathBuf;
use std::time::Duration;

use rh_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Top-level error type for the ReconHive ecosystem
#[derive(Error, Debug)]
pub enum RhError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// RPC error
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Task error
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by an RPC call
#[derive(Error, Debug)]
pub enum RpcError {
    /// The controller rejected the token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The controller answered with a fault
    #[error("Remote error ({code:?}): {message}")]
    Remote {
        /// Fault code
        code: ErrorCode,
        /// Fault message
        message: String,
    },

    /// Request or response body could not be (de)serialized
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// No reply within the call timeout
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// TLS setup or handshake failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Peer closed the connection before replying
    #[error("Connection closed")]
    ConnectionClosed,
}

impl RpcError {
    /// Build an error from a fault frame
    pub fn from_fault(code: ErrorCode, message: String) -> Self {
        match code {
            ErrorCode::AuthenticationFailed => RpcError::Authentication(message),
            _ => RpcError::Remote { code, message },
        }
    }

    /// Whether the underlying connection is unusable after this error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_)
                | RpcError::Protocol(_)
                | RpcError::Timeout(_)
                | RpcError::Tls(_)
                | RpcError::ConnectionClosed
        )
    }
}

/// Errors that fail a task
#[derive(Error, Debug)]
pub enum TaskError {
    /// The config payload did not match the task type
    #[error("invalid task config: {0}")]
    Decode(#[source] serde_json::Error),

    /// Organization scan without an organization
    #[error("no org id")]
    MissingOrgId,

    /// Controller communication failed
    #[error("rpc failed: {0}")]
    Rpc(#[from] RpcError),

    /// No engine registered for a phase
    #[error("no {0} engine available")]
    EngineUnavailable(&'static str),

    /// An engine failed outside of a sub-scan
    #[error("engine error: {0}")]
    Engine(String),

    /// The config decoded but cannot be run
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}
