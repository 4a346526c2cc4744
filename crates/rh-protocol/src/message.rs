//! Message types for the ReconHive RPC protocol
//!
//! A worker sends `Call` frames; the controller answers each with exactly one
//! `Reply` or `Fault` frame carrying the same call id. Request and response
//! bodies are opaque bytes at this layer (JSON-encoded typed structs in
//! practice), so the method catalogue can evolve without touching framing.
//!
//! # Authentication
//!
//! Every `Call` carries the shared-secret token. There is no handshake and no
//! per-connection session: the controller checks the token on every call and
//! answers `Fault { code: AuthenticationFailed }` without running the method
//! when it does not match.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Wire version written into every frame header
pub const PROTOCOL_VERSION: u8 = 1;

/// Kind of a message, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call,
    Reply,
    Fault,
}

/// Error codes carried by `Fault` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unknown error
    Unknown = 0,
    /// Token missing or not matching the configured secret
    AuthenticationFailed = 1,
    /// No handler registered under the requested method name
    UnknownMethod = 2,
    /// Request body could not be decoded
    InvalidRequest = 3,
    /// The handler ran and returned an error
    HandlerFailed = 4,
    /// Frame was not a call
    InvalidMessage = 5,
}

/// Protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Invoke a registered method
    Call {
        /// Method name, e.g. "SaveScanResult"
        method: String,
        /// Shared-secret token
        token: String,
        /// Encoded request
        body: Bytes,
    },

    /// Method result
    Reply {
        /// Encoded response
        body: Bytes,
    },

    /// Call failed
    Fault {
        /// Error code
        code: ErrorCode,
        /// Human-readable message
        message: String,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Call { .. } => MessageType::Call,
            Message::Reply { .. } => MessageType::Reply,
            Message::Fault { .. } => MessageType::Fault,
        }
    }

    /// Build a fault message
    pub fn fault(code: ErrorCode, message: impl Into<String>) -> Self {
        Message::Fault {
            code,
            message: message.into(),
        }
    }
}
