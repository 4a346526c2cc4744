//! rh-protocol: Wire protocol for ReconHive RPC
//!
//! This crate defines the binary framing used between workers and the
//! controller. Every frame carries a call id so replies can be matched to
//! the call that produced them.

pub mod call;
pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use call::CallId;
pub use codec::{Frame, FrameCodec};
pub use error::ProtocolError;
pub use frame::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{ErrorCode, Message, MessageType, PROTOCOL_VERSION};
