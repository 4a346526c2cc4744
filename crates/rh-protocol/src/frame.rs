//! Frame header encoding/decoding
//!
//! Every frame starts with an 8-byte header:
//! - call_id: 4 bytes (u32, big-endian), echoed by the reply
//! - version: 1 byte, must equal [`PROTOCOL_VERSION`]
//! - payload_length: 3 bytes (u24, big-endian, max 16MB)
//!
//! The message kind lives in the bincode payload, so the header only carries
//! what is needed to route and bound a frame before decoding it.

use bytes::{Buf, BufMut, BytesMut};

use crate::call::CallId;
use crate::error::ProtocolError;
use crate::message::PROTOCOL_VERSION;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (16MB - 1, limited by 24-bit length field)
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub call_id: CallId,
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn new(call_id: CallId, payload_length: u32) -> Self {
        Self {
            call_id,
            payload_length,
        }
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        dst.put_u32(self.call_id.as_u32());
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u8((self.payload_length >> 16) as u8);
        dst.put_u16(self.payload_length as u16);
    }

    /// Decode a header from a byte buffer
    ///
    /// Returns None until a whole header is buffered; nothing is consumed in
    /// that case. A peer speaking another protocol version is an error.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let version = src[4];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let call_id = CallId::new(src.get_u32());
        src.advance(1);
        let len_high = src.get_u8() as u32;
        let len_low = src.get_u16() as u32;

        Ok(Some(Self {
            call_id,
            payload_length: (len_high << 16) | len_low,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut buf = BytesMut::new();
        FrameHeader::new(CallId::new(0x0102_0304), 0x0A_0B0C).encode(&mut buf);
        assert_eq!(&buf[..], &[1, 2, 3, 4, PROTOCOL_VERSION, 0x0A, 0x0B, 0x0C]);

        let decoded = FrameHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.call_id, CallId::new(0x0102_0304));
        assert_eq!(decoded.payload_length, 0x0A_0B0C);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_max_payload_length() {
        let header = FrameHeader::new(CallId::new(1), MAX_PAYLOAD_SIZE as u32);
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        header.encode(&mut buf);

        let decoded = FrameHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload_length, MAX_PAYLOAD_SIZE as u32);
    }

    #[test]
    fn test_insufficient_bytes() {
        let mut buf = BytesMut::from(&[0u8; 4][..]);
        assert!(FrameHeader::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut buf = BytesMut::from(&[0, 0, 0, 1, 0x7E, 0, 0, 10][..]);
        let result = FrameHeader::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(0x7E))));
        assert_eq!(buf.len(), HEADER_SIZE);
    }
}
