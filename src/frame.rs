//! Wire format for the multiplexed UDP framing protocol.
//!
//! A frame is a self-delimited unit carried in a single UDP datagram: a
//! 25-byte header followed by `length` bytes of opaque payload. The codec
//! here is pure — no I/O — mirroring the header/body split the teacher
//! crate draws between `PduHeader` and PDU bodies in `codec.rs`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Cursor;
use thiserror::Error;
use uuid::Uuid;

/// Size of the fixed frame header: flag(1) + length(2) + rid(4) + sid(16) + seq(2).
pub const HEADER_SIZE: usize = 25;

/// Default maximum frame size (header + payload), including the header.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1500;

/// Stream identifier: client-assigned, carried as raw UUIDv4 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(pub [u8; 16]);

impl Sid {
    /// Generate a fresh, session-unique stream id.
    pub fn new() -> Self {
        Sid(*Uuid::new_v4().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Sid(bytes)
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Sid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

/// One of the five protocol flags, fixed per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Flag {
    /// Open stream.
    Syn = 0,
    /// Data payload.
    Psh = 1,
    /// End-of-message barrier (not a retransmit acknowledgement).
    Ack = 2,
    /// No-op, reserved.
    Nop = 3,
    /// End-of-stream.
    Fin = 4,
}

/// Errors that can occur while decoding a frame from raw bytes.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer too short to contain a frame header")]
    Incomplete,

    #[error("unknown frame flag: {0}")]
    UnknownFlag(u8),

    #[error("frame declared length {declared} but only {available} bytes of payload present")]
    LengthMismatch { declared: usize, available: usize },

    #[error("frame payload of {0} bytes exceeds the configured max frame size")]
    PayloadTooLarge(usize),
}

/// A single protocol frame: header fields plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flag: Flag,
    pub rid: u32,
    pub sid: Sid,
    pub seq: u16,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(flag: Flag, rid: u32, sid: Sid, seq: u16, payload: Bytes) -> Self {
        Frame {
            flag,
            rid,
            sid,
            seq,
            payload,
        }
    }

    /// Encode this frame's header + payload into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flag.into());
        buf.put_u16_le(self.payload.len() as u16);
        buf.put_u32_le(self.rid);
        buf.put_slice(&self.sid.0);
        buf.put_u16_le(self.seq);
        buf.put_slice(&self.payload);
    }

    /// Encode this frame to a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a complete frame (header + payload) from `src`.
    ///
    /// `src` must contain exactly one frame's worth of bytes (the caller,
    /// e.g. the session receive loop reading one UDP datagram, is
    /// responsible for framing at the datagram level — there is no
    /// reassembly across datagrams here).
    pub fn decode(src: &[u8]) -> Result<Frame, FrameError> {
        if src.len() < HEADER_SIZE {
            return Err(FrameError::Incomplete);
        }

        let mut cur = Cursor::new(src);
        let flag_byte = cur.get_u8();
        let flag = Flag::try_from_primitive(flag_byte).map_err(|_| FrameError::UnknownFlag(flag_byte))?;
        let length = cur.get_u16_le() as usize;
        let rid = cur.get_u32_le();
        let mut sid_bytes = [0u8; 16];
        cur.copy_to_slice(&mut sid_bytes);
        let seq = cur.get_u16_le();

        let available = cur.remaining();
        if available < length {
            return Err(FrameError::LengthMismatch {
                declared: length,
                available,
            });
        }

        let payload = Bytes::copy_from_slice(&cur.chunk()[..length]);

        Ok(Frame {
            flag,
            rid,
            sid: Sid(sid_bytes),
            seq,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let sid = Sid::new();
        let frame = Frame::new(Flag::Psh, 7, sid, 3, Bytes::from_static(b"hello"));
        let bytes = frame.to_bytes();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn empty_payload_round_trip() {
        let sid = Sid::new();
        let frame = Frame::new(Flag::Ack, 1, sid, 0, Bytes::new());
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.payload.len(), 0);
    }

    #[test]
    fn truncated_header_is_incomplete() {
        let short = vec![0u8; HEADER_SIZE - 1];
        assert!(matches!(Frame::decode(&short), Err(FrameError::Incomplete)));
    }

    #[test]
    fn declared_length_longer_than_buffer_is_mismatch() {
        let sid = Sid::new();
        let frame = Frame::new(Flag::Psh, 1, sid, 0, Bytes::from_static(b"ab"));
        let mut bytes = frame.to_bytes().to_vec();
        // Corrupt the length field to claim more payload than is present.
        bytes[1] = 0xff;
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let sid = Sid::new();
        let frame = Frame::new(Flag::Nop, 0, sid, 0, Bytes::new());
        let mut bytes = frame.to_bytes().to_vec();
        bytes[0] = 0xaa;
        assert!(matches!(Frame::decode(&bytes), Err(FrameError::UnknownFlag(0xaa))));
    }

    #[test]
    fn flag_ordinals_match_wire_spec() {
        assert_eq!(u8::from(Flag::Syn), 0);
        assert_eq!(u8::from(Flag::Psh), 1);
        assert_eq!(u8::from(Flag::Ack), 2);
        assert_eq!(u8::from(Flag::Nop), 3);
        assert_eq!(u8::from(Flag::Fin), 4);
    }
}
