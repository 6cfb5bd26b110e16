//! Binary wire envelope (panic-free).
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! +-------+-------+-------+----------+--------+----------+-----------+
//! | Magic | Route | Flags | Reserved | Length | Sequence |  Payload  |
//! |  (4)  |  (1)  |  (1)  |   (2)    |  (4)   |   (4)    | (Length)  |
//! +-------+-------+-------+----------+--------+----------+-----------+
//! ```
//!
//! The gateway routes on the header alone; the payload stays opaque until it
//! reaches the chat service. Parsing never indexes past a length check and
//! never panics on hostile input.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProtocolError;

/// Frame magic constant. A mismatch is a fatal decode error.
pub const MAGIC: u32 = 0x1234_5678;

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 16;

/// Maximum accepted payload length (16 MiB).
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Routing class carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Route {
    /// Game traffic (reserved, not routed yet).
    Game = 1,
    /// Chat traffic: payload is a structured chat message.
    Chat = 2,
    /// System traffic: heartbeats and other connection-level frames.
    System = 3,
}

impl Route {
    /// Map a raw route byte to a known routing class.
    ///
    /// Unknown values are not a decode error; they are rejected later at
    /// dispatch so that the error can be attributed to the session.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Game),
            2 => Some(Self::Chat),
            3 => Some(Self::System),
            _ => None,
        }
    }

    /// Raw wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Header flag bits. Bits 2-7 are reserved and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags(0);
    /// Bit 0: payload is compressed.
    pub const COMPRESSED: FrameFlags = FrameFlags(1 << 0);
    /// Bit 1: payload is encrypted.
    pub const ENCRYPTED: FrameFlags = FrameFlags(1 << 1);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, flag: FrameFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn insert(&mut self, flag: FrameFlags) {
        self.0 |= flag.0;
    }
}

/// Decoded fixed header, enough for a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw route byte (see [`Route::from_u8`]).
    pub route: u8,
    pub flags: FrameFlags,
    /// Payload length in bytes.
    pub payload_len: u32,
    /// Request-response correlator chosen by the sender.
    pub sequence: u32,
}

/// A complete frame: header fields plus the payload copied out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub route: u8,
    pub flags: FrameFlags,
    pub sequence: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Build an outbound frame with no flags and sequence zero.
    #[must_use]
    pub fn new(route: Route, payload: impl Into<Bytes>) -> Self {
        Self {
            route: route.as_u8(),
            flags: FrameFlags::NONE,
            sequence: 0,
            payload: payload.into(),
        }
    }

    /// Build an outbound frame carrying the sender-chosen sequence.
    #[must_use]
    pub fn with_sequence(route: Route, sequence: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            ..Self::new(route, payload)
        }
    }

    /// Encode header and payload into a single buffer.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u32(MAGIC);
        buf.put_u8(self.route);
        buf.put_u8(self.flags.bits());
        buf.put_u16(0); // reserved, must be zero on send
        buf.put_u32(self.payload.len() as u32);
        buf.put_u32(self.sequence);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Encode a frame from its parts. `length` is derived from the payload.
#[must_use]
pub fn encode(route: Route, flags: FrameFlags, sequence: u32, payload: impl Into<Bytes>) -> Bytes {
    Frame {
        route: route.as_u8(),
        flags,
        sequence,
        payload: payload.into(),
    }
    .encode()
}

/// Decode the fixed 16-byte header.
///
/// The reserved bytes are ignored on receive. Fails with `HeaderTooShort`,
/// `BadMagic`, or `PayloadTooLarge`.
pub fn decode_header(buf: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Err(ProtocolError::HeaderTooShort {
            expected: HEADER_LEN,
            actual: buf.len(),
        });
    }

    let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }

    let route = buf[4];
    let flags = FrameFlags::from_bits(buf[5]);
    // buf[6..8] reserved
    let payload_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let sequence = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);

    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    Ok(FrameHeader {
        route,
        flags,
        payload_len,
        sequence,
    })
}

/// Decode a complete frame from a contiguous buffer.
pub fn decode(buf: &[u8]) -> Result<Frame, ProtocolError> {
    let header = decode_header(buf)?;

    let expected = HEADER_LEN + header.payload_len as usize;
    if buf.len() < expected {
        return Err(ProtocolError::Incomplete {
            expected,
            actual: buf.len(),
        });
    }

    Ok(Frame {
        route: header.route,
        flags: header.flags,
        sequence: header.sequence,
        payload: Bytes::copy_from_slice(&buf[HEADER_LEN..expected]),
    })
}

/// Read one frame from a byte stream: exactly 16 header bytes, then exactly
/// `length` payload bytes.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, ProtocolError> {
    let mut header_buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut header_buf).await?;

    let header = decode_header(&header_buf)?;

    let mut payload = vec![0u8; header.payload_len as usize];
    if header.payload_len > 0 {
        reader.read_exact(&mut payload).await?;
    }

    Ok(Frame {
        route: header.route,
        flags: header.flags,
        sequence: header.sequence,
        payload: Bytes::from(payload),
    })
}
