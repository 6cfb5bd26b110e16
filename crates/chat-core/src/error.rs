//! Wire protocol error types.

/// Errors produced while encoding or decoding the wire envelope.
///
/// Every variant except `Io` indicates a malformed frame from the peer and is
/// fatal for the connection that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid magic: 0x{0:08X}")]
    BadMagic(u32),

    #[error("header too short: {actual} < {expected} bytes")]
    HeaderTooShort { expected: usize, actual: usize },

    #[error("payload too large: {len} > {max} bytes")]
    PayloadTooLarge { len: u32, max: u32 },

    #[error("incomplete frame: got {actual} bytes, expected {expected}")]
    Incomplete { expected: usize, actual: usize },

    #[error("frame i/o: {0}")]
    Io(#[from] std::io::Error),
}
