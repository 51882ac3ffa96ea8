/// Errors that can occur while encoding or decoding payload values.
///
/// A decode error always means the bytes on the wire do not match the
/// type the call site expected. That is a contract mismatch between the
/// two peers, not a transient transport condition; the link layer treats
/// it as fatal rather than as a reset.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload ended before the expected value was complete.
    #[error("payload truncated (needed {needed} more bytes, {available} available)")]
    UnexpectedEof { needed: usize, available: usize },

    /// A varint ran past its maximum encoded length.
    #[error("varint exceeds {0} bytes")]
    VarintTooLong(usize),

    /// A decoded length or count does not fit in memory bounds.
    #[error("declared length {0} exceeds remaining payload")]
    LengthOutOfBounds(u64),

    /// A marker byte held an unexpected value.
    #[error("unexpected marker byte {0:#04x}")]
    UnexpectedMarker(u8),

    /// A decoded scalar is not a valid Unicode code point.
    #[error("invalid char code point {0:#x}")]
    InvalidChar(u32),

    /// A decoded string is not valid UTF-8.
    #[error("invalid utf-8 in string payload: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A tuple arity on the wire does not match the expected type.
    #[error("tuple arity mismatch (expected {expected}, got {got})")]
    ArityMismatch { expected: usize, got: u64 },

    /// The structural serializer rejected a record blob.
    #[error("record codec error: {0}")]
    Record(#[from] postcard::Error),

    /// Bytes remained after the expected value was fully decoded.
    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;
