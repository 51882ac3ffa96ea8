/// Errors that can occur during frame encoding/decoding and queueing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The kind byte is not in the registry.
    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),

    /// A zero-length payload was passed to the encoder. Length 0 is the
    /// "empty slot" sentinel; unit payloads carry an explicit marker byte.
    #[error("refusing to encode zero-length payload (reserved sentinel)")]
    EmptyPayload,

    /// A decoded frame declared a zero payload length.
    #[error("frame for kind {0:#04x} declares sentinel length 0")]
    SentinelLength(u8),

    /// A sentinel byte appeared at the head of stream data.
    #[error("sentinel byte in stream where a frame was expected")]
    StraySentinel,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload length varint is malformed.
    #[error("malformed payload length: {0}")]
    BadLength(#[from] taslink_codec::CodecError),

    /// The send queue byte budget is exhausted.
    #[error("send queue full ({queued} bytes queued, capacity {capacity})")]
    QueueFull { queued: usize, capacity: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
