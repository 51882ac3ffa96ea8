use taslink_frame::MessageKind;

/// Errors surfaced by the channel layer.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] taslink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] taslink_frame::FrameError),

    /// Payload codec error. This is a contract mismatch between the two
    /// peers (different versions expecting different payload shapes);
    /// reconnecting cannot fix it, so it is fatal to the channel.
    #[error("codec error: {0}")]
    Codec(#[from] taslink_codec::CodecError),

    /// The handshake sequence was violated.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A handshake step did not complete in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// The peer requested a reset.
    #[error("peer requested channel reset")]
    PeerReset,

    /// Nothing received from the peer within the idle timeout.
    #[error("peer silent for longer than {0:?}")]
    IdleTimeout(std::time::Duration),

    /// A guaranteed send was not confirmed before its deadline.
    #[error("no confirmation for {0} before deadline")]
    AckTimeout(MessageKind),

    /// A protocol rule was violated mid-session.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The kind is not flagged for confirmation, so a guaranteed send
    /// would wait forever.
    #[error("{0} does not require confirmation; use send instead")]
    NotConfirmable(MessageKind),

    /// Guaranteed sends require an established channel.
    #[error("channel is not established")]
    NotEstablished,

    /// The send queue had no room for a guaranteed frame.
    #[error("send queue full")]
    SendQueueFull,

    /// The peer has not been reachable across repeated reconnect cycles.
    #[error("peer unavailable")]
    PeerUnavailable,

    /// The channel worker has stopped.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// How the worker loop reacts to an error: tear down and reconnect, or
/// stop for good. Explicit control flow instead of unwinding.
#[derive(Debug)]
pub(crate) enum Fault {
    /// Recoverable: reset the channel and re-establish.
    Reset(LinkError),
    /// Unrecoverable: the channel stays down.
    Fatal(LinkError),
}

impl From<LinkError> for Fault {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Codec(_) => Fault::Fatal(err),
            other => Fault::Reset(other),
        }
    }
}
