//! Host/controller channel for TAS tooling over a local pipe.
//!
//! taslink connects a game-side agent (the host) and an external editor
//! process (the controller) over a local duplex pipe, with message
//! framing, priority-aware sending, automatic reconnection and a typed
//! payload codec.
//!
//! # Crate Structure
//!
//! - [`transport`] — The duplex pipe (bind/accept/connect, timeouts)
//! - [`codec`] — Static-dispatch value codec for payloads
//! - [`frame`] — Frame format, kind registry, priority send queue
//! - [`link`] — Connection lifecycle, handshake and the [`Channel`] API
//!
//! [`Channel`]: link::Channel

/// Re-export transport types.
pub mod transport {
    pub use taslink_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use taslink_codec::*;
}

/// Re-export frame types.
pub mod frame {
    pub use taslink_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use taslink_link::*;
}
