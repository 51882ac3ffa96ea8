//! Connection lifecycle and collaborator API for the host↔controller
//! channel.
//!
//! One worker thread per peer owns the transport: it establishes the
//! connection (retrying forever while the other process is absent), runs
//! the handshake, then shuttles frames in both directions — draining the
//! priority send queue, dispatching inbound messages to registered
//! handlers, confirming guaranteed sends, and watching the keepalive.
//! Any protocol violation or transport failure resets the channel back to
//! `Disconnected` and the cycle starts over; collaborators only notice if
//! they ask.

pub mod ack;
pub mod channel;
pub mod error;
pub mod handshake;
pub mod messages;
pub mod state;
pub mod worker;

pub use channel::{Channel, ChannelStatus, LinkConfig};
pub use error::{LinkError, Result};
pub use handshake::{handshake_controller, handshake_host, HandshakeConfig, HandshakeOutcome};
pub use messages::{
    DataRequest, GameDataKind, HotkeyBinding, HotkeyId, HotkeyPress, KeyBindings, LineUpdate,
    StateSnapshot,
};
pub use state::{ConnState, SessionState};
