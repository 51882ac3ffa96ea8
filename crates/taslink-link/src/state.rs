//! The connection lifecycle state machine.
//!
//! `Disconnected → AwaitingPeer → Handshaking → Established`, with reset
//! back to `Disconnected` from anywhere. Transitions are driven by the
//! worker; collaborators observe the current state through an atomic.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of the channel.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No transport open.
    Disconnected = 0,
    /// Transport open, no bytes exchanged yet.
    AwaitingPeer = 1,
    /// The fixed handshake sequence is in progress.
    Handshaking = 2,
    /// Application messages flow freely.
    Established = 3,
}

impl ConnState {
    pub fn name(self) -> &'static str {
        match self {
            ConnState::Disconnected => "disconnected",
            ConnState::AwaitingPeer => "awaiting-peer",
            ConnState::Handshaking => "handshaking",
            ConnState::Established => "established",
        }
    }

    fn from_u8(value: u8) -> ConnState {
        match value {
            1 => ConnState::AwaitingPeer,
            2 => ConnState::Handshaking,
            3 => ConnState::Established,
            _ => ConnState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The worker-side state machine. Only legal forward transitions are
/// possible; `reset` is always legal.
#[derive(Debug)]
pub struct SessionState {
    current: ConnState,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            current: ConnState::Disconnected,
        }
    }

    pub fn current(&self) -> ConnState {
        self.current
    }

    /// `Disconnected → AwaitingPeer`: the transport has been opened.
    pub fn transport_opened(&mut self) -> bool {
        self.step(ConnState::Disconnected, ConnState::AwaitingPeer)
    }

    /// `AwaitingPeer → Handshaking`: first inbound contact.
    pub fn first_contact(&mut self) -> bool {
        self.step(ConnState::AwaitingPeer, ConnState::Handshaking)
    }

    /// `Handshaking → Established`: handshake sequence completed.
    pub fn established(&mut self) -> bool {
        self.step(ConnState::Handshaking, ConnState::Established)
    }

    /// Any state `→ Disconnected`: the channel is torn down.
    pub fn reset(&mut self) {
        self.current = ConnState::Disconnected;
    }

    fn step(&mut self, from: ConnState, to: ConnState) -> bool {
        if self.current == from {
            self.current = to;
            true
        } else {
            false
        }
    }
}

/// Lock-free mirror of the worker's state for collaborator threads.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ConnState::Disconnected as u8))
    }

    pub fn store(&self, state: ConnState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn load(&self) -> ConnState {
        ConnState::from_u8(self.0.load(Ordering::Acquire))
    }
}
