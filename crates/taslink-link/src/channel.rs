//! The collaborator-facing channel handle.
//!
//! Collaborators never see raw bytes: they register typed handlers per
//! message kind, send typed values, and ask whether the channel is
//! established. Everything else — reconnection, priorities, keepalive,
//! confirmation — happens on the worker thread behind this handle.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use taslink_codec::{decode_value, encode_value, WireValue};
use taslink_frame::{Frame, MessageKind, DEFAULT_MAX_PAYLOAD, DEFAULT_QUEUE_CAPACITY};
use taslink_transport::{default_pipe_path, PipeListener};
use tracing::{debug, trace};

use crate::ack::{AckFailure, AckWaiter};
use crate::error::{LinkError, Result};
use crate::messages::KeyBindings;
use crate::state::ConnState;
use crate::worker::{Command, Handler, Role, Shared, Worker};

/// Tunables for one channel endpoint.
///
/// Defaults: a ~60 Hz worker cadence, a one-second keepalive and three
/// seconds of silence before assuming the peer is gone.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// The well-known pipe path both peers agree on.
    pub pipe_path: PathBuf,
    /// Local protocol version, `<major>.<minor>`.
    pub protocol_version: String,
    /// Deadline for each handshake step.
    pub handshake_timeout: Duration,
    /// Deadline for a guaranteed send to be confirmed.
    pub ack_timeout: Duration,
    /// Keepalive interval. Must stay below `idle_timeout`.
    pub ping_interval: Duration,
    /// Reset after this much inbound silence.
    pub idle_timeout: Duration,
    /// Read timeout of one worker pass; also paces the loop.
    pub poll_timeout: Duration,
    /// Give up on a stream write stalled this long (peer not draining).
    pub write_timeout: Duration,
    /// How long the host listens per accept attempt before checking for
    /// shutdown.
    pub accept_poll: Duration,
    /// Pause between reconnect attempts.
    pub reconnect_backoff: Duration,
    /// Report "peer unavailable" after this many consecutive failures.
    pub unavailable_after: u32,
    /// Maximum frame payload size.
    pub max_payload_size: usize,
    /// Send queue byte budget.
    pub queue_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            pipe_path: default_pipe_path(),
            protocol_version: "1.0".to_string(),
            handshake_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(2),
            ping_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(3),
            poll_timeout: Duration::from_millis(10),
            write_timeout: Duration::from_secs(2),
            accept_poll: Duration::from_millis(200),
            reconnect_backoff: Duration::from_millis(100),
            unavailable_after: 50,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Collaborator-visible channel condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Disconnected,
    AwaitingPeer,
    Handshaking,
    Established,
    /// Reconnection keeps failing; the peer process is probably gone.
    /// The worker keeps retrying regardless.
    PeerUnavailable,
    /// A fatal fault stopped the worker (peer contract mismatch).
    Failed,
}

/// One endpoint of the host↔controller channel.
///
/// Dropping the channel shuts the worker down and joins it.
pub struct Channel {
    commands: Sender<Command>,
    shared: Arc<Shared>,
    config: LinkConfig,
    worker: Option<JoinHandle<()>>,
}

impl Channel {
    /// Start the host end: bind the well-known pipe and wait for a
    /// controller. `bindings` are handed over during every handshake.
    pub fn host(config: LinkConfig, bindings: KeyBindings) -> Result<Self> {
        let listener = PipeListener::bind(&config.pipe_path)?;
        Self::spawn(Role::Host { listener, bindings }, config)
    }

    /// Start the controller end: connect to the host's pipe, retrying
    /// until it comes up. `session_path` is announced during every
    /// handshake.
    pub fn connect(config: LinkConfig, session_path: impl Into<String>) -> Result<Self> {
        Self::spawn(
            Role::Controller {
                session_path: session_path.into(),
            },
            config,
        )
    }

    fn spawn(role: Role, config: LinkConfig) -> Result<Self> {
        let shared = Arc::new(Shared::new());
        let (tx, rx) = mpsc::channel();

        let worker = Worker::new(role, config.clone(), Arc::clone(&shared), rx);
        let handle = std::thread::Builder::new()
            .name("taslink-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|err| LinkError::Transport(err.into()))?;

        Ok(Self {
            commands: tx,
            shared,
            config,
            worker: Some(handle),
        })
    }

    /// Register the handler for a message kind. The callback runs on the
    /// worker thread with the already-decoded value; a previous handler
    /// for the same kind is replaced.
    pub fn register_handler<T, F>(&self, kind: MessageKind, handler: F)
    where
        T: WireValue,
        F: Fn(T) + Send + 'static,
    {
        let wrapped: Handler = Box::new(move |payload| {
            let value = decode_value::<T>(payload)?;
            handler(value);
            Ok(())
        });
        if self.shared.handlers().insert(kind, wrapped).is_some() {
            debug!(kind = %kind, "handler replaced");
        }
    }

    /// Best-effort send. Returns without waiting; silently dropped when
    /// the channel is not established (used for frequently-repeated
    /// state broadcasts where staleness is harmless).
    pub fn send<T: WireValue>(&self, kind: MessageKind, value: &T) -> Result<()> {
        let payload = encode_value(value)?;
        if !self.is_established() {
            trace!(kind = %kind, "dropping send; channel not established");
            return Ok(());
        }
        self.commands
            .send(Command::Send(Frame::new(kind, payload)))
            .map_err(|_| LinkError::Closed)
    }

    /// Guaranteed send: blocks until the peer confirms receipt or the
    /// ack deadline passes. A timeout resets the channel and surfaces
    /// here as an error.
    pub fn send_guaranteed<T: WireValue>(&self, kind: MessageKind, value: &T) -> Result<()> {
        if !kind.needs_confirm() {
            return Err(LinkError::NotConfirmable(kind));
        }
        let payload = encode_value(value)?;
        if !self.is_established() {
            return Err(LinkError::NotEstablished);
        }

        let waiter = Arc::new(AckWaiter::new());
        self.commands
            .send(Command::SendGuaranteed(
                Frame::new(kind, payload),
                Arc::clone(&waiter),
            ))
            .map_err(|_| LinkError::Closed)?;

        // The worker's own deadline fires first on a live channel; the
        // cap only guards against a wedged worker.
        let cap = self.config.ack_timeout.saturating_mul(3);
        match waiter.wait(cap) {
            Ok(()) => Ok(()),
            Err(AckFailure::TimedOut) => Err(LinkError::AckTimeout(kind)),
            Err(AckFailure::Reset) => Err(LinkError::NotEstablished),
            Err(AckFailure::Closed) => Err(LinkError::Closed),
            Err(AckFailure::QueueFull) => Err(LinkError::SendQueueFull),
        }
    }

    /// Whether application messages currently flow.
    pub fn is_established(&self) -> bool {
        self.shared.state.load() == ConnState::Established
    }

    /// Current channel condition.
    pub fn status(&self) -> ChannelStatus {
        if self.shared.failed.load(Ordering::Acquire) {
            return ChannelStatus::Failed;
        }
        let state = self.shared.state.load();
        if state != ConnState::Established
            && self.shared.consecutive_failures.load(Ordering::Acquire) >= self.config.unavailable_after
        {
            return ChannelStatus::PeerUnavailable;
        }
        match state {
            ConnState::Disconnected => ChannelStatus::Disconnected,
            ConnState::AwaitingPeer => ChannelStatus::AwaitingPeer,
            ConnState::Handshaking => ChannelStatus::Handshaking,
            ConnState::Established => ChannelStatus::Established,
        }
    }

    /// Stop the worker and wait for it to exit.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("status", &self.status())
            .finish()
    }
}
