//! The dedicated transport worker.
//!
//! Exactly one worker thread owns the transport and the send queue. Each
//! pass it (a) runs the reconnection path while disconnected, (b) polls
//! inbound bytes and dispatches complete frames, (c) enforces the ack
//! deadline and the idle timeout, (d) drains collaborator commands into
//! the queue, (e) writes queued frames unless gated by a pending ack or a
//! peer `Wait`, and (f) sends a keepalive ping when the line is quiet.
//!
//! Faults are explicit values, not unwinding: a `Fault::Reset` tears the
//! session down and re-enters the reconnect loop; a `Fault::Fatal`
//! (codec/contract mismatch) stops the worker for good.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use taslink_codec::{encode_value, CodecError};
use taslink_frame::{Frame, FrameConfig, FrameReader, FrameWriter, MessageKind, SendQueue};
use taslink_transport::{PipeListener, PipeStream};
use tracing::{debug, error, info, trace, warn};

use crate::ack::{AckFailure, AckWaiter, PendingAck};
use crate::channel::LinkConfig;
use crate::error::{Fault, LinkError, Result};
use crate::handshake::{
    handshake_controller, handshake_host, read_first_contact, HandshakeConfig,
};
use crate::messages::KeyBindings;
use crate::state::{ConnState, SessionState, StateCell};

/// Decoded-payload dispatcher registered per message kind.
pub(crate) type Handler = Box<dyn Fn(&[u8]) -> std::result::Result<(), CodecError> + Send>;

/// Requests from collaborator threads to the worker.
pub(crate) enum Command {
    Send(Frame),
    SendGuaranteed(Frame, Arc<AckWaiter>),
    Shutdown,
}

/// State shared between the worker and collaborator threads.
pub(crate) struct Shared {
    pub state: StateCell,
    pub failed: AtomicBool,
    pub consecutive_failures: AtomicU32,
    pub handlers: Mutex<HashMap<MessageKind, Handler>>,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            failed: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn handlers(&self) -> std::sync::MutexGuard<'_, HashMap<MessageKind, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Which end of the channel this worker drives.
pub(crate) enum Role {
    Host {
        listener: PipeListener,
        bindings: KeyBindings,
    },
    Controller {
        session_path: String,
    },
}

impl Role {
    fn name(&self) -> &'static str {
        match self {
            Role::Host { .. } => "host",
            Role::Controller { .. } => "controller",
        }
    }
}

enum Exit {
    Shutdown,
    Reset(LinkError),
    Fatal(LinkError),
}

pub(crate) struct Worker {
    role: Role,
    config: LinkConfig,
    shared: Arc<Shared>,
    commands: Receiver<Command>,
}

impl Worker {
    pub fn new(
        role: Role,
        config: LinkConfig,
        shared: Arc<Shared>,
        commands: Receiver<Command>,
    ) -> Self {
        Self {
            role,
            config,
            shared,
            commands,
        }
    }

    /// Run until shutdown or a fatal fault. Reconnects forever otherwise:
    /// the remote process may simply not have (re)started yet.
    pub fn run(self) {
        info!(role = self.role.name(), "channel worker started");
        loop {
            self.shared.state.store(ConnState::Disconnected);

            let stream = match self.open_transport() {
                Ok(Some(stream)) => stream,
                Ok(None) => {
                    debug!("shutdown while disconnected");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "transport open failed");
                    self.note_failure();
                    std::thread::sleep(self.config.reconnect_backoff);
                    continue;
                }
            };

            let mut session = SessionState::new();
            session.transport_opened();
            self.shared.state.store(ConnState::AwaitingPeer);

            match self.establish(stream, &mut session) {
                Ok((reader, writer)) => {
                    self.shared.state.store(ConnState::Established);
                    self.shared.consecutive_failures.store(0, Ordering::Release);
                    info!(role = self.role.name(), "channel established");

                    match self.serve(reader, writer) {
                        Exit::Shutdown => {
                            debug!("shutdown while established");
                            return;
                        }
                        Exit::Reset(err) => {
                            warn!(error = %err, "channel reset");
                            self.note_failure();
                            std::thread::sleep(self.config.reconnect_backoff);
                        }
                        Exit::Fatal(err) => {
                            error!(error = %err, "unrecoverable channel fault");
                            self.shared.failed.store(true, Ordering::Release);
                            self.shared.state.store(ConnState::Disconnected);
                            self.fail_queued_commands(AckFailure::Closed);
                            return;
                        }
                    }
                }
                Err(err) => {
                    debug!(error = %err, "handshake failed");
                    self.note_failure();
                    std::thread::sleep(self.config.reconnect_backoff);
                }
            }
        }
    }

    /// Block until a transport is available, a shutdown arrives (`None`),
    /// or the transport layer errors.
    fn open_transport(&self) -> Result<Option<PipeStream>> {
        match &self.role {
            Role::Host { listener, .. } => loop {
                if self.drain_disconnected_commands() {
                    return Ok(None);
                }
                if let Some(stream) = listener.accept_timeout(self.config.accept_poll)? {
                    return Ok(Some(stream));
                }
            },
            Role::Controller { .. } => loop {
                if self.drain_disconnected_commands() {
                    return Ok(None);
                }
                match PipeListener::connect(&self.config.pipe_path) {
                    Ok(stream) => return Ok(Some(stream)),
                    Err(err) => {
                        // The host is just not up yet; keep retrying.
                        trace!(error = %err, "host not reachable");
                        self.note_failure();
                        std::thread::sleep(self.config.reconnect_backoff);
                    }
                }
            },
        }
    }

    /// Run the handshake over a fresh stream.
    fn establish(
        &self,
        stream: PipeStream,
        session: &mut SessionState,
    ) -> Result<(FrameReader<PipeStream>, FrameWriter<PipeStream>)> {
        let reader_stream = stream.try_clone()?;

        let frame_config = FrameConfig {
            max_payload_size: self.config.max_payload_size,
            read_timeout: Some(self.config.poll_timeout),
            write_timeout: Some(self.config.write_timeout),
        };
        let mut reader = FrameReader::with_config_pipe(reader_stream, frame_config.clone())?;
        let mut writer = FrameWriter::with_config_pipe(stream, frame_config)?;

        let handshake_config = HandshakeConfig {
            step_timeout: self.config.handshake_timeout,
            protocol_version: self.config.protocol_version.clone(),
            ..HandshakeConfig::default()
        };

        match &self.role {
            Role::Host { bindings, .. } => {
                let first = read_first_contact(&mut reader, handshake_config.step_timeout)?;
                session.first_contact();
                self.shared.state.store(ConnState::Handshaking);
                handshake_host(&mut reader, &mut writer, first, bindings, &handshake_config)?;
            }
            Role::Controller { session_path } => {
                session.first_contact();
                self.shared.state.store(ConnState::Handshaking);
                handshake_controller(&mut reader, &mut writer, session_path, &handshake_config)?;
            }
        }

        session.established();
        Ok((reader, writer))
    }

    /// The established-phase loop. Returns how the session ended; the
    /// send queue and any pending ack die with it.
    fn serve(
        &self,
        mut reader: FrameReader<PipeStream>,
        mut writer: FrameWriter<PipeStream>,
    ) -> Exit {
        let mut queue = SendQueue::with_capacity(self.config.queue_capacity);
        let mut pending_ack: Option<PendingAck> = None;
        let mut waiting_guaranteed: VecDeque<(Frame, Arc<AckWaiter>)> = VecDeque::new();
        let mut peer_waiting = false;

        let start = Instant::now();
        let mut last_recv = start;
        let mut last_write = start;

        // Frames dispatched per pass before giving writes a turn.
        const MAX_DISPATCH_PER_PASS: usize = 16;

        let exit = 'serve: loop {
            for _ in 0..MAX_DISPATCH_PER_PASS {
                match reader.poll_frame() {
                    Ok(Some(frame)) => {
                        last_recv = Instant::now();
                        peer_waiting = false;
                        if let Err(fault) = self.dispatch(
                            frame,
                            &mut queue,
                            &mut pending_ack,
                            &mut peer_waiting,
                        ) {
                            match fault {
                                Fault::Reset(err) => break 'serve Exit::Reset(err),
                                Fault::Fatal(err) => break 'serve Exit::Fatal(err),
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => break 'serve Exit::Reset(err.into()),
                }
            }

            if last_recv.elapsed() > self.config.idle_timeout {
                break Exit::Reset(LinkError::IdleTimeout(self.config.idle_timeout));
            }

            if let Some(ack) = pending_ack.take_if(|ack| Instant::now() >= ack.deadline) {
                ack.waiter.fail(AckFailure::TimedOut);
                break Exit::Reset(LinkError::AckTimeout(ack.kind));
            }

            loop {
                match self.commands.try_recv() {
                    Ok(Command::Send(frame)) => {
                        if let Err(err) = queue.enqueue(frame) {
                            // Best-effort traffic; staleness is harmless.
                            warn!(error = %err, "dropping best-effort message");
                        }
                    }
                    Ok(Command::SendGuaranteed(frame, waiter)) => {
                        waiting_guaranteed.push_back((frame, waiter));
                    }
                    Ok(Command::Shutdown) => break 'serve Exit::Shutdown,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'serve Exit::Shutdown,
                }
            }

            // One guaranteed send in flight at a time.
            if pending_ack.is_none() {
                if let Some((frame, waiter)) = waiting_guaranteed.pop_front() {
                    let kind = frame.kind;
                    match queue.enqueue(frame) {
                        Ok(()) => {
                            pending_ack = Some(PendingAck {
                                kind,
                                deadline: Instant::now() + self.config.ack_timeout,
                                frame_sent: false,
                                waiter,
                            });
                        }
                        Err(err) => {
                            warn!(error = %err, kind = %kind, "guaranteed send rejected");
                            waiter.fail(AckFailure::QueueFull);
                        }
                    }
                }
            }

            loop {
                let Some(kind) = queue.front().map(|frame| frame.kind) else {
                    break;
                };
                let allowed = match &pending_ack {
                    // Frames queued ahead of the pending one still flush,
                    // and so does the pending frame itself; after that,
                    // only confirmations until the ack arrives.
                    Some(ack) => !ack.frame_sent || kind == MessageKind::Confirm,
                    None => true,
                } && (!peer_waiting || kind.is_high_priority());
                if !allowed {
                    break;
                }

                let Some(frame) = queue.pop_front() else {
                    break;
                };
                if frame.kind.is_chatty() {
                    trace!(kind = %frame.kind, len = frame.payload.len(), "sending");
                } else {
                    debug!(kind = %frame.kind, len = frame.payload.len(), "sending");
                }
                if let Err(err) = writer.write_frame(&frame) {
                    break 'serve Exit::Reset(err.into());
                }
                last_write = Instant::now();
                if let Some(ack) = &mut pending_ack {
                    if !ack.frame_sent && frame.kind == ack.kind {
                        ack.frame_sent = true;
                    }
                }
            }

            // Keepalive, only when nothing else is flowing.
            if queue.is_empty() && last_write.elapsed() > self.config.ping_interval {
                if let Err(err) = send_unit(&mut writer, MessageKind::Ping) {
                    break Exit::Reset(err);
                }
                last_write = Instant::now();
            }
        };

        let failure = match &exit {
            Exit::Shutdown => AckFailure::Closed,
            Exit::Reset(_) | Exit::Fatal(_) => AckFailure::Reset,
        };
        if let Some(ack) = pending_ack.take() {
            ack.waiter.fail(failure);
        }
        for (_, waiter) in waiting_guaranteed.drain(..) {
            waiter.fail(failure);
        }

        if matches!(exit, Exit::Reset(_)) {
            // Best-effort courtesy: the peer resets faster when told.
            let _ = send_unit(&mut writer, MessageKind::Reset);
        }

        exit
    }

    /// Handle one inbound frame.
    fn dispatch(
        &self,
        frame: Frame,
        queue: &mut SendQueue,
        pending_ack: &mut Option<PendingAck>,
        peer_waiting: &mut bool,
    ) -> std::result::Result<(), Fault> {
        if frame.kind.is_chatty() {
            trace!(kind = %frame.kind, len = frame.payload.len(), "received");
        } else {
            debug!(kind = %frame.kind, len = frame.payload.len(), "received");
        }

        match frame.kind {
            MessageKind::Ping => Ok(()),
            MessageKind::Wait => {
                *peer_waiting = true;
                Ok(())
            }
            MessageKind::Reset => Err(Fault::Reset(LinkError::PeerReset)),
            MessageKind::Establish => Err(Fault::Reset(LinkError::Protocol(
                "handshake message received mid-session".to_string(),
            ))),
            MessageKind::Confirm => {
                let confirmed = taslink_codec::decode_value::<u8>(&frame.payload).map_err(|_| {
                    Fault::Reset(LinkError::Protocol("malformed confirm payload".to_string()))
                })?;
                match pending_ack.take() {
                    Some(ack) if ack.kind as u8 == confirmed => {
                        trace!(kind = %ack.kind, "guaranteed send confirmed");
                        ack.waiter.confirm();
                        Ok(())
                    }
                    Some(ack) => {
                        ack.waiter.fail(AckFailure::Reset);
                        Err(Fault::Reset(LinkError::Protocol(format!(
                            "confirm for {confirmed:#04x} while awaiting {}",
                            ack.kind
                        ))))
                    }
                    None => Err(Fault::Reset(LinkError::Protocol(
                        "confirm with no send pending".to_string(),
                    ))),
                }
            }
            kind => {
                if kind.needs_confirm() {
                    let payload = encode_value(&(kind as u8))
                        .map_err(|err| Fault::Fatal(LinkError::Codec(err)))?;
                    queue
                        .enqueue(Frame::new(MessageKind::Confirm, payload))
                        .map_err(|err| Fault::Reset(LinkError::Frame(err)))?;
                }

                let handlers = self.shared.handlers();
                if let Some(handler) = handlers.get(&kind) {
                    // A decode failure here is a contract mismatch
                    // between peer versions; reconnecting cannot fix it.
                    handler(&frame.payload)
                        .map_err(|err| Fault::Fatal(LinkError::Codec(err)))?;
                } else {
                    debug!(kind = %kind, "no handler registered; dropping message");
                }
                Ok(())
            }
        }
    }

    /// Drain commands while no session is up. Returns true on shutdown.
    fn drain_disconnected_commands(&self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Send(frame)) => {
                    trace!(kind = %frame.kind, "dropping message while disconnected");
                }
                Ok(Command::SendGuaranteed(_, waiter)) => {
                    waiter.fail(AckFailure::Reset);
                }
                Ok(Command::Shutdown) => return true,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    /// Fail every queued guaranteed send after a fatal fault.
    fn fail_queued_commands(&self, failure: AckFailure) {
        while let Ok(command) = self.commands.try_recv() {
            if let Command::SendGuaranteed(_, waiter) = command {
                waiter.fail(failure);
            }
        }
    }

    fn note_failure(&self) {
        self.shared
            .consecutive_failures
            .fetch_add(1, Ordering::AcqRel);
    }
}

fn send_unit(writer: &mut FrameWriter<PipeStream>, kind: MessageKind) -> Result<()> {
    let payload = encode_value(&())?;
    writer.send(kind, &payload)?;
    Ok(())
}
