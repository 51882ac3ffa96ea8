//! The fixed connection handshake.
//!
//! Lockstep sequence, every step bounded by a deadline:
//!
//! 1. controller → `Establish { version }`
//! 2. host → `Establish { version }` (after checking compatibility)
//! 3. controller → `SessionPath { path }`
//! 4. host → `KeyBindings { bindings }`
//!
//! Any unexpected kind, malformed payload or expired deadline fails the
//! handshake; the worker resets and the whole sequence starts over.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use taslink_codec::{decode_value, encode_value, WireValue};
use taslink_frame::{Frame, FrameError, FrameReader, FrameWriter, MessageKind};
use tracing::debug;

use crate::error::{LinkError, Result};
use crate::messages::KeyBindings;

const MAX_VERSION_LEN: usize = 16;

/// Configuration for handshake negotiation.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Deadline for each individual handshake step.
    pub step_timeout: Duration,
    /// Local protocol version, `<major>.<minor>`.
    pub protocol_version: String,
    /// Maximum accepted payload size during the handshake. Tighter than
    /// the runtime limit: no legitimate handshake payload is large.
    pub max_handshake_payload: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(5),
            protocol_version: "1.0".to_string(),
            max_handshake_payload: 16 * 1024,
        }
    }
}

/// What a completed handshake learned about the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeOutcome {
    /// The peer's protocol version.
    pub peer_version: String,
    /// The controller's current session file (host side only).
    pub session_path: Option<String>,
    /// The host's current hotkey bindings (controller side only).
    pub bindings: Option<KeyBindings>,
}

/// Wait for the first frame from a newly-connected controller.
///
/// The host worker calls this while still in `AwaitingPeer`; the frame
/// is then handed to [`handshake_host`] as the first handshake step.
pub fn read_first_contact<R: Read>(
    reader: &mut FrameReader<R>,
    timeout: Duration,
) -> Result<Frame> {
    recv_any(reader, timeout, usize::MAX)
}

/// Perform the host side of the handshake.
///
/// `first` is the frame that moved the connection out of `AwaitingPeer`;
/// it must be the controller's `Establish`.
pub fn handshake_host<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    first: Frame,
    bindings: &KeyBindings,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome> {
    validate_version(&config.protocol_version)?;

    if first.kind != MessageKind::Establish {
        return Err(LinkError::HandshakeFailed(format!(
            "expected Establish, got {}",
            first.kind
        )));
    }
    if first.payload.len() > config.max_handshake_payload {
        return Err(oversized(first.payload.len(), config.max_handshake_payload));
    }
    let peer_version: String = decode_handshake(&first.payload)?;
    check_version(&peer_version, &config.protocol_version)?;

    send_value(writer, MessageKind::Establish, &config.protocol_version)?;

    let path_frame = recv_step(reader, MessageKind::SessionPath, config)?;
    let session_path: String = decode_handshake(&path_frame.payload)?;

    send_value(writer, MessageKind::KeyBindings, bindings)?;

    debug!(version = %peer_version, path = %session_path, "host handshake complete");
    Ok(HandshakeOutcome {
        peer_version,
        session_path: Some(session_path),
        bindings: None,
    })
}

/// Perform the controller side of the handshake.
pub fn handshake_controller<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    session_path: &str,
    config: &HandshakeConfig,
) -> Result<HandshakeOutcome> {
    validate_version(&config.protocol_version)?;

    send_value(writer, MessageKind::Establish, &config.protocol_version)?;

    let reply = recv_step(reader, MessageKind::Establish, config)?;
    let peer_version: String = decode_handshake(&reply.payload)?;
    check_version(&peer_version, &config.protocol_version)?;

    send_value(writer, MessageKind::SessionPath, &session_path.to_owned())?;

    let bindings_frame = recv_step(reader, MessageKind::KeyBindings, config)?;
    let bindings: KeyBindings = decode_handshake(&bindings_frame.payload)?;

    debug!(version = %peer_version, "controller handshake complete");
    Ok(HandshakeOutcome {
        peer_version,
        session_path: None,
        bindings: Some(bindings),
    })
}

fn send_value<T: WireValue, W: Write>(
    writer: &mut FrameWriter<W>,
    kind: MessageKind,
    value: &T,
) -> Result<()> {
    let payload = encode_value(value)
        .map_err(|err| LinkError::HandshakeFailed(format!("encoding {kind}: {err}")))?;
    writer.send(kind, &payload)?;
    Ok(())
}

/// A handshake payload that does not decode is a protocol violation of
/// this handshake attempt, not a fatal contract mismatch: a stale peer
/// from before a restart may be mid-write. Reset and retry.
fn decode_handshake<T: WireValue>(payload: &[u8]) -> Result<T> {
    decode_value(payload)
        .map_err(|err| LinkError::HandshakeFailed(format!("malformed payload: {err}")))
}

fn recv_step<R: Read>(
    reader: &mut FrameReader<R>,
    expect: MessageKind,
    config: &HandshakeConfig,
) -> Result<Frame> {
    let frame = recv_any(reader, config.step_timeout, config.max_handshake_payload)?;
    if frame.kind != expect {
        return Err(LinkError::HandshakeFailed(format!(
            "expected {expect}, got {}",
            frame.kind
        )));
    }
    Ok(frame)
}

fn recv_any<R: Read>(
    reader: &mut FrameReader<R>,
    timeout: Duration,
    max_payload: usize,
) -> Result<Frame> {
    let deadline = Instant::now() + timeout;
    loop {
        match reader.read_frame() {
            Ok(frame) => {
                if frame.payload.len() > max_payload {
                    return Err(oversized(frame.payload.len(), max_payload));
                }
                return Ok(frame);
            }
            Err(FrameError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                if Instant::now() >= deadline {
                    return Err(LinkError::HandshakeTimeout(timeout));
                }
            }
            Err(FrameError::ConnectionClosed) => {
                return Err(LinkError::HandshakeFailed(
                    "connection closed during handshake".to_string(),
                ));
            }
            Err(err) => return Err(LinkError::Frame(err)),
        }
    }
}

fn oversized(size: usize, max: usize) -> LinkError {
    LinkError::HandshakeFailed(format!("handshake payload too large: {size} (max {max})"))
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(LinkError::HandshakeFailed(format!(
            "invalid protocol version length: {}",
            version.len()
        )));
    }
    let _ = parse_version(version)?;
    Ok(())
}

fn check_version(peer: &str, local: &str) -> Result<()> {
    let (peer_major, peer_minor) = parse_version(peer)?;
    let (local_major, local_minor) = parse_version(local)?;

    if peer_major != local_major {
        return Err(LinkError::HandshakeFailed(format!(
            "incompatible version '{peer}' (local '{local}')"
        )));
    }
    if peer_minor != local_minor {
        debug!(%peer, %local, "minor version difference");
    }
    Ok(())
}

fn parse_version(version: &str) -> Result<(u16, u16)> {
    let mut parts = version.split('.');

    let major = parts.next().ok_or_else(|| {
        LinkError::HandshakeFailed(format!("invalid version '{version}': missing major"))
    })?;
    let minor = parts.next().ok_or_else(|| {
        LinkError::HandshakeFailed(format!("invalid version '{version}': missing minor"))
    })?;

    if parts.next().is_some() {
        return Err(LinkError::HandshakeFailed(format!(
            "invalid version '{version}': expected '<major>.<minor>'"
        )));
    }

    let major = major.parse::<u16>().map_err(|_| {
        LinkError::HandshakeFailed(format!("invalid version '{version}': non-numeric major"))
    })?;
    let minor = minor.parse::<u16>().map_err(|_| {
        LinkError::HandshakeFailed(format!("invalid version '{version}': non-numeric minor"))
    })?;

    Ok((major, minor))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::os::unix::net::UnixStream;
    use std::thread;

    use super::*;
    use crate::messages::{HotkeyBinding, HotkeyId};

    fn test_bindings() -> KeyBindings {
        KeyBindings {
            bindings: vec![HotkeyBinding {
                hotkey: HotkeyId::FrameAdvance,
                keys: vec![102],
            }],
        }
    }

    fn host_over(
        stream: UnixStream,
        config: HandshakeConfig,
    ) -> thread::JoinHandle<Result<HandshakeOutcome>> {
        thread::spawn(move || {
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            let mut writer = FrameWriter::new(stream);
            let first = read_first_contact(&mut reader, config.step_timeout)?;
            handshake_host(&mut reader, &mut writer, first, &test_bindings(), &config)
        })
    }

    #[test]
    fn successful_handshake() {
        let (host_stream, controller_stream) = UnixStream::pair().unwrap();
        let host = host_over(host_stream, HandshakeConfig::default());

        let mut reader = FrameReader::new(controller_stream.try_clone().unwrap());
        let mut writer = FrameWriter::new(controller_stream);
        let controller_outcome = handshake_controller(
            &mut reader,
            &mut writer,
            "/maps/city.tas",
            &HandshakeConfig::default(),
        )
        .unwrap();
        let host_outcome = host.join().unwrap().unwrap();

        assert_eq!(host_outcome.peer_version, "1.0");
        assert_eq!(host_outcome.session_path.as_deref(), Some("/maps/city.tas"));
        assert_eq!(controller_outcome.bindings, Some(test_bindings()));
        assert!(controller_outcome.session_path.is_none());
    }

    #[test]
    fn wrong_first_kind_rejected() {
        let (host_stream, controller_stream) = UnixStream::pair().unwrap();
        let host = host_over(host_stream, HandshakeConfig::default());

        // A stale peer starts with a state broadcast instead of Establish.
        let mut writer = FrameWriter::new(controller_stream);
        writer.send(MessageKind::StateSnapshot, &[1u8, 2, 3]).unwrap();

        let result = host.join().unwrap();
        assert!(matches!(result, Err(LinkError::HandshakeFailed(_))));
    }

    #[test]
    fn major_version_mismatch_rejected() {
        let (host_stream, controller_stream) = UnixStream::pair().unwrap();
        let host = host_over(host_stream, HandshakeConfig::default());

        let mut reader = FrameReader::new(controller_stream.try_clone().unwrap());
        let mut writer = FrameWriter::new(controller_stream);
        let config = HandshakeConfig {
            protocol_version: "2.0".to_string(),
            ..HandshakeConfig::default()
        };
        let result = handshake_controller(&mut reader, &mut writer, "a.tas", &config);

        // The host rejects; the controller sees either the rejection or
        // the closed stream, depending on timing.
        assert!(result.is_err());
        assert!(matches!(
            host.join().unwrap(),
            Err(LinkError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn minor_version_difference_tolerated() {
        let (host_stream, controller_stream) = UnixStream::pair().unwrap();
        let host = host_over(host_stream, HandshakeConfig::default());

        let mut reader = FrameReader::new(controller_stream.try_clone().unwrap());
        let mut writer = FrameWriter::new(controller_stream);
        let config = HandshakeConfig {
            protocol_version: "1.3".to_string(),
            ..HandshakeConfig::default()
        };
        let outcome = handshake_controller(&mut reader, &mut writer, "a.tas", &config).unwrap();

        assert_eq!(outcome.peer_version, "1.0");
        assert!(host.join().unwrap().is_ok());
    }

    #[test]
    fn handshake_step_times_out() {
        struct AlwaysTimedOut;

        impl Read for AlwaysTimedOut {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::TimedOut))
            }
        }

        let mut reader = FrameReader::new(AlwaysTimedOut);
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let config = HandshakeConfig {
            step_timeout: Duration::from_millis(25),
            ..HandshakeConfig::default()
        };

        let result = handshake_controller(&mut reader, &mut writer, "a.tas", &config);
        assert!(matches!(result, Err(LinkError::HandshakeTimeout(_))));
    }

    #[test]
    fn peer_exit_mid_handshake_fails_cleanly() {
        let (host_stream, controller_stream) = UnixStream::pair().unwrap();
        let host = host_over(host_stream, HandshakeConfig::default());

        // Controller sends the hello, then dies before SendPath.
        {
            let mut writer = FrameWriter::new(controller_stream);
            let payload = encode_value(&"1.0".to_string()).unwrap();
            writer.send(MessageKind::Establish, &payload).unwrap();
        }

        // Depending on timing the host fails on the missing SessionPath
        // step or on writing into the closed stream; both reset.
        assert!(host.join().unwrap().is_err());
    }

    #[test]
    fn malformed_version_payload_rejected() {
        let (host_stream, controller_stream) = UnixStream::pair().unwrap();
        let host = host_over(host_stream, HandshakeConfig::default());

        // Raw garbage where a version string belongs.
        let mut writer = FrameWriter::new(controller_stream);
        writer
            .send(MessageKind::Establish, &[0xFFu8, 0xFF, 0xFF, 0xFF])
            .unwrap();

        let result = host.join().unwrap();
        assert!(matches!(result, Err(LinkError::HandshakeFailed(_))));
    }

    #[test]
    fn oversized_handshake_payload_rejected() {
        let (host_stream, controller_stream) = UnixStream::pair().unwrap();
        let config = HandshakeConfig {
            max_handshake_payload: 32,
            ..HandshakeConfig::default()
        };
        let host = host_over(host_stream, config);

        let mut writer = FrameWriter::new(controller_stream);
        let payload = encode_value(&"1".repeat(64)).unwrap();
        writer.send(MessageKind::Establish, &payload).unwrap();

        let result = host.join().unwrap();
        assert!(matches!(result, Err(LinkError::HandshakeFailed(_))));
    }

    #[test]
    fn version_strings_validated() {
        assert!(parse_version("1.0").is_ok());
        assert!(parse_version("10.42").is_ok());
        assert!(parse_version("1").is_err());
        assert!(parse_version("1.0.0").is_err());
        assert!(parse_version("a.b").is_err());
    }
}
