use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use taslink_transport::PipeStream;

use crate::error::{FrameError, Result};
use crate::frame::{try_decode_frame, Decoded, Frame, FrameConfig};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reassembles complete frames from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete frames,
/// whether a frame arrived in one read or split across many.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Used during the handshake, where the stream read timeout bounds
    /// each step.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decode_buffered()? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read whatever is available and return a complete frame if one has
    /// assembled, `None` otherwise.
    ///
    /// `WouldBlock`/`TimedOut` are "no data yet", so a stream with a short
    /// read timeout turns this into the non-blocking poll the channel
    /// worker loops on. EOF is still `ConnectionClosed`.
    pub fn poll_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode_buffered()? {
            return Ok(Some(frame));
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return self.decode_buffered();
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock
                        || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Run the decoder against buffered bytes.
    ///
    /// A sentinel byte at the head of buffered stream data is a protocol
    /// violation: empty slots exist in the send buffer, never on the wire.
    fn decode_buffered(&mut self) -> Result<Option<Frame>> {
        match try_decode_frame(&mut self.buf, self.config.max_payload_size)? {
            Decoded::Frame(frame) => Ok(Some(frame)),
            Decoded::Partial => Ok(None),
            Decoded::Empty => Err(FrameError::StraySentinel),
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Whether partially-assembled frame bytes are buffered.
    pub fn has_partial_frame(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<PipeStream> {
    /// Create a frame reader for a [`PipeStream`] and apply the read
    /// timeout from config.
    pub fn with_config_pipe(inner: PipeStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: taslink_transport::TransportError) -> FrameError {
    match err {
        taslink_transport::TransportError::Io(io)
        | taslink_transport::TransportError::Accept(io) => FrameError::Io(io),
        taslink_transport::TransportError::Bind { source, .. }
        | taslink_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
