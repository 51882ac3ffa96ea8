use bytes::{Buf, BufMut, Bytes, BytesMut};
use taslink_codec::{varint::varint_len, write_varint, CodecError, WireCursor};

use crate::error::{FrameError, Result};
use crate::kind::MessageKind;

/// The "empty slot" byte: a buffer position holding no frame.
pub const SENTINEL: u8 = 0x00;

/// Default maximum payload size: 1 MiB. A full game-state snapshot fits
/// with room to spare; anything larger does not belong on this channel.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// One message on the wire: kind plus opaque payload bytes.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame. The payload must be non-empty (§ sentinel).
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (kind + length varint + payload).
    pub fn wire_size(&self) -> usize {
        1 + varint_len(self.payload.len() as u64) + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬────────────────┬──────────────────┐
/// │ Kind (1B)  │ Length (varint)│ Payload          │
/// │ non-zero   │ non-zero       │ (Length bytes)   │
/// └────────────┴────────────────┴──────────────────┘
/// ```
pub fn encode_frame(kind: MessageKind, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > DEFAULT_MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: DEFAULT_MAX_PAYLOAD,
        });
    }
    dst.reserve(1 + varint_len(payload.len() as u64) + payload.len());
    dst.put_u8(kind as u8);
    write_varint(dst, payload.len() as u64);
    dst.put_slice(payload);
    Ok(())
}

/// Outcome of a decode attempt against a byte window.
#[derive(Debug)]
pub enum Decoded {
    /// The window starts with the sentinel byte: no frame at this slot.
    /// Nothing is consumed.
    Empty,
    /// The window holds the start of a frame but not all of it yet.
    Partial,
    /// A complete frame, consumed from the window.
    Frame(Frame),
}

/// Try to decode one frame from the front of `src`.
///
/// Unknown kind bytes, sentinel lengths and over-limit lengths are
/// errors — a malformed frame header means the stream cannot be safely
/// advanced, and the caller must reset the connection.
pub fn try_decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Decoded> {
    let Some(&kind_byte) = src.first() else {
        return Ok(Decoded::Partial);
    };
    if kind_byte == SENTINEL {
        return Ok(Decoded::Empty);
    }
    let kind = MessageKind::try_from(kind_byte)?;

    let mut cursor = WireCursor::new(&src[1..]);
    let payload_len = match taslink_codec::read_varint(&mut cursor) {
        Ok(len) => len,
        Err(CodecError::UnexpectedEof { .. }) => return Ok(Decoded::Partial),
        Err(err) => return Err(FrameError::BadLength(err)),
    };
    let header_len = 1 + (src.len() - 1 - cursor.remaining());

    if payload_len == 0 {
        return Err(FrameError::SentinelLength(kind_byte));
    }
    if payload_len > max_payload as u64 {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len as usize,
            max: max_payload,
        });
    }

    let total = header_len + payload_len as usize;
    if src.len() < total {
        return Ok(Decoded::Partial);
    }

    src.advance(header_len);
    let payload = src.split_to(payload_len as usize).freeze();

    Ok(Decoded::Frame(Frame { kind, payload }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 MiB.
    pub max_payload_size: usize,
    /// Read timeout for the underlying stream.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for the underlying stream.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
