//! Message framing for the host↔controller channel.
//!
//! Every message is framed as:
//! - A 1-byte message kind (the closed registry in [`kind`])
//! - A varint payload length
//! - The payload bytes
//!
//! A `0x00` kind byte is the "empty slot" sentinel, not a frame, and a
//! declared length of zero is never a valid application payload. Outgoing
//! frames wait in the priority-aware [`SendQueue`].

pub mod error;
pub mod frame;
pub mod kind;
pub mod queue;
pub mod reader;
pub mod writer;

pub use error::{FrameError, Result};
pub use frame::{
    encode_frame, try_decode_frame, Decoded, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, SENTINEL,
};
pub use kind::MessageKind;
pub use queue::{SendQueue, DEFAULT_QUEUE_CAPACITY};
pub use reader::FrameReader;
pub use writer::FrameWriter;
