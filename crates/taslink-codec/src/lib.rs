//! Static-dispatch value codec for message payloads.
//!
//! Payloads are heterogeneous: most messages carry a primitive or a small
//! primitive collection, a few carry structured records. Paying for a
//! structural serializer on every `bool` would dominate per-message cost,
//! so encoding is tiered: fixed-width fast paths for primitives, compact
//! varint-prefixed encodings for strings/blobs/collections, and a
//! `postcard` blob fallback for records (see [`wire_record!`]).
//!
//! Dispatch is resolved at compile time per call site through the
//! [`WireValue`] trait. The wire format carries no type tags; decoding is
//! driven by the statically known expected type, which the message kind
//! already selected.

pub mod cursor;
pub mod error;
pub mod half;
pub mod value;
pub mod varint;

pub use cursor::WireCursor;
pub use error::{CodecError, Result};
pub use half::F16;
pub use value::{decode_value, encode_value, WireValue};
pub use varint::{read_varint, write_varint, MAX_VARINT_LEN};

#[doc(hidden)]
pub use value::read_record_len;

#[doc(hidden)]
pub mod __private {
    pub use bytes;
    pub use postcard;
}
