//! The [`WireValue`] trait and its implementations.
//!
//! Implementation tiers, most specific first:
//! 1. `bool` and fixed-width integers — little-endian fast paths.
//! 2. `f32` / `f64` / [`F16`] — raw bits, little-endian.
//! 3. `char` — varint of the Unicode scalar value.
//! 4. `String` — varint byte length + UTF-8.
//! 5. [`Bytes`] — varint length + raw blob.
//! 6. `Vec<T>` — varint element count, elements recursively.
//! 7. Tuples (arity 1–4) — varint arity, components recursively.
//! 8. `Option<T>` — presence marker byte, then the value.
//! 9. Structured records — [`wire_record!`], a varint-length-prefixed
//!    `postcard` blob.
//!
//! `()` encodes as a single marker byte: a frame payload is never empty,
//! because a zero-length frame is the "empty slot" sentinel.

use bytes::{BufMut, Bytes, BytesMut};

use crate::cursor::WireCursor;
use crate::error::{CodecError, Result};
use crate::half::F16;
use crate::varint::{read_varint, write_varint};

/// A value that can be written to and read from a message payload.
///
/// Decoding is driven by the expected type at the call site; the wire
/// carries no type tags beyond the message kind.
pub trait WireValue: Sized {
    fn write(&self, dst: &mut BytesMut) -> Result<()>;
    fn read(src: &mut WireCursor<'_>) -> Result<Self>;
}

/// Encode a value into a standalone payload buffer.
pub fn encode_value<T: WireValue>(value: &T) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    value.write(&mut buf)?;
    debug_assert!(!buf.is_empty(), "encoded payload must never be empty");
    Ok(buf.freeze())
}

/// Decode a payload buffer as a value of type `T`.
///
/// The whole payload must be consumed; trailing bytes indicate the call
/// site expected a different type than the sender wrote.
pub fn decode_value<T: WireValue>(payload: &[u8]) -> Result<T> {
    let mut cursor = WireCursor::new(payload);
    let value = T::read(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(CodecError::TrailingBytes(cursor.remaining()));
    }
    Ok(value)
}

impl WireValue for bool {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(u8::from(*self));
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        match src.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::UnexpectedMarker(other)),
        }
    }
}

macro_rules! impl_wire_int {
    ($($ty:ty => $read:ident),+ $(,)?) => {$(
        impl WireValue for $ty {
            fn write(&self, dst: &mut BytesMut) -> Result<()> {
                dst.put_slice(&self.to_le_bytes());
                Ok(())
            }

            fn read(src: &mut WireCursor<'_>) -> Result<Self> {
                Ok(src.$read()? as $ty)
            }
        }
    )+};
}

impl_wire_int! {
    u8 => read_u8,
    i8 => read_u8,
    u16 => read_u16,
    i16 => read_u16,
    u32 => read_u32,
    i32 => read_u32,
    u64 => read_u64,
    i64 => read_u64,
}

impl WireValue for f32 {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&self.to_le_bytes());
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        Ok(f32::from_bits(src.read_u32()?))
    }
}

impl WireValue for f64 {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&self.to_le_bytes());
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        Ok(f64::from_bits(src.read_u64()?))
    }
}

impl WireValue for F16 {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(&self.to_bits().to_le_bytes());
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        Ok(F16::from_bits(src.read_u16()?))
    }
}

impl WireValue for char {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        write_varint(dst, u64::from(u32::from(*self)));
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        let scalar = read_varint(src)?;
        let scalar = u32::try_from(scalar).map_err(|_| CodecError::InvalidChar(u32::MAX))?;
        char::from_u32(scalar).ok_or(CodecError::InvalidChar(scalar))
    }
}

impl WireValue for String {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        write_varint(dst, self.len() as u64);
        dst.put_slice(self.as_bytes());
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        let raw = read_varint(src)?;
        let len = checked_len(src, raw)?;
        let bytes = src.read_bytes(len)?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }
}

impl WireValue for Bytes {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        write_varint(dst, self.len() as u64);
        dst.put_slice(self);
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        let raw = read_varint(src)?;
        let len = checked_len(src, raw)?;
        Ok(Bytes::copy_from_slice(src.read_bytes(len)?))
    }
}

impl<T: WireValue> WireValue for Vec<T> {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        write_varint(dst, self.len() as u64);
        for item in self {
            item.write(dst)?;
        }
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        let count = read_varint(src)?;
        // Elements are at least one byte each; a count past the payload
        // end is malformed, not an allocation request.
        if count > src.remaining() as u64 {
            return Err(CodecError::LengthOutOfBounds(count));
        }
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(T::read(src)?);
        }
        Ok(items)
    }
}

impl<T: WireValue> WireValue for Option<T> {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            None => {
                dst.put_u8(0);
                Ok(())
            }
            Some(value) => {
                dst.put_u8(1);
                value.write(dst)
            }
        }
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        match src.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::read(src)?)),
            other => Err(CodecError::UnexpectedMarker(other)),
        }
    }
}

impl WireValue for () {
    fn write(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(0);
        Ok(())
    }

    fn read(src: &mut WireCursor<'_>) -> Result<Self> {
        match src.read_u8()? {
            0 => Ok(()),
            other => Err(CodecError::UnexpectedMarker(other)),
        }
    }
}

macro_rules! impl_wire_tuple {
    ($arity:literal => $($name:ident : $idx:tt),+) => {
        impl<$($name: WireValue),+> WireValue for ($($name,)+) {
            fn write(&self, dst: &mut BytesMut) -> Result<()> {
                write_varint(dst, $arity);
                $(self.$idx.write(dst)?;)+
                Ok(())
            }

            fn read(src: &mut WireCursor<'_>) -> Result<Self> {
                let arity = read_varint(src)?;
                if arity != $arity {
                    return Err(CodecError::ArityMismatch {
                        expected: $arity,
                        got: arity,
                    });
                }
                Ok(($($name::read(src)?,)+))
            }
        }
    };
}

impl_wire_tuple!(1 => A:0);
impl_wire_tuple!(2 => A:0, B:1);
impl_wire_tuple!(3 => A:0, B:1, C:2);
impl_wire_tuple!(4 => A:0, B:1, C:2, D:3);

fn checked_len(src: &WireCursor<'_>, len: u64) -> Result<usize> {
    if len > src.remaining() as u64 {
        return Err(CodecError::LengthOutOfBounds(len));
    }
    Ok(len as usize)
}

/// Implement [`WireValue`] for structured record types.
///
/// Records go through the structural serializer (`postcard`) as a
/// varint-length-prefixed blob. The type needs `serde::Serialize` and
/// `serde::Deserialize`.
#[macro_export]
macro_rules! wire_record {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::WireValue for $ty {
            fn write(&self, dst: &mut $crate::__private::bytes::BytesMut) -> $crate::Result<()> {
                let blob = $crate::__private::postcard::to_allocvec(self)?;
                $crate::write_varint(dst, blob.len() as u64);
                $crate::__private::bytes::BufMut::put_slice(dst, &blob);
                Ok(())
            }

            fn read(src: &mut $crate::WireCursor<'_>) -> $crate::Result<Self> {
                let len = $crate::read_record_len(src)?;
                let blob = src.read_bytes(len)?;
                Ok($crate::__private::postcard::from_bytes(blob)?)
            }
        }
    )+};
}

/// Support for [`wire_record!`]: read and bounds-check a record blob length.
#[doc(hidden)]
pub fn read_record_len(src: &mut WireCursor<'_>) -> Result<usize> {
    let len = read_varint(src)?;
    checked_len(src, len)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    fn roundtrip<T: WireValue + PartialEq + std::fmt::Debug>(value: T) {
        let payload = encode_value(&value).unwrap();
        assert!(!payload.is_empty(), "sentinel invariant violated");
        let decoded: T = decode_value(&payload).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn primitive_roundtrips() {
        roundtrip(true);
        roundtrip(false);
        roundtrip(-1i32);
        roundtrip(0x1234_5678_9ABC_DEF0u64);
        roundtrip(-128i8);
        roundtrip(3.14f32);
        roundtrip(-2.718281828f64);
        roundtrip(F16::from_f32(1.5));
        roundtrip('x');
        roundtrip('λ');
    }

    #[test]
    fn string_and_blob_roundtrips() {
        roundtrip(String::from("hello"));
        roundtrip(String::new());
        roundtrip(Bytes::from_static(&[1, 2, 3]));
        roundtrip(vec![1u8, 2, 3]);
    }

    #[test]
    fn vec_u8_matches_blob_encoding() {
        let blob = encode_value(&Bytes::from_static(&[1, 2, 3])).unwrap();
        let list = encode_value(&vec![1u8, 2, 3]).unwrap();
        assert_eq!(blob, list);
    }

    #[test]
    fn nested_list_roundtrip() {
        roundtrip(vec![vec![1i32, 2], vec![3, 4]]);
        roundtrip(vec![1i32, 2, 3, 4]);
        roundtrip(Vec::<i32>::new());
    }

    #[test]
    fn tuple_roundtrip() {
        roundtrip((1i32, String::from("a"), 2.5f64));
        roundtrip((true,));
        roundtrip((1u8, 2u16, 3u32, 4u64));
    }

    #[test]
    fn option_marker_roundtrip() {
        roundtrip(Option::<i32>::None);
        roundtrip(Some(7i32));
        roundtrip(Some(String::from("present")));
    }

    #[test]
    fn unit_encodes_one_marker_byte() {
        let payload = encode_value(&()).unwrap();
        assert_eq!(payload.as_ref(), &[0]);
        decode_value::<()>(&payload).unwrap();
    }

    #[test]
    fn every_shape_is_nonempty_on_the_wire() {
        assert!(!encode_value(&false).unwrap().is_empty());
        assert!(!encode_value(&String::new()).unwrap().is_empty());
        assert!(!encode_value(&Vec::<i32>::new()).unwrap().is_empty());
        assert!(!encode_value(&Bytes::new()).unwrap().is_empty());
        assert!(!encode_value(&Option::<i32>::None).unwrap().is_empty());
        assert!(!encode_value(&()).unwrap().is_empty());
    }

    #[test]
    fn decode_as_wrong_type_fails() {
        let payload = encode_value(&3.14f64).unwrap();
        // Reading a f64 payload as bool leaves trailing bytes or hits a
        // bad marker; either way it must error, not silently succeed.
        assert!(decode_value::<bool>(&payload).is_err());
    }

    #[test]
    fn truncated_payload_is_eof() {
        let payload = encode_value(&String::from("hello")).unwrap();
        let err = decode_value::<String>(&payload[..3]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::LengthOutOfBounds(_) | CodecError::UnexpectedEof { .. }
        ));
    }

    #[test]
    fn hostile_count_rejected_without_allocation() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, u64::MAX);
        let err = decode_value::<Vec<i32>>(&buf).unwrap_err();
        assert!(matches!(err, CodecError::LengthOutOfBounds(_)));
    }

    #[test]
    fn tuple_arity_mismatch_detected() {
        let payload = encode_value(&(1i32, 2i32)).unwrap();
        let err = decode_value::<(i32, i32, i32)>(&payload).unwrap_err();
        assert!(matches!(err, CodecError::ArityMismatch { expected: 3, got: 2 }));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        frame: i32,
        label: String,
        position: (f32, f32),
    }

    wire_record!(Snapshot);

    #[test]
    fn record_roundtrip() {
        roundtrip(Snapshot {
            frame: 412,
            label: String::from("2A"),
            position: (104.5, -32.25),
        });
    }

    #[test]
    fn record_blob_is_length_prefixed() {
        let value = Snapshot {
            frame: 1,
            label: String::from("x"),
            position: (0.0, 0.0),
        };
        let payload = encode_value(&value).unwrap();
        let mut cursor = WireCursor::new(&payload);
        let len = crate::varint::read_varint(&mut cursor).unwrap();
        assert_eq!(len as usize, cursor.remaining());
    }
}
