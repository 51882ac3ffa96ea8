//! Checked reader over a payload byte slice.
//!
//! Every read is bounds-checked; running off the end of a payload is a
//! [`CodecError::UnexpectedEof`], never a panic.

use crate::error::{CodecError, Result};

/// A forward-only cursor over an in-memory payload.
#[derive(Debug)]
pub struct WireCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireCursor<'a> {
    /// Wrap a payload slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the payload is fully consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n - self.remaining(),
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read_bytes(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance() {
        let mut cursor = WireCursor::new(&[1, 2, 3, 4, 5]);
        assert_eq!(cursor.read_u8().unwrap(), 1);
        assert_eq!(cursor.read_u16().unwrap(), u16::from_le_bytes([2, 3]));
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.read_bytes(2).unwrap(), &[4, 5]);
        assert!(cursor.is_empty());
    }

    #[test]
    fn overrun_is_eof_not_panic() {
        let mut cursor = WireCursor::new(&[1, 2]);
        let err = cursor.read_u32().unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedEof { needed: 2, available: 2 }));
        // The failed read must not consume anything.
        assert_eq!(cursor.remaining(), 2);
    }
}
