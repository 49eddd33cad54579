//! Sequential little-endian reader and writer over a decompressed map body.
//!
//! The format has no random access: every field offset is the sum of the
//! widths of the fields before it, so the reader only moves forward.

use crate::error::{DecodeError, Result};
use crate::text::RawString;

pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current byte offset, reported in errors and logs.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(DecodeError::OutOfBounds {
                offset: self.pos,
                wanted: len,
                available: self.data.len(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read `count` consecutive i32 values.
    pub fn read_i32s(&mut self, count: usize) -> Result<Vec<i32>> {
        // Bounds are checked up front so a bogus count cannot trigger a huge allocation.
        let wanted = count.saturating_mul(4);
        if wanted > self.remaining() {
            return Err(DecodeError::OutOfBounds {
                offset: self.pos,
                wanted,
                available: self.data.len(),
            });
        }
        (0..count).map(|_| self.read_i32()).collect()
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Read a string of `len` bytes. With `null_terminated`, `len + 1` bytes
    /// are consumed and the terminator is dropped. The bytes are kept as-is.
    pub fn read_string(&mut self, len: usize, null_terminated: bool) -> Result<RawString> {
        let raw = self.read_bytes(len.saturating_add(null_terminated as usize))?;
        Ok(RawString::from(&raw[..len]))
    }
}

/// Append-only counterpart of [`Cursor`].
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Mirror of [`Cursor::read_string`]; the caller writes any length prefix.
    pub fn write_string(&mut self, s: impl AsRef<[u8]>, null_terminated: bool) {
        self.buf.extend_from_slice(s.as_ref());
        if null_terminated {
            self.buf.push(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_little_endian() {
        let mut w = Writer::new();
        w.write_i32(-2);
        w.write_u16(0x1234);
        w.write_f32(1.5);
        w.write_u8(7);
        let bytes = w.into_inner();
        assert_eq!(&bytes[..4], &[0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[4..6], &[0x34, 0x12]);

        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_i32().unwrap(), -2);
        assert_eq!(c.read_u16().unwrap(), 0x1234);
        assert_eq!(c.read_f32().unwrap(), 1.5);
        assert_eq!(c.read_u8().unwrap(), 7);
        assert_eq!(c.position(), 11);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_out_of_bounds_reports_offset() {
        let bytes = [1u8, 2, 3];
        let mut c = Cursor::new(&bytes);
        c.read_u8().unwrap();
        match c.read_i32() {
            Err(DecodeError::OutOfBounds { offset, wanted, available }) => {
                assert_eq!(offset, 1);
                assert_eq!(wanted, 4);
                assert_eq!(available, 3);
            }
            other => panic!("expected OutOfBounds, got {:?}", other),
        }
        // A failed read does not move the cursor.
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn test_null_terminated_string() {
        let bytes = b"fps\0rest";
        let mut c = Cursor::new(bytes);
        assert_eq!(c.read_string(3, true).unwrap(), "fps");
        assert_eq!(c.position(), 4);
        assert_eq!(c.read_string(4, false).unwrap(), "rest");
    }

    #[test]
    fn test_string_bytes_kept_verbatim() {
        let bytes = [0x43, 0xE9, 0x00, 0x65, 0x00];
        let mut c = Cursor::new(&bytes);
        let s = c.read_string(4, true).unwrap();
        assert_eq!(s.as_bytes(), &[0x43, 0xE9, 0x00, 0x65]);

        let mut w = Writer::new();
        w.write_string(&s, true);
        assert_eq!(w.into_inner(), bytes);
    }

    #[test]
    fn test_read_i32s_rejects_huge_count() {
        let bytes = [0u8; 8];
        let mut c = Cursor::new(&bytes);
        assert!(matches!(c.read_i32s(1 << 30), Err(DecodeError::OutOfBounds { .. })));
        assert_eq!(c.read_i32s(2).unwrap(), vec![0, 0]);
    }
}
