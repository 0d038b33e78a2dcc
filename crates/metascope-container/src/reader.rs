//! Bounds-checked byte cursor.
//!
//! Every read checks `pos + n <= len` first and fails with
//! [`ProbeError::Truncated`] otherwise. Nothing is padded and nothing is
//! returned partially. Offsets reported in errors are absolute file offsets,
//! so a sub-cursor over a box payload still points at the right place.

use crate::error::{ProbeError, Result};

/// Read-only cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Cursor whose slice starts at absolute offset `base`.
    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Position relative to the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset of the next byte.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self, needed: usize) -> ProbeError {
        ProbeError::Truncated {
            offset: self.offset(),
            needed: needed as u64,
            available: self.remaining() as u64,
        }
    }

    /// Borrow the next `n` bytes and advance.
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.truncated(n));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Borrow the next `n` bytes without advancing.
    pub fn peek(&self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.truncated(n));
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_exact(n).map(|_| ())
    }

    /// Move to `pos` within the slice.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(ProbeError::Truncated {
                offset: self.base + pos as u64,
                needed: 0,
                available: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Everything after the current position, consuming it.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    /// Consume `n` bytes and return a cursor limited to them.
    pub fn sub_cursor(&mut self, n: usize) -> Result<ByteCursor<'a>> {
        let base = self.offset();
        let data = self.read_exact(n)?;
        Ok(ByteCursor::with_base(data, base))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn be_u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_be_bytes)
    }

    pub fn be_u24(&mut self) -> Result<u32> {
        let b = self.array::<3>()?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn be_u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_be_bytes)
    }

    pub fn be_u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_be_bytes)
    }

    pub fn be_i16(&mut self) -> Result<i16> {
        self.array().map(i16::from_be_bytes)
    }

    pub fn be_i32(&mut self) -> Result<i32> {
        self.array().map(i32::from_be_bytes)
    }

    pub fn be_i64(&mut self) -> Result<i64> {
        self.array().map(i64::from_be_bytes)
    }

    pub fn le_u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn le_u24(&mut self) -> Result<u32> {
        let b = self.array::<3>()?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn le_u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn le_u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    pub fn le_i32(&mut self) -> Result<i32> {
        self.array().map(i32::from_le_bytes)
    }

    pub fn fourcc(&mut self) -> Result<[u8; 4]> {
        self.array()
    }

    /// 16.16 fixed point.
    pub fn be_fixed16_16(&mut self) -> Result<f64> {
        Ok(self.be_i32()? as f64 / 65536.0)
    }

    /// 8.8 fixed point.
    pub fn be_fixed8_8(&mut self) -> Result<f64> {
        Ok(self.be_i16()? as f64 / 256.0)
    }
}

/// Render a four-character code, replacing non-printable bytes with `.`.
pub fn fourcc_str(code: &[u8]) -> String {
    code.iter()
        .map(|&b| {
            if b == 0xA9 {
                '©'
            } else if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Decode text up to the first NUL, lossily, capped at `max_bytes`.
pub fn text(data: &[u8], max_bytes: usize) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let end = end.min(max_bytes);
    String::from_utf8_lossy(&data[..end]).trim_end().to_string()
}

/// Decode Latin-1 text (PNG tEXt, RIFF INFO) up to the first NUL.
pub fn latin1(data: &[u8], max_bytes: usize) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    data[..end.min(max_bytes)]
        .iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_and_little_endian() {
        let data = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.be_u16().unwrap(), 0x0001);
        assert_eq!(c.le_u16().unwrap(), 0x0302);
        assert_eq!(c.be_u24().unwrap(), 0x040506);
        assert_eq!(c.remaining(), 1);
    }

    #[test]
    fn test_read_exact_never_partial() {
        let data = [1, 2, 3];
        let mut c = ByteCursor::with_base(&data, 100);
        c.u8().unwrap();
        match c.read_exact(4) {
            Err(ProbeError::Truncated {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 101);
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        // position unchanged after a failed read
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn test_sub_cursor_keeps_absolute_offsets() {
        let data = [0u8; 16];
        let mut c = ByteCursor::with_base(&data, 1000);
        c.skip(4).unwrap();
        let mut sub = c.sub_cursor(8).unwrap();
        assert_eq!(sub.offset(), 1004);
        assert!(sub.read_exact(9).is_err());
        assert_eq!(c.offset(), 1012);
    }

    #[test]
    fn test_fixed_point() {
        let data = [0x00, 0x01, 0x80, 0x00, 0x01, 0x00];
        let mut c = ByteCursor::new(&data);
        assert_eq!(c.be_fixed16_16().unwrap(), 1.5);
        assert_eq!(c.be_fixed8_8().unwrap(), 1.0);
    }

    #[test]
    fn test_fourcc_str() {
        assert_eq!(fourcc_str(b"moov"), "moov");
        assert_eq!(fourcc_str(&[0xA9, b'n', b'a', b'm']), "©nam");
        assert_eq!(fourcc_str(&[0, 1, b'a', b'b']), "..ab");
    }

    #[test]
    fn test_text_stops_at_nul() {
        assert_eq!(text(b"hello\0world", 100), "hello");
        assert_eq!(text(b"hello", 3), "hel");
        assert_eq!(latin1(&[0x63, 0x61, 0x66, 0xE9], 10), "café");
    }
}
