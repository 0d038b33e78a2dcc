//! Big-endian bit reader with Exp-Golomb support.
//!
//! Reads never run past the end of the slice: every read returns
//! [`BitstreamError::Exhausted`] instead, so callers can keep what they
//! decoded so far and substitute defaults for the rest.

use crate::error::BitstreamError;

/// Longest accepted Exp-Golomb prefix. Anything longer is treated as corrupt.
pub const MAX_EXP_GOLOMB_PREFIX: u32 = 31;

/// Bit cursor over an RBSP byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Current position in bits from the start of the slice.
    pub fn position(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position())
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<bool, BitstreamError> {
        let byte = self
            .data
            .get(self.byte_pos)
            .ok_or(BitstreamError::Exhausted {
                position: self.position(),
            })?;

        let bit = (byte >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(bit == 1)
    }

    /// Read `n` bits (up to 32) as an unsigned value, MSB first.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, BitstreamError> {
        if n > 32 {
            return Err(BitstreamError::TooManyBits(n));
        }
        if self.remaining_bits() < n as usize {
            return Err(BitstreamError::Exhausted {
                position: self.position(),
            });
        }

        let mut result = 0u32;
        for _ in 0..n {
            result = (result << 1) | self.read_bit()? as u32;
        }
        Ok(result)
    }

    pub fn read_flag(&mut self) -> Result<bool, BitstreamError> {
        self.read_bit()
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<(), BitstreamError> {
        if self.remaining_bits() < n {
            return Err(BitstreamError::Exhausted {
                position: self.position(),
            });
        }
        let target = self.position() + n;
        self.byte_pos = target / 8;
        self.bit_pos = (target % 8) as u8;
        Ok(())
    }

    /// Read an unsigned Exp-Golomb value, `ue(v)`.
    ///
    /// `2^leadingZeroBits - 1 + info`, where `info` is the `leadingZeroBits`
    /// bits following the terminating one bit.
    pub fn read_ue(&mut self) -> Result<u32, BitstreamError> {
        let mut leading_zeros = 0u32;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > MAX_EXP_GOLOMB_PREFIX {
                return Err(BitstreamError::ExpGolombOverflow { leading_zeros });
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let info = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) - 1 + info as u64) as u32)
    }

    /// Read a signed Exp-Golomb value, `se(v)`.
    pub fn read_se(&mut self) -> Result<i32, BitstreamError> {
        let code = self.read_ue()? as i64;
        let magnitude = (code + 1) / 2;
        let value = if code % 2 == 0 { -magnitude } else { magnitude };
        Ok(value as i32)
    }
}

/// Minimal MSB-first bit writer, used to build RBSP payloads.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_pos: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        if self.bit_pos == 0 {
            self.data.push(0);
        }
        if bit {
            if let Some(last) = self.data.last_mut() {
                *last |= 1 << (7 - self.bit_pos);
            }
        }
        self.bit_pos = (self.bit_pos + 1) % 8;
    }

    /// Write the low `n` bits of `value`, MSB first.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        for i in (0..n.min(32)).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Write `value` in canonical unsigned Exp-Golomb form.
    pub fn write_ue(&mut self, value: u32) {
        let code = value as u64 + 1;
        let bits = 64 - code.leading_zeros();
        for _ in 0..bits - 1 {
            self.write_bit(false);
        }
        for i in (0..bits).rev() {
            self.write_bit((code >> i) & 1 == 1);
        }
    }

    /// Pad with a stop bit and zeros, as `rbsp_trailing_bits` does.
    pub fn finish_rbsp(mut self) -> Vec<u8> {
        self.write_bit(true);
        self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
