//! EBML variable-length integers (RFC 8794).
//!
//! The width of a vint is one plus the number of leading zero bits of its
//! first byte. Element IDs keep their marker bit; sizes drop it. A size whose
//! value bits are all ones is the "unknown size" sentinel.

use crate::error::{ProbeError, Result};
use crate::reader::ByteCursor;

/// Longest element ID accepted, in bytes.
pub const MAX_ID_LENGTH: usize = 4;
/// Longest size field accepted, in bytes.
pub const MAX_SIZE_LENGTH: usize = 8;

/// Declared size of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EbmlSize {
    Known(u64),
    /// Extends to the end of the parent.
    Unknown,
}

impl EbmlSize {
    pub fn known(self) -> Option<u64> {
        match self {
            EbmlSize::Known(size) => Some(size),
            EbmlSize::Unknown => None,
        }
    }
}

fn vint_width(first: u8, max: usize, what: &str) -> Result<usize> {
    let width = first.leading_zeros() as usize + 1;
    if width > max {
        return Err(ProbeError::malformed(format!(
            "EBML {} of {} bytes (first byte {:#04x})",
            what, width, first
        )));
    }
    Ok(width)
}

fn short_read(needed: usize, available: usize) -> ProbeError {
    ProbeError::Truncated {
        offset: 0,
        needed: needed as u64,
        available: available as u64,
    }
}

/// Read an element ID, marker bit included. Returns `(id, bytes_consumed)`.
///
/// Truncation offsets are relative to `data`; [`read_element_header`]
/// rewrites them to absolute offsets.
pub fn read_ebml_id(data: &[u8]) -> Result<(u32, usize)> {
    let first = *data.first().ok_or_else(|| short_read(1, 0))?;
    let width = vint_width(first, MAX_ID_LENGTH, "ID")?;
    let bytes = data
        .get(..width)
        .ok_or_else(|| short_read(width, data.len()))?;

    let id = bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
    Ok((id, width))
}

/// Read an element size. Returns `(size, bytes_consumed)`.
pub fn read_ebml_size(data: &[u8]) -> Result<(EbmlSize, usize)> {
    let first = *data.first().ok_or_else(|| short_read(1, 0))?;
    let width = vint_width(first, MAX_SIZE_LENGTH, "size")?;
    let bytes = data
        .get(..width)
        .ok_or_else(|| short_read(width, data.len()))?;

    let marker_cleared = (first as u64) & (0xFF >> width);
    let value = bytes[1..]
        .iter()
        .fold(marker_cleared, |acc, &b| (acc << 8) | b as u64);

    let all_ones = (1u64 << (7 * width)) - 1;
    if value == all_ones {
        return Ok((EbmlSize::Unknown, width));
    }
    Ok((EbmlSize::Known(value), width))
}

/// Header of one element.
#[derive(Debug, Clone, Copy)]
pub struct ElementHeader {
    pub id: u32,
    pub size: EbmlSize,
    /// Absolute offset of the first header byte.
    pub offset: u64,
    /// ID plus size field length.
    pub header_len: usize,
}

/// Read an element header at the cursor and advance past it.
pub fn read_element_header(cursor: &mut ByteCursor) -> Result<ElementHeader> {
    let offset = cursor.offset();
    let available = cursor.peek(cursor.remaining().min(MAX_ID_LENGTH + MAX_SIZE_LENGTH))?;

    let (id, id_len) = read_ebml_id(available).map_err(|e| relocate(e, offset))?;
    let (size, size_len) =
        read_ebml_size(&available[id_len..]).map_err(|e| relocate(e, offset + id_len as u64))?;

    cursor.skip(id_len + size_len)?;
    Ok(ElementHeader {
        id,
        size,
        offset,
        header_len: id_len + size_len,
    })
}

fn relocate(err: ProbeError, offset: u64) -> ProbeError {
    match err {
        ProbeError::Truncated {
            needed, available, ..
        } => ProbeError::Truncated {
            offset,
            needed,
            available,
        },
        other => other,
    }
}

/// Big-endian unsigned integer payload (0 to 8 bytes).
pub fn read_uint(data: &[u8]) -> Result<u64> {
    if data.len() > 8 {
        return Err(ProbeError::malformed(format!(
            "EBML unsigned integer of {} bytes",
            data.len()
        )));
    }
    Ok(data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

/// Big-endian two's-complement integer payload (0 to 8 bytes).
pub fn read_int(data: &[u8]) -> Result<i64> {
    let raw = read_uint(data)?;
    if data.is_empty() || data.len() == 8 {
        return Ok(raw as i64);
    }
    let shift = 64 - 8 * data.len() as u32;
    Ok(((raw << shift) as i64) >> shift)
}

/// Float payload (0, 4 or 8 bytes).
pub fn read_float(data: &[u8]) -> Result<f64> {
    match data.len() {
        0 => Ok(0.0),
        4 => Ok(f32::from_be_bytes([data[0], data[1], data[2], data[3]]) as f64),
        8 => Ok(f64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ])),
        n => Err(ProbeError::malformed(format!("EBML float of {} bytes", n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Canonical `width`-byte encoding of `value` (`value < 2^(7*width)`).
    fn encode_size(value: u64, width: usize) -> Vec<u8> {
        let marked = value | (1u64 << (7 * width));
        marked.to_be_bytes()[8 - width..].to_vec()
    }

    #[test]
    fn test_read_ebml_id_keeps_marker() {
        assert_eq!(read_ebml_id(&[0x1A, 0x45, 0xDF, 0xA3]).unwrap(), (0x1A45DFA3, 4));
        assert_eq!(read_ebml_id(&[0xAE]).unwrap(), (0xAE, 1));
        assert_eq!(read_ebml_id(&[0x42, 0x86]).unwrap(), (0x4286, 2));
    }

    #[test]
    fn test_read_ebml_id_rejects_wide_ids() {
        assert!(matches!(
            read_ebml_id(&[0x08, 0, 0, 0, 0]),
            Err(ProbeError::MalformedStructure(_))
        ));
        assert!(matches!(
            read_ebml_id(&[0x00]),
            Err(ProbeError::MalformedStructure(_))
        ));
    }

    #[test]
    fn test_read_ebml_size_widths() {
        assert_eq!(read_ebml_size(&[0x82]).unwrap(), (EbmlSize::Known(2), 1));
        assert_eq!(read_ebml_size(&[0x40, 0x02]).unwrap(), (EbmlSize::Known(2), 2));
        assert_eq!(read_ebml_size(&[0x20, 0x00, 0x02]).unwrap(), (EbmlSize::Known(2), 3));
        assert_eq!(
            read_ebml_size(&[0x10, 0x00, 0x00, 0x02]).unwrap(),
            (EbmlSize::Known(2), 4)
        );
    }

    #[test]
    fn test_read_ebml_size_unknown_sentinel() {
        assert_eq!(read_ebml_size(&[0xFF]).unwrap(), (EbmlSize::Unknown, 1));
        assert_eq!(read_ebml_size(&[0x7F, 0xFF]).unwrap(), (EbmlSize::Unknown, 2));
        assert_eq!(
            read_ebml_size(&[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            (EbmlSize::Unknown, 8)
        );
        // one bit short of all ones is a real size
        assert_eq!(read_ebml_size(&[0xFE]).unwrap(), (EbmlSize::Known(126), 1));
        assert_eq!(read_ebml_size(&[0x7F, 0xFE]).unwrap(), (EbmlSize::Known(0x3FFE), 2));
    }

    proptest! {
        #[test]
        fn prop_read_ebml_size_every_width(
            width in 1usize..=8,
            bits in any::<u64>(),
            all_ones in any::<bool>(),
            trailing in proptest::collection::vec(any::<u8>(), 0..4),
        ) {
            let mask = (1u64 << (7 * width)) - 1;
            let value = if all_ones { mask } else { bits & mask };
            let mut data = encode_size(value, width);
            data.extend_from_slice(&trailing);

            let expected = if value == mask {
                EbmlSize::Unknown
            } else {
                EbmlSize::Known(value)
            };
            prop_assert_eq!(read_ebml_size(&data).unwrap(), (expected, width));
        }
    }

    #[test]
    fn test_read_ebml_size_truncated() {
        assert!(matches!(
            read_ebml_size(&[0x40]),
            Err(ProbeError::Truncated { needed: 2, .. })
        ));
        assert!(read_ebml_size(&[]).is_err());
    }

    #[test]
    fn test_element_header_advances_cursor() {
        let data = [0x15, 0x49, 0xA9, 0x66, 0x84, 1, 2, 3, 4];
        let mut cursor = ByteCursor::with_base(&data, 40);
        let header = read_element_header(&mut cursor).unwrap();
        assert_eq!(header.id, 0x1549A966);
        assert_eq!(header.size, EbmlSize::Known(4));
        assert_eq!(header.offset, 40);
        assert_eq!(header.header_len, 5);
        assert_eq!(cursor.remaining(), 4);
    }

    #[test]
    fn test_signed_and_float_payloads() {
        assert_eq!(read_int(&[0xFF]).unwrap(), -1);
        assert_eq!(read_int(&[0x00, 0x80]).unwrap(), 128);
        assert_eq!(read_uint(&[0x01, 0x00]).unwrap(), 256);
        assert_eq!(read_float(&[0x40, 0x49, 0x0F, 0xDB]).unwrap() as f32, std::f32::consts::PI);
        assert!(read_float(&[0; 3]).is_err());
    }
}
