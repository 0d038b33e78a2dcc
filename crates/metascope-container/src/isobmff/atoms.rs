//! Box type codes and header parsing.

use crate::error::{ProbeError, Result};
use crate::reader::{fourcc_str, ByteCursor};

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MOOF: Self = Self(*b"moof");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const DINF: Self = Self(*b"dinf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STZ2: Self = Self(*b"stz2");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const UDTA: Self = Self(*b"udta");
    pub const META: Self = Self(*b"meta");
    pub const ILST: Self = Self(*b"ilst");
    pub const DATA: Self = Self(*b"data");
    pub const MEAN: Self = Self(*b"mean");
    pub const NAME: Self = Self(*b"name");
    pub const FREEFORM: Self = Self(*b"----");

    /// Get the 4-char code as a string.
    pub fn as_string(&self) -> String {
        fourcc_str(&self.0)
    }

    /// Types whose payload is a sequence of child boxes.
    pub fn is_container(&self) -> bool {
        matches!(
            *self,
            BoxType::MOOV
                | BoxType::TRAK
                | BoxType::MDIA
                | BoxType::MINF
                | BoxType::STBL
                | BoxType::EDTS
                | BoxType::UDTA
                | BoxType::META
                | BoxType::ILST
                | BoxType::DINF
        )
    }

    /// QuickTime `©xxx` user-data text atom.
    pub fn is_copyright_prefixed(&self) -> bool {
        self.0[0] == 0xA9
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

/// Parsed box header.
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    pub box_type: BoxType,
    /// Box size including header.
    pub size: u64,
    /// Absolute offset of the first header byte.
    pub offset: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl BoxHeader {
    /// Get the payload size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }
}

/// Read a box header. Size 1 means a 64-bit size follows; size 0 means the
/// box runs to the end of its parent, i.e. everything left in `cursor`.
pub fn read_box_header(cursor: &mut ByteCursor) -> Result<BoxHeader> {
    let offset = cursor.offset();
    let size32 = cursor.be_u32()?;
    let box_type = BoxType(cursor.fourcc()?);

    let (size, header_size) = match size32 {
        1 => (cursor.be_u64()?, 16u8),
        0 => (cursor.remaining() as u64 + 8, 8u8),
        n => (n as u64, 8u8),
    };

    if size < header_size as u64 {
        return Err(ProbeError::malformed(format!(
            "box '{}' at {} declares size {} below its {}-byte header",
            box_type, offset, size, header_size
        )));
    }

    Ok(BoxHeader {
        box_type,
        size,
        offset,
        header_size,
    })
}
