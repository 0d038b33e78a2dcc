//! RIFF chunk walking shared by AVI and WebP.
//!
//! A RIFF file is `RIFF <le32 size> <form type>` followed by chunks of
//! `<fourcc> <le32 size> <payload>`, each padded to an even length. `LIST`
//! chunks carry a four-character list type and then more chunks.

pub mod avi;
pub mod webp;

use crate::error::{ProbeError, Result};
use crate::reader::{fourcc_str, ByteCursor};
use crate::value::Node;

/// RIFF header magic bytes
pub const RIFF_MAGIC: &[u8; 4] = b"RIFF";
pub const LIST: [u8; 4] = *b"LIST";

pub const AVI_FORM: &[u8; 4] = b"AVI ";
pub const WEBP_FORM: &[u8; 4] = b"WEBP";

const RIFF_HEADER_LEN: usize = 12;

/// File-level header.
#[derive(Debug, Clone, Copy)]
pub struct RiffHeader {
    pub form_type: [u8; 4],
    /// Size declared in the header, plus the 8 header bytes it excludes.
    pub declared_size: u64,
}

/// Check the RIFF header and its form type.
pub fn parse_riff_header(data: &[u8], form: &[u8; 4]) -> Result<RiffHeader> {
    if data.len() < RIFF_HEADER_LEN {
        return Err(ProbeError::Truncated {
            offset: 0,
            needed: RIFF_HEADER_LEN as u64,
            available: data.len() as u64,
        });
    }
    if &data[0..4] != RIFF_MAGIC {
        return Err(ProbeError::invalid_signature("riff magic mismatch"));
    }
    let mut form_type = [0u8; 4];
    form_type.copy_from_slice(&data[8..12]);
    if &form_type != form {
        return Err(ProbeError::invalid_signature(format!(
            "riff form '{}', expected '{}'",
            fourcc_str(&form_type),
            fourcc_str(form)
        )));
    }

    let chunk_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as u64;
    Ok(RiffHeader {
        form_type,
        declared_size: chunk_size.saturating_add(8),
    })
}

/// Cursor over the chunks that follow the header, limited to the declared
/// RIFF size when the file is longer.
pub fn body<'a>(data: &'a [u8], header: &RiffHeader) -> ByteCursor<'a> {
    let end = (header.declared_size.min(data.len() as u64)) as usize;
    ByteCursor::with_base(&data[RIFF_HEADER_LEN..end.max(RIFF_HEADER_LEN)], RIFF_HEADER_LEN as u64)
}

/// One chunk. `data` never extends past the declared size or the parent.
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    pub id: [u8; 4],
    pub size: u32,
    /// Absolute offset of the chunk header.
    pub offset: u64,
    pub data: ByteCursor<'a>,
    /// The declared size ran past the end of the parent.
    pub truncated: bool,
}

impl<'a> Chunk<'a> {
    pub fn id_str(&self) -> String {
        fourcc_str(&self.id)
    }

    pub fn is_list(&self) -> bool {
        self.id == LIST
    }

    /// `{type, size, offset}` for a chunk kept without its payload.
    pub fn opaque(&self) -> Node {
        let mut node = Node::new();
        node.insert("type", self.id_str());
        node.insert("size", self.size);
        node.insert("offset", self.offset);
        node
    }

    pub fn truncation(&self) -> ProbeError {
        ProbeError::Truncated {
            offset: self.offset,
            needed: self.size as u64 + 8,
            available: self.data.len() as u64 + 8,
        }
    }
}

/// Iterator over sibling chunks.
///
/// Yields an error once if a chunk header is cut short, then stops.
pub struct Chunks<'a> {
    cursor: ByteCursor<'a>,
    done: bool,
}

impl<'a> Chunks<'a> {
    pub fn new(cursor: ByteCursor<'a>) -> Self {
        Self {
            cursor,
            done: false,
        }
    }

    fn next_chunk(&mut self) -> Result<Chunk<'a>> {
        let offset = self.cursor.offset();
        let id = self.cursor.fourcc()?;
        let size = self.cursor.le_u32()?;
        let available = self.cursor.remaining();
        let truncated = size as usize > available;
        let data = self.cursor.sub_cursor((size as usize).min(available))?;
        if size % 2 == 1 && !self.cursor.is_empty() {
            self.cursor.skip(1)?;
        }
        Ok(Chunk {
            id,
            size,
            offset,
            data,
            truncated,
        })
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor.is_empty() {
            return None;
        }
        let chunk = self.next_chunk();
        if chunk.is_err() {
            self.done = true;
        }
        Some(chunk)
    }
}
