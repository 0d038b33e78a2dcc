//! GIF block walker.
//!
//! After the header and logical screen descriptor, a GIF is a sequence of
//! blocks picked by a sentinel byte: `0x2C` image descriptor, `0x21`
//! extension, `0x3B` trailer. Image data and extension payloads are runs of
//! length-prefixed sub-blocks ending at a zero length; they are skipped
//! unless the extension is one that carries metadata.

use serde::Serialize;
use tracing::trace;

use crate::error::{ProbeError, Result};
use crate::options::ParseOptions;
use crate::reader::{latin1, ByteCursor};
use crate::value::{ByteRef, Node, Value};
use crate::walk::Diagnostics;

const HEADER_LEN: usize = 6;

const IMAGE_DESCRIPTOR: u8 = 0x2C;
const EXTENSION: u8 = 0x21;
const TRAILER: u8 = 0x3B;

const PLAIN_TEXT: u8 = 0x01;
const GRAPHIC_CONTROL: u8 = 0xF9;
const COMMENT: u8 = 0xFE;
const APPLICATION: u8 = 0xFF;

/// Parse a GIF buffer.
pub fn parse(data: &[u8], opts: &ParseOptions) -> Result<Node> {
    if data.len() < HEADER_LEN {
        return Err(ProbeError::Truncated {
            offset: 0,
            needed: HEADER_LEN as u64,
            available: data.len() as u64,
        });
    }
    if &data[..3] != b"GIF" {
        return Err(ProbeError::invalid_signature("gif signature mismatch"));
    }
    let version = &data[3..6];
    if !version.iter().all(u8::is_ascii_alphanumeric) {
        return Err(ProbeError::invalid_signature("gif version is not printable"));
    }

    let mut walker = Walker::new(opts);
    let mut root = Node::new();
    root.insert("version", latin1(version, 3));

    let mut c = ByteCursor::with_base(&data[HEADER_LEN..], HEADER_LEN as u64);
    match ScreenDescriptor::parse(&mut c) {
        Ok(screen) => {
            let table = screen.global_color_table_size;
            root.insert("logical_screen", Value::record(&screen));
            if let Err(e) = c.skip(table * 3) {
                walker.diagnostics.record(&mut root, "global color table", &e);
            } else {
                walker.walk(&mut c, &mut root);
            }
        }
        Err(e) => walker.diagnostics.record(&mut root, "logical screen descriptor", &e),
    }
    walker.summarize(&mut root);
    Ok(root)
}

/// Logical screen descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenDescriptor {
    pub width: u16,
    pub height: u16,
    pub has_global_color_table: bool,
    pub color_resolution: u8,
    pub sorted: bool,
    /// Entries, not bytes.
    pub global_color_table_size: usize,
    pub background_color_index: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_aspect_ratio: Option<f64>,
}

impl ScreenDescriptor {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let width = c.le_u16()?;
        let height = c.le_u16()?;
        let packed = c.u8()?;
        let background_color_index = c.u8()?;
        let aspect = c.u8()?;
        let has_global_color_table = packed & 0x80 != 0;
        Ok(Self {
            width,
            height,
            has_global_color_table,
            color_resolution: ((packed >> 4) & 0x07) + 1,
            sorted: packed & 0x08 != 0,
            global_color_table_size: if has_global_color_table {
                table_entries(packed)
            } else {
                0
            },
            background_color_index,
            pixel_aspect_ratio: (aspect != 0).then(|| (aspect as f64 + 15.0) / 64.0),
        })
    }
}

/// Colour table entries encoded in the low three bits of a packed field.
fn table_entries(packed: u8) -> usize {
    1 << ((packed & 0x07) + 1)
}

/// Image descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct ImageDescriptor {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub has_local_color_table: bool,
    pub interlaced: bool,
    pub local_color_table_size: usize,
    pub lzw_minimum_code_size: u8,
}

impl ImageDescriptor {
    /// Read the descriptor, skip its local colour table and image data.
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let left = c.le_u16()?;
        let top = c.le_u16()?;
        let width = c.le_u16()?;
        let height = c.le_u16()?;
        let packed = c.u8()?;
        let has_local_color_table = packed & 0x80 != 0;
        let local_color_table_size = if has_local_color_table {
            table_entries(packed)
        } else {
            0
        };
        c.skip(local_color_table_size * 3)?;
        let lzw_minimum_code_size = c.u8()?;
        skip_sub_blocks(c)?;
        Ok(Self {
            left,
            top,
            width,
            height,
            has_local_color_table,
            interlaced: packed & 0x40 != 0,
            local_color_table_size,
            lzw_minimum_code_size,
        })
    }
}

/// Graphic control extension.
#[derive(Debug, Clone, Serialize)]
pub struct GraphicControl {
    pub disposal_method: u8,
    pub disposal: &'static str,
    pub user_input: bool,
    pub delay_ms: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparent_color_index: Option<u8>,
}

impl GraphicControl {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let block_size = c.u8()?;
        if block_size != 4 {
            return Err(ProbeError::malformed(format!(
                "graphic control block size {}",
                block_size
            )));
        }
        let packed = c.u8()?;
        let delay = c.le_u16()?;
        let transparent = c.u8()?;
        skip_sub_blocks(c)?;

        let disposal_method = (packed >> 2) & 0x07;
        Ok(Self {
            disposal_method,
            disposal: match disposal_method {
                0 => "unspecified",
                1 => "none",
                2 => "restore_background",
                3 => "restore_previous",
                _ => "reserved",
            },
            user_input: packed & 0x02 != 0,
            delay_ms: delay as u32 * 10,
            transparent_color_index: (packed & 0x01 != 0).then_some(transparent),
        })
    }
}

/// Skip a sub-block chain, returning the payload byte count.
fn skip_sub_blocks(c: &mut ByteCursor) -> Result<usize> {
    let mut total = 0;
    loop {
        let len = c.u8()? as usize;
        if len == 0 {
            return Ok(total);
        }
        c.skip(len)?;
        total += len;
    }
}

/// Concatenate a sub-block chain, keeping at most `limit` bytes.
fn read_sub_blocks(c: &mut ByteCursor, limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let len = c.u8()? as usize;
        if len == 0 {
            return Ok(out);
        }
        let block = c.read_exact(len)?;
        let room = limit.saturating_sub(out.len());
        out.extend_from_slice(&block[..len.min(room)]);
    }
}

struct Walker<'o> {
    opts: &'o ParseOptions,
    diagnostics: Diagnostics,
    total_blocks: u64,
    frames: u64,
    interlaced: bool,
    first_image: Option<ImageDescriptor>,
    first_control: Option<GraphicControl>,
    delay_ms: u64,
    controls: u64,
    loop_count: Option<u16>,
    comments: Vec<String>,
    plain_text: u64,
    applications: Vec<Value>,
    xmp: Option<ByteRef>,
    complete: bool,
}

impl<'o> Walker<'o> {
    fn new(opts: &'o ParseOptions) -> Self {
        Self {
            opts,
            diagnostics: Diagnostics::new(),
            total_blocks: 0,
            frames: 0,
            interlaced: false,
            first_image: None,
            first_control: None,
            delay_ms: 0,
            controls: 0,
            loop_count: None,
            comments: Vec::new(),
            plain_text: 0,
            applications: Vec::new(),
            xmp: None,
            complete: false,
        }
    }

    fn walk(&mut self, c: &mut ByteCursor, root: &mut Node) {
        while !c.is_empty() {
            let offset = c.offset();
            let Ok(sentinel) = c.u8() else { break };
            self.total_blocks += 1;
            trace!("block 0x{:02x} at {}", sentinel, offset);

            let result = match sentinel {
                IMAGE_DESCRIPTOR => self.image(c),
                EXTENSION => self.extension(c),
                TRAILER => {
                    self.complete = true;
                    return;
                }
                other => Err(ProbeError::malformed(format!("unknown block 0x{:02x}", other))),
            };
            if let Err(e) = result {
                let context = format!("block 0x{:02x} at {}", sentinel, offset);
                self.diagnostics.record(root, &context, &e);
                return;
            }
        }
        // Ran out of input before the trailer
        let err = ProbeError::Truncated {
            offset: c.offset(),
            needed: 1,
            available: 0,
        };
        self.diagnostics.record(root, "trailer", &err);
    }

    fn image(&mut self, c: &mut ByteCursor) -> Result<()> {
        let image = ImageDescriptor::parse(c)?;
        self.frames += 1;
        self.interlaced |= image.interlaced;
        if self.first_image.is_none() {
            self.first_image = Some(image);
        }
        Ok(())
    }

    fn extension(&mut self, c: &mut ByteCursor) -> Result<()> {
        match c.u8()? {
            GRAPHIC_CONTROL => {
                let control = GraphicControl::parse(c)?;
                self.controls += 1;
                self.delay_ms += control.delay_ms as u64;
                if self.first_control.is_none() {
                    self.first_control = Some(control);
                }
            }
            COMMENT => {
                let raw = read_sub_blocks(c, self.opts.max_text_bytes)?;
                self.comments.push(latin1(&raw, raw.len()));
            }
            APPLICATION => self.application(c)?,
            PLAIN_TEXT => {
                self.plain_text += 1;
                skip_sub_blocks(c)?;
            }
            _ => {
                skip_sub_blocks(c)?;
            }
        }
        Ok(())
    }

    fn application(&mut self, c: &mut ByteCursor) -> Result<()> {
        let len = c.u8()? as usize;
        if len != 11 {
            return Err(ProbeError::malformed(format!(
                "application identifier block size {}",
                len
            )));
        }
        let identifier = latin1(c.read_exact(8)?, 8);
        let auth_code = latin1(c.read_exact(3)?, 3);
        let full = format!("{}{}", identifier, auth_code);

        if full == "NETSCAPE2.0" || full == "ANIMEXTS1.0" {
            let data = read_sub_blocks(c, 3)?;
            if data.len() == 3 && data[0] == 1 {
                self.loop_count = Some(u16::from_le_bytes([data[1], data[2]]));
            }
        } else if full.contains("XMP Data") || full.to_ascii_lowercase().contains("xmp") {
            // XMP is stored raw, so the length bytes are part of the packet
            let offset = c.offset();
            let mut payload = c.clone();
            let start = c.position();
            skip_sub_blocks(c)?;
            let raw = payload.read_exact(c.position() - start)?;
            self.xmp = Some(ByteRef::new(raw, offset, self.opts.hash_payloads()));
        } else {
            skip_sub_blocks(c)?;
        }

        let mut node = Node::new();
        node.insert("identifier", identifier);
        node.insert("auth_code", auth_code);
        self.applications.push(Value::Map(node));
        Ok(())
    }

    fn summarize(self, root: &mut Node) {
        root.insert("frames", self.frames);
        root.insert("animated", self.frames > 1);
        root.insert("interlaced", self.interlaced);
        if let Some(image) = &self.first_image {
            root.insert("first_image", Value::record(image));
        }
        if let Some(control) = &self.first_control {
            root.insert("graphic_control", Value::record(control));
            root.insert("graphic_controls", self.controls);
            root.insert("duration_ms", self.delay_ms);
        }
        root.insert_opt("loop_count", self.loop_count);
        if !self.comments.is_empty() {
            root.insert("comments", self.comments);
        }
        if self.plain_text > 0 {
            root.insert("plain_text_blocks", self.plain_text);
        }
        if !self.applications.is_empty() {
            root.insert("applications", Value::List(self.applications));
        }
        root.insert_opt("xmp", self.xmp);
        root.insert("total_blocks", self.total_blocks);
        root.insert("complete", self.complete);
        self.diagnostics.finish(root);
    }
}
