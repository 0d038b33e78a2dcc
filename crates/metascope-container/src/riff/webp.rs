//! WebP (`RIFF....WEBP`).
//!
//! Chunks sit directly under the RIFF header. The root is keyed by chunk
//! fourcc with trailing spaces dropped (`VP8`, `XMP`), and summarises the
//! image as `format`, `width`, `height`, `has_alpha` and `animated`.
//! Animation frames are counted; only the first few `ANMF` chunks are
//! listed.

use serde::Serialize;
use tracing::trace;

use super::{body, parse_riff_header, Chunk, Chunks, WEBP_FORM};
use crate::error::{ProbeError, Result};
use crate::options::ParseOptions;
use crate::reader::{fourcc_str, ByteCursor};
use crate::value::{ByteRef, Node, Value};
use crate::walk::Diagnostics;

const VP8_START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];
const VP8L_SIGNATURE: u8 = 0x2F;

const VP8X_ICC: u8 = 0x20;
const VP8X_ALPHA: u8 = 0x10;
const VP8X_EXIF: u8 = 0x08;
const VP8X_XMP: u8 = 0x04;
const VP8X_ANIMATION: u8 = 0x02;

/// Parse a WebP buffer.
pub fn parse(data: &[u8], opts: &ParseOptions) -> Result<Node> {
    let header = parse_riff_header(data, WEBP_FORM)?;

    let mut walker = Walker::new(opts);
    let mut root = Node::new();
    root.insert("form_type", fourcc_str(&header.form_type));
    root.insert("riff_size", header.declared_size);
    if header.declared_size > data.len() as u64 {
        let err = ProbeError::Truncated {
            offset: 0,
            needed: header.declared_size,
            available: data.len() as u64,
        };
        walker.diagnostics.record(&mut root, "RIFF", &err);
    }

    let chunks = walker.walk(body(data, &header));
    walker.summarize(&mut root);
    root.extend(chunks);
    Ok(root)
}

/// Simple-format lossy bitstream header (`VP8 `).
#[derive(Debug, Clone, Serialize)]
pub struct Vp8Header {
    pub version: u8,
    pub show_frame: bool,
    pub first_partition_size: u32,
    pub width: u16,
    pub height: u16,
    pub horizontal_scale: u8,
    pub vertical_scale: u8,
}

impl Vp8Header {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let tag = c.le_u24()?;
        if tag & 1 != 0 {
            return Err(ProbeError::unsupported("VP8 interframe"));
        }
        if c.read_exact(3)? != VP8_START_CODE {
            return Err(ProbeError::malformed("VP8 start code missing"));
        }
        let w = c.le_u16()?;
        let h = c.le_u16()?;
        Ok(Self {
            version: ((tag >> 1) & 0x07) as u8,
            show_frame: (tag >> 4) & 1 == 1,
            first_partition_size: tag >> 5,
            width: w & 0x3FFF,
            height: h & 0x3FFF,
            horizontal_scale: (w >> 14) as u8,
            vertical_scale: (h >> 14) as u8,
        })
    }
}

/// Lossless bitstream header (`VP8L`).
#[derive(Debug, Clone, Serialize)]
pub struct Vp8lHeader {
    pub width: u32,
    pub height: u32,
    pub alpha_is_used: bool,
    pub version: u8,
}

impl Vp8lHeader {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        if c.u8()? != VP8L_SIGNATURE {
            return Err(ProbeError::malformed("VP8L signature missing"));
        }
        let bits = c.le_u32()?;
        Ok(Self {
            width: (bits & 0x3FFF) + 1,
            height: ((bits >> 14) & 0x3FFF) + 1,
            alpha_is_used: (bits >> 28) & 1 == 1,
            version: (bits >> 29) as u8,
        })
    }
}

/// Extended-format header (`VP8X`).
#[derive(Debug, Clone, Serialize)]
pub struct Vp8xHeader {
    pub flags: u8,
    pub icc: bool,
    pub alpha: bool,
    pub exif: bool,
    pub xmp: bool,
    pub animation: bool,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Vp8xHeader {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let flags = c.u8()?;
        c.skip(3)?;
        Ok(Self {
            flags,
            icc: flags & VP8X_ICC != 0,
            alpha: flags & VP8X_ALPHA != 0,
            exif: flags & VP8X_EXIF != 0,
            xmp: flags & VP8X_XMP != 0,
            animation: flags & VP8X_ANIMATION != 0,
            canvas_width: c.le_u24()? + 1,
            canvas_height: c.le_u24()? + 1,
        })
    }
}

/// Global animation parameters (`ANIM`).
#[derive(Debug, Clone, Serialize)]
pub struct Animation {
    /// `#RRGGBBAA`
    pub background_color: String,
    /// 0 loops forever.
    pub loop_count: u16,
}

impl Animation {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let [b, g, r, a] = c.le_u32()?.to_le_bytes();
        Ok(Self {
            background_color: format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a),
            loop_count: c.le_u16()?,
        })
    }
}

/// One animation frame (`ANMF`).
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub x_offset: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
    pub duration_ms: u32,
    pub blend: bool,
    pub dispose_to_background: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitstream: Option<&'static str>,
}

impl Frame {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let x_offset = c.le_u24()? * 2;
        let y_offset = c.le_u24()? * 2;
        let width = c.le_u24()? + 1;
        let height = c.le_u24()? + 1;
        let duration_ms = c.le_u24()?;
        let flags = c.u8()?;

        let bitstream = Chunks::new(c.clone())
            .filter_map(|chunk| chunk.ok())
            .find_map(|chunk| match &chunk.id {
                b"VP8 " => Some("lossy"),
                b"VP8L" => Some("lossless"),
                _ => None,
            });
        Ok(Self {
            x_offset,
            y_offset,
            width,
            height,
            duration_ms,
            blend: flags & 0x02 == 0,
            dispose_to_background: flags & 0x01 != 0,
            bitstream,
        })
    }
}

/// Alpha channel chunk header (`ALPH`).
fn alpha(c: &mut ByteCursor) -> Result<Node> {
    let flags = c.u8()?;
    let mut node = Node::new();
    node.insert(
        "compression",
        match flags & 0x03 {
            0 => "none",
            1 => "lossless",
            _ => "reserved",
        },
    );
    node.insert(
        "filtering",
        match (flags >> 2) & 0x03 {
            0 => "none",
            1 => "horizontal",
            2 => "vertical",
            _ => "gradient",
        },
    );
    node.insert("preprocessing", (flags >> 4) & 0x03 == 1);
    node.insert("size", c.remaining() + 1);
    Ok(node)
}

struct Walker<'o> {
    opts: &'o ParseOptions,
    diagnostics: Diagnostics,
    total_chunks: u64,
    vp8: Option<Vp8Header>,
    vp8l: Option<Vp8lHeader>,
    vp8x: Option<Vp8xHeader>,
    has_alph: bool,
    frames: u64,
    duration_ms: u64,
}

impl<'o> Walker<'o> {
    fn new(opts: &'o ParseOptions) -> Self {
        Self {
            opts,
            diagnostics: Diagnostics::new(),
            total_chunks: 0,
            vp8: None,
            vp8l: None,
            vp8x: None,
            has_alph: false,
            frames: 0,
            duration_ms: 0,
        }
    }

    fn walk(&mut self, cursor: ByteCursor) -> Node {
        let mut node = Node::new();
        for chunk in Chunks::new(cursor) {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.diagnostics.record(&mut node, "WEBP", &e);
                    break;
                }
            };
            self.total_chunks += 1;
            trace!("chunk '{}' at {} size {}", chunk.id_str(), chunk.offset, chunk.size);

            let key = chunk.id_str().trim_end().to_string();
            let mut value = match self.interpret(&chunk) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    let mut opaque = chunk.opaque();
                    let context = format!("'{}' at {}", chunk.id_str(), chunk.offset);
                    self.diagnostics.record(&mut opaque, &context, &e);
                    Value::Map(opaque)
                }
            };
            if chunk.truncated {
                let context = format!("'{}' at {}", chunk.id_str(), chunk.offset);
                match &mut value {
                    Value::Map(child) => self.diagnostics.record(child, &context, &chunk.truncation()),
                    _ => self.diagnostics.record(&mut node, &context, &chunk.truncation()),
                }
            }
            node.insert(key, value);
        }
        node
    }

    /// `None` for chunks counted but not listed.
    fn interpret(&mut self, chunk: &Chunk) -> Result<Option<Value>> {
        let mut c = chunk.data.clone();
        let value = match &chunk.id {
            b"VP8 " => {
                let header = Vp8Header::parse(&mut c)?;
                let value = Value::record(&header);
                self.vp8 = Some(header);
                value
            }
            b"VP8L" => {
                let header = Vp8lHeader::parse(&mut c)?;
                let value = Value::record(&header);
                self.vp8l = Some(header);
                value
            }
            b"VP8X" => {
                let header = Vp8xHeader::parse(&mut c)?;
                let value = Value::record(&header);
                self.vp8x = Some(header);
                value
            }
            b"ANIM" => Value::record(&Animation::parse(&mut c)?),
            b"ANMF" => {
                let frame = Frame::parse(&mut c)?;
                self.frames += 1;
                self.duration_ms += frame.duration_ms as u64;
                if self.frames > self.opts.preview_entries as u64 {
                    return Ok(None);
                }
                Value::record(&frame)
            }
            b"ALPH" => {
                self.has_alph = true;
                Value::Map(alpha(&mut c)?)
            }
            b"ICCP" | b"EXIF" | b"XMP " => {
                let offset = c.offset();
                ByteRef::new(c.rest(), offset, self.opts.hash_payloads()).into()
            }
            _ => Value::Map(chunk.opaque()),
        };
        Ok(Some(value))
    }

    fn summarize(self, root: &mut Node) {
        let (format, dims) = if let Some(x) = &self.vp8x {
            ("extended", Some((x.canvas_width, x.canvas_height)))
        } else if let Some(l) = &self.vp8l {
            ("lossless", Some((l.width, l.height)))
        } else if let Some(v) = &self.vp8 {
            ("lossy", Some((v.width as u32, v.height as u32)))
        } else {
            ("unknown", None)
        };
        root.insert("format", format);
        if let Some((width, height)) = dims {
            root.insert("width", width);
            root.insert("height", height);
        }

        let has_alpha = self.has_alph
            || self.vp8x.as_ref().is_some_and(|x| x.alpha)
            || self.vp8l.as_ref().is_some_and(|l| l.alpha_is_used);
        root.insert("has_alpha", has_alpha);
        root.insert(
            "animated",
            self.frames > 0 || self.vp8x.as_ref().is_some_and(|x| x.animation),
        );
        if self.frames > 0 {
            root.insert("frames", self.frames);
            root.insert("duration_ms", self.duration_ms);
        }
        root.insert("total_chunks", self.total_chunks);

        self.diagnostics.finish(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = id.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn webp(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = b"WEBP".to_vec();
        for c in chunks {
            payload.extend_from_slice(c);
        }
        chunk(b"RIFF", &payload)
    }

    fn vp8(width: u16, height: u16) -> Vec<u8> {
        // key frame, version 0, shown, partition size 0
        let mut p = vec![0x10, 0x00, 0x00];
        p.extend_from_slice(&VP8_START_CODE);
        p.extend_from_slice(&width.to_le_bytes());
        p.extend_from_slice(&height.to_le_bytes());
        p.extend_from_slice(&[0; 4]);
        chunk(b"VP8 ", &p)
    }

    fn vp8x(flags: u8, width: u32, height: u32) -> Vec<u8> {
        let mut p = vec![flags, 0, 0, 0];
        p.extend_from_slice(&(width - 1).to_le_bytes()[..3]);
        p.extend_from_slice(&(height - 1).to_le_bytes()[..3]);
        chunk(b"VP8X", &p)
    }

    fn anmf(duration: u32) -> Vec<u8> {
        let mut p = Vec::new();
        for v in [0u32, 0, 15, 15, duration] {
            p.extend_from_slice(&v.to_le_bytes()[..3]);
        }
        p.push(0);
        p.extend_from_slice(&vp8(16, 16));
        chunk(b"ANMF", &p)
    }

    #[test]
    fn test_simple_lossy() {
        let root = parse(&webp(&[vp8(320, 240)]), &ParseOptions::default()).unwrap();
        assert_eq!(root.get("format").and_then(Value::as_str), Some("lossy"));
        assert_eq!(root.get("width").and_then(Value::as_u64), Some(320));
        assert_eq!(root.get("height").and_then(Value::as_u64), Some(240));
        assert_eq!(root.lookup("VP8.show_frame").and_then(Value::as_bool), Some(true));
        assert_eq!(root.get("has_alpha").and_then(Value::as_bool), Some(false));
        assert!(root.get("error").is_none());
    }

    #[test]
    fn test_lossless_dimensions() {
        // width 100, height 50, alpha used
        let bits: u32 = 99 | (49 << 14) | (1 << 28);
        let mut p = vec![VP8L_SIGNATURE];
        p.extend_from_slice(&bits.to_le_bytes());
        let root = parse(&webp(&[chunk(b"VP8L", &p)]), &ParseOptions::default()).unwrap();

        assert_eq!(root.get("format").and_then(Value::as_str), Some("lossless"));
        assert_eq!(root.get("width").and_then(Value::as_u64), Some(100));
        assert_eq!(root.get("height").and_then(Value::as_u64), Some(50));
        assert_eq!(root.get("has_alpha").and_then(Value::as_bool), Some(true));
    }

    #[test]
    fn test_extended_animation() {
        let data = webp(&[
            vp8x(VP8X_ANIMATION | VP8X_XMP, 400, 300),
            chunk(b"ANIM", &[0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00]),
            anmf(100),
            anmf(150),
            chunk(b"XMP ", b"<x:xmpmeta/>"),
        ]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        assert_eq!(root.get("format").and_then(Value::as_str), Some("extended"));
        assert_eq!(root.get("width").and_then(Value::as_u64), Some(400));
        assert_eq!(root.get("animated").and_then(Value::as_bool), Some(true));
        assert_eq!(root.get("frames").and_then(Value::as_u64), Some(2));
        assert_eq!(root.get("duration_ms").and_then(Value::as_u64), Some(250));
        assert_eq!(root.lookup("VP8X.xmp").and_then(Value::as_bool), Some(true));
        assert_eq!(
            root.lookup("ANIM.background_color").and_then(Value::as_str),
            Some("#ff0000ff")
        );
        assert_eq!(root.get_all("ANMF").count(), 2);
        assert_eq!(
            root.lookup("ANMF.bitstream").and_then(Value::as_str),
            Some("lossy")
        );
        assert!(matches!(root.get("XMP"), Some(Value::Bytes(r)) if r.size == 12));
    }

    #[test]
    fn test_anmf_listing_is_bounded() {
        let mut chunks = vec![vp8x(VP8X_ANIMATION, 16, 16)];
        chunks.extend((0..5).map(|_| anmf(10)));
        let opts = ParseOptions {
            preview_entries: 2,
            ..ParseOptions::default()
        };
        let root = parse(&webp(&chunks), &opts).unwrap();

        assert_eq!(root.get_all("ANMF").count(), 2);
        assert_eq!(root.get("frames").and_then(Value::as_u64), Some(5));
        assert_eq!(root.get("total_chunks").and_then(Value::as_u64), Some(6));
    }

    #[test]
    fn test_bad_vp8_degrades() {
        let data = webp(&[chunk(b"VP8 ", &[0x10, 0, 0, 1, 2, 3, 0, 0, 0, 0])]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        assert_eq!(root.lookup("VP8.type").and_then(Value::as_str), Some("VP8 "));
        assert!(root.lookup("VP8.error").is_some());
        assert_eq!(root.get("format").and_then(Value::as_str), Some("unknown"));
        assert!(root.get("error").is_some());
    }

    #[test]
    fn test_wrong_form_rejected() {
        let mut data = webp(&[vp8(1, 1)]);
        data[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(
            parse(&data, &ParseOptions::default()),
            Err(ProbeError::InvalidSignature(_))
        ));
    }
}
