//! PNG chunk walker.
//!
//! After the 8-byte signature a PNG is a run of `<be32 length> <type>
//! <data> <crc>` chunks ending at `IEND`. CRCs are skipped, not checked.
//! Known chunks are decoded under their lowercased type (`ihdr`, `phys`)
//! and a chunk that fails to decode is kept under its own type name;
//! text chunks are gathered under `text` keyed by keyword. Chunks with no
//! interpreter are listed under `unknown` as `{type, size, offset}`. Every
//! chunk is tallied in `chunk_counts`.

use std::io::Read;

use flate2::read::ZlibDecoder;
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{ProbeError, Result};
use crate::options::ParseOptions;
use crate::reader::{fourcc_str, latin1, ByteCursor};
use crate::value::{ByteRef, Node, Value};
use crate::walk::Diagnostics;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Chunk lengths are limited to 2^31 - 1.
const MAX_CHUNK_LEN: u32 = 0x7FFF_FFFF;

/// Keywords are 1 to 79 bytes.
const MAX_KEYWORD_LEN: usize = 79;

const XMP_KEYWORD: &str = "XML:com.adobe.xmp";

/// Parse a PNG buffer.
pub fn parse(data: &[u8], opts: &ParseOptions) -> Result<Node> {
    if data.len() < PNG_SIGNATURE.len() {
        return Err(ProbeError::Truncated {
            offset: 0,
            needed: PNG_SIGNATURE.len() as u64,
            available: data.len() as u64,
        });
    }
    if data[..8] != PNG_SIGNATURE {
        return Err(ProbeError::invalid_signature("png signature mismatch"));
    }

    let mut walker = Walker::new(opts);
    let mut cursor = ByteCursor::with_base(&data[8..], 8);
    let mut root = walker.walk(&mut cursor);
    walker.summarize(&mut root);
    Ok(root)
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub color_type_name: &'static str,
    pub compression_method: u8,
    pub filter_method: u8,
    pub interlace_method: u8,
    pub interlaced: bool,
}

impl ImageHeader {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let width = c.be_u32()?;
        let height = c.be_u32()?;
        if width == 0 || height == 0 {
            return Err(ProbeError::malformed("IHDR has a zero dimension"));
        }
        let bit_depth = c.u8()?;
        let color_type = c.u8()?;
        let compression_method = c.u8()?;
        let filter_method = c.u8()?;
        let interlace_method = c.u8()?;
        Ok(Self {
            width,
            height,
            bit_depth,
            color_type,
            color_type_name: color_type_name(color_type),
            compression_method,
            filter_method,
            interlace_method,
            interlaced: interlace_method == 1,
        })
    }
}

pub fn color_type_name(color_type: u8) -> &'static str {
    match color_type {
        0 => "grayscale",
        2 => "rgb",
        3 => "indexed",
        4 => "grayscale_alpha",
        6 => "rgba",
        _ => "unknown",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PhysicalDimensions {
    pub pixels_per_unit_x: u32,
    pub pixels_per_unit_y: u32,
    pub unit: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi_x: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi_y: Option<u32>,
}

impl PhysicalDimensions {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let x = c.be_u32()?;
        let y = c.be_u32()?;
        let meter = c.u8()? == 1;
        let dpi = |ppm: u32| (ppm as f64 * 0.0254).round() as u32;
        Ok(Self {
            pixels_per_unit_x: x,
            pixels_per_unit_y: y,
            unit: if meter { "meter" } else { "unknown" },
            dpi_x: meter.then(|| dpi(x)),
            dpi_y: meter.then(|| dpi(y)),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Chromaticities {
    pub white_point_x: f64,
    pub white_point_y: f64,
    pub red_x: f64,
    pub red_y: f64,
    pub green_x: f64,
    pub green_y: f64,
    pub blue_x: f64,
    pub blue_y: f64,
}

impl Chromaticities {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let mut v = [0f64; 8];
        for slot in v.iter_mut() {
            *slot = c.be_u32()? as f64 / 100_000.0;
        }
        Ok(Self {
            white_point_x: v[0],
            white_point_y: v[1],
            red_x: v[2],
            red_y: v[3],
            green_x: v[4],
            green_y: v[5],
            blue_x: v[6],
            blue_y: v[7],
        })
    }
}

/// APNG `fcTL`.
#[derive(Debug, Clone, Serialize)]
pub struct FrameControl {
    pub sequence_number: u32,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub delay_num: u16,
    pub delay_den: u16,
    pub dispose_op: u8,
    pub blend_op: u8,
}

impl FrameControl {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            sequence_number: c.be_u32()?,
            width: c.be_u32()?,
            height: c.be_u32()?,
            x_offset: c.be_u32()?,
            y_offset: c.be_u32()?,
            delay_num: c.be_u16()?,
            delay_den: c.be_u16()?,
            dispose_op: c.u8()?,
            blend_op: c.u8()?,
        })
    }

    /// Delay in seconds; a zero denominator means 1/100 s.
    pub fn delay_seconds(&self) -> f64 {
        let den = if self.delay_den == 0 { 100 } else { self.delay_den };
        self.delay_num as f64 / den as f64
    }
}

/// `tIME` as an ISO 8601 string.
fn modification_time(c: &mut ByteCursor) -> Result<String> {
    let year = c.be_u16()?;
    let [month, day, hour, minute, second] = [c.u8()?, c.u8()?, c.u8()?, c.u8()?, c.u8()?];
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(ProbeError::malformed(format!("tIME month {} day {}", month, day)));
    }
    Ok(format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        year, month, day, hour, minute, second
    ))
}

/// Split `keyword\0rest`, requiring a 1 to 79 byte keyword.
fn keyword(c: &mut ByteCursor) -> Result<String> {
    let start = c.position();
    let data = c.peek(c.remaining())?;
    let Some(nul) = data.iter().position(|&b| b == 0) else {
        return Err(ProbeError::malformed("keyword is not NUL-terminated"));
    };
    if nul == 0 || nul > MAX_KEYWORD_LEN {
        return Err(ProbeError::malformed(format!("keyword length {}", nul)));
    }
    let keyword = latin1(&data[..nul], MAX_KEYWORD_LEN);
    c.seek(start + nul + 1)?;
    Ok(keyword)
}

/// Bytes up to the next NUL, consuming the NUL.
fn until_nul<'a>(c: &mut ByteCursor<'a>) -> Result<&'a [u8]> {
    let data = c.peek(c.remaining())?;
    let Some(nul) = data.iter().position(|&b| b == 0) else {
        return Err(ProbeError::malformed("field is not NUL-terminated"));
    };
    let field = c.read_exact(nul)?;
    c.skip(1)?;
    Ok(field)
}

/// Inflate a zlib stream, refusing output past `limit` bytes.
pub fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(ProbeError::unsupported(format!(
            "inflated text exceeds {} bytes",
            limit
        )));
    }
    Ok(out)
}

/// A decoded text chunk.
struct TextEntry {
    keyword: String,
    text: Option<String>,
    /// Raw value kept as a reference (XMP, or compressed text left alone).
    payload: Option<ByteRef>,
    language: Option<String>,
    translated_keyword: Option<String>,
}

struct Walker<'o> {
    opts: &'o ParseOptions,
    diagnostics: Diagnostics,
    chunks_total: u64,
    chunk_counts: Node,
    unknown: Vec<Value>,
    idat_bytes: u64,
    text: Node,
    xmp: Option<ByteRef>,
    color_type: Option<u8>,
    first_fctl: Option<FrameControl>,
    fctl_delay: f64,
    seen_iend: bool,
}

impl<'o> Walker<'o> {
    fn new(opts: &'o ParseOptions) -> Self {
        Self {
            opts,
            diagnostics: Diagnostics::new(),
            chunks_total: 0,
            chunk_counts: Node::new(),
            unknown: Vec::new(),
            idat_bytes: 0,
            text: Node::new(),
            xmp: None,
            color_type: None,
            first_fctl: None,
            fctl_delay: 0.0,
            seen_iend: false,
        }
    }

    fn count(&mut self, name: &str) {
        self.chunks_total += 1;
        match self.chunk_counts.get_mut(name) {
            Some(Value::UInt(n)) => *n += 1,
            _ => self.chunk_counts.insert(name, 1u64),
        }
    }

    fn walk(&mut self, cursor: &mut ByteCursor) -> Node {
        let mut root = Node::new();

        while !cursor.is_empty() {
            let offset = cursor.offset();
            let header = cursor.be_u32().and_then(|len| Ok((len, cursor.fourcc()?)));
            let (length, chunk_type) = match header {
                Ok(header) => header,
                Err(e) => {
                    self.diagnostics.record(&mut root, "chunk header", &e);
                    break;
                }
            };
            let name = fourcc_str(&chunk_type);
            trace!("chunk '{}' at {} length {}", name, offset, length);
            self.count(&name);

            if length > MAX_CHUNK_LEN {
                let err = ProbeError::malformed(format!("chunk length {} exceeds 2^31-1", length));
                self.diagnostics.record(&mut root, &format!("'{}' at {}", name, offset), &err);
                break;
            }
            let available = cursor.remaining();
            let Ok(data) = cursor.sub_cursor((length as usize).min(available)) else {
                break;
            };
            let truncated = length as usize > available;

            self.visit(&mut root, &chunk_type, &name, offset, data);

            if truncated {
                let err = ProbeError::Truncated {
                    offset,
                    needed: length as u64 + 12,
                    available: available as u64 + 8,
                };
                self.diagnostics.record(&mut root, &format!("'{}' at {}", name, offset), &err);
                break;
            }
            if &chunk_type == b"IEND" {
                self.seen_iend = true;
                break;
            }
            // CRC
            if let Err(e) = cursor.skip(4) {
                self.diagnostics.record(&mut root, &format!("'{}' crc", name), &e);
                break;
            }
        }
        root
    }

    fn visit(&mut self, root: &mut Node, chunk_type: &[u8; 4], name: &str, offset: u64, data: ByteCursor) {
        let size = data.len();
        match self.interpret(root, chunk_type, data) {
            Ok(()) => {}
            Err(e) => {
                let mut node = Node::new();
                node.insert("type", name);
                node.insert("size", size);
                node.insert("offset", offset);
                self.diagnostics
                    .record(&mut node, &format!("'{}' at {}", name, offset), &e);
                root.insert(name, node);
            }
        }
    }

    fn interpret(&mut self, root: &mut Node, chunk_type: &[u8; 4], mut c: ByteCursor) -> Result<()> {
        let hash = self.opts.hash_payloads();
        match chunk_type {
            b"IHDR" => {
                let header = ImageHeader::parse(&mut c)?;
                self.color_type = Some(header.color_type);
                root.insert("ihdr", Value::record(&header));
            }
            b"PLTE" => {
                if c.len() % 3 != 0 {
                    return Err(ProbeError::malformed(format!("PLTE length {} not a multiple of 3", c.len())));
                }
                let mut node = Node::new();
                node.insert("entries", c.len() / 3);
                root.insert("plte", node);
            }
            b"IDAT" => self.idat_bytes += c.len() as u64,
            b"IEND" => {}
            b"pHYs" => root.insert("phys", Value::record(&PhysicalDimensions::parse(&mut c)?)),
            b"gAMA" => {
                let gamma = c.be_u32()? as f64 / 100_000.0;
                root.insert("gama", gamma);
            }
            b"sRGB" => {
                let intent = c.u8()?;
                let mut node = Node::new();
                node.insert("rendering_intent", intent);
                node.insert(
                    "rendering_intent_name",
                    match intent {
                        0 => "perceptual",
                        1 => "relative_colorimetric",
                        2 => "saturation",
                        3 => "absolute_colorimetric",
                        _ => "unknown",
                    },
                );
                root.insert("srgb", node);
            }
            b"cHRM" => root.insert("chrm", Value::record(&Chromaticities::parse(&mut c)?)),
            b"iCCP" => {
                let profile_name = keyword(&mut c)?;
                let compression_method = c.u8()?;
                let offset = c.offset();
                let mut node = Node::new();
                node.insert("profile_name", profile_name);
                node.insert("compression_method", compression_method);
                node.insert("profile", ByteRef::new(c.rest(), offset, hash));
                root.insert("iccp", node);
            }
            b"eXIf" => {
                let offset = c.offset();
                root.insert("exif", ByteRef::new(c.rest(), offset, hash));
            }
            b"tIME" => root.insert("time", modification_time(&mut c)?),
            b"bKGD" => root.insert("bkgd", true),
            b"tRNS" => root.insert("trns", self.transparency(&mut c)?),
            b"tEXt" => {
                let keyword = keyword(&mut c)?;
                let text = latin1(c.rest(), self.opts.max_text_bytes);
                self.add_text(TextEntry {
                    keyword,
                    text: Some(text),
                    payload: None,
                    language: None,
                    translated_keyword: None,
                });
            }
            b"zTXt" => {
                let keyword = keyword(&mut c)?;
                let method = c.u8()?;
                let entry = self.compressed_text(keyword, method, &mut c, false)?;
                self.add_text(entry);
            }
            b"iTXt" => {
                let keyword = keyword(&mut c)?;
                let compressed = c.u8()? == 1;
                let method = c.u8()?;
                let language = String::from_utf8_lossy(until_nul(&mut c)?).into_owned();
                let translated = String::from_utf8_lossy(until_nul(&mut c)?).into_owned();
                let mut entry = if compressed {
                    self.compressed_text(keyword, method, &mut c, true)?
                } else {
                    let offset = c.offset();
                    let raw = c.rest();
                    let end = raw.len().min(self.opts.max_text_bytes);
                    TextEntry {
                        keyword,
                        text: Some(String::from_utf8_lossy(&raw[..end]).into_owned()),
                        payload: Some(ByteRef::new(raw, offset, hash)),
                        language: None,
                        translated_keyword: None,
                    }
                };
                entry.language = (!language.is_empty()).then_some(language);
                entry.translated_keyword = (!translated.is_empty()).then_some(translated);
                self.add_text(entry);
            }
            b"acTL" => {
                let mut node = Node::new();
                node.insert("num_frames", c.be_u32()?);
                node.insert("num_plays", c.be_u32()?);
                root.insert("actl", node);
            }
            b"fcTL" => {
                let control = FrameControl::parse(&mut c)?;
                self.fctl_delay += control.delay_seconds();
                if self.first_fctl.is_none() {
                    self.first_fctl = Some(control);
                }
            }
            b"fdAT" => {}
            _ => {
                if chunk_type[0].is_ascii_uppercase() {
                    debug!("unknown critical chunk '{}'", fourcc_str(chunk_type));
                }
                let mut node = Node::new();
                node.insert("type", fourcc_str(chunk_type));
                node.insert("size", c.len());
                node.insert("offset", c.offset().saturating_sub(8));
                self.unknown.push(Value::Map(node));
            }
        }
        Ok(())
    }

    fn transparency(&self, c: &mut ByteCursor) -> Result<Node> {
        let mut node = Node::new();
        match self.color_type {
            Some(0) => node.insert("gray", c.be_u16()?),
            Some(2) => {
                node.insert("red", c.be_u16()?);
                node.insert("green", c.be_u16()?);
                node.insert("blue", c.be_u16()?);
            }
            Some(3) => node.insert("alpha_entries", c.len()),
            _ => node.insert("size", c.len()),
        }
        Ok(node)
    }

    fn compressed_text(
        &mut self,
        keyword: String,
        method: u8,
        c: &mut ByteCursor,
        utf8: bool,
    ) -> Result<TextEntry> {
        if method != 0 {
            return Err(ProbeError::unsupported(format!("compression method {}", method)));
        }
        let offset = c.offset();
        let compressed = c.rest();
        let hash = self.opts.hash_payloads();
        if !self.opts.capabilities.inflate_text {
            return Ok(TextEntry {
                keyword,
                text: None,
                payload: Some(ByteRef::new(compressed, offset, hash)),
                language: None,
                translated_keyword: None,
            });
        }

        let raw = inflate(compressed, self.opts.max_inflated_bytes)?;
        let end = raw.len().min(self.opts.max_text_bytes);
        let text = if utf8 {
            String::from_utf8_lossy(&raw[..end]).into_owned()
        } else {
            latin1(&raw[..end], end)
        };
        Ok(TextEntry {
            keyword,
            text: Some(text),
            payload: Some(ByteRef::new(&raw, offset, hash)),
            language: None,
            translated_keyword: None,
        })
    }

    fn add_text(&mut self, entry: TextEntry) {
        if entry.keyword == XMP_KEYWORD {
            self.xmp = entry.payload;
            return;
        }
        let value = match (entry.text, entry.language, entry.translated_keyword) {
            (Some(text), None, None) => Value::Str(text),
            (text, language, translated) => {
                let mut node = Node::new();
                node.insert_opt("text", text);
                node.insert_opt("language", language);
                node.insert_opt("translated_keyword", translated);
                if node.get("text").is_none() {
                    node.insert_opt("compressed", entry.payload);
                }
                Value::Map(node)
            }
        };
        self.text.insert(entry.keyword, value);
    }

    fn summarize(self, root: &mut Node) {
        if !self.text.is_empty() {
            root.insert("text", self.text);
        }
        if let Some(xmp) = self.xmp {
            root.insert("xmp", xmp);
        }
        if let Some(count) = self.chunk_counts.get("IDAT").and_then(Value::as_u64) {
            let mut idat = Node::new();
            idat.insert("count", count);
            idat.insert("bytes", self.idat_bytes);
            root.insert("idat", idat);
        }
        if let Some(first) = &self.first_fctl {
            let mut animation = Node::new();
            animation.insert("first_frame", Value::record(first));
            animation.insert_opt("frame_controls", self.chunk_counts.get("fcTL").and_then(Value::as_u64));
            animation.insert("duration_seconds", self.fctl_delay);
            root.insert("fctl", animation);
        }
        if !self.unknown.is_empty() {
            root.insert("unknown", Value::List(self.unknown));
        }
        root.insert("chunks_total", self.chunks_total);
        root.insert("chunk_counts", self.chunk_counts);
        root.insert("complete", self.seen_iend);
        self.diagnostics.finish(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0; 4]);
        out
    }

    fn ihdr(width: u32, height: u32, color_type: u8) -> Vec<u8> {
        let mut data = width.to_be_bytes().to_vec();
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, color_type, 0, 0, 0]);
        chunk(b"IHDR", &data)
    }

    fn png(chunks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        for c in chunks {
            out.extend_from_slice(c);
        }
        out
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_png_with_text() {
        let data = png(&[
            ihdr(100, 100, 6),
            chunk(b"tEXt", b"Title\0Sunset"),
            chunk(b"IDAT", &[0; 10]),
            chunk(b"IDAT", &[0; 6]),
            chunk(b"IEND", &[]),
        ]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        assert_eq!(root.lookup("ihdr.width").and_then(Value::as_u64), Some(100));
        assert_eq!(root.lookup("ihdr.height").and_then(Value::as_u64), Some(100));
        assert_eq!(root.lookup("ihdr.color_type_name").and_then(Value::as_str), Some("rgba"));
        assert_eq!(root.lookup("text.Title").and_then(Value::as_str), Some("Sunset"));
        assert_eq!(root.lookup("idat.count").and_then(Value::as_u64), Some(2));
        assert_eq!(root.lookup("idat.bytes").and_then(Value::as_u64), Some(16));
        assert_eq!(root.get("chunks_total").and_then(Value::as_u64), Some(5));
        assert_eq!(root.lookup("chunk_counts.IDAT").and_then(Value::as_u64), Some(2));
        assert_eq!(root.get("complete").and_then(Value::as_bool), Some(true));
        assert!(root.get("error").is_none());
    }

    #[test]
    fn test_unknown_chunks_keep_type_and_size() {
        let data = png(&[
            ihdr(8, 8, 2),
            chunk(b"prVt", &[0xAB; 1234]),
            chunk(b"IEND", &[]),
        ]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        let unknown = root.get("unknown").and_then(Value::as_list).unwrap();
        assert_eq!(unknown.len(), 1);
        let entry = unknown[0].as_map().unwrap();
        assert_eq!(entry.get("type").and_then(Value::as_str), Some("prVt"));
        assert_eq!(entry.get("size").and_then(Value::as_u64), Some(1234));
        // signature 8 + IHDR 25
        assert_eq!(entry.get("offset").and_then(Value::as_u64), Some(33));
        assert_eq!(root.lookup("chunk_counts.prVt").and_then(Value::as_u64), Some(1));
        assert!(root.get("error").is_none());
    }

    #[test]
    fn test_ancillary_chunks() {
        let mut phys = 2835u32.to_be_bytes().to_vec();
        phys.extend_from_slice(&2835u32.to_be_bytes());
        phys.push(1);
        let data = png(&[
            ihdr(4, 4, 3),
            chunk(b"PLTE", &[0; 12]),
            chunk(b"tRNS", &[255, 0]),
            chunk(b"pHYs", &phys),
            chunk(b"gAMA", &45455u32.to_be_bytes()),
            chunk(b"sRGB", &[0]),
            chunk(b"tIME", &[0x07, 0xE8, 3, 15, 12, 30, 5]),
            chunk(b"bKGD", &[0]),
            chunk(b"iCCP", b"sRGB\0\0abcdef"),
            chunk(b"eXIf", b"MM\0*"),
            chunk(b"prVt", &[1, 2, 3]),
            chunk(b"IEND", &[]),
        ]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        assert_eq!(root.lookup("plte.entries").and_then(Value::as_u64), Some(4));
        assert_eq!(root.lookup("trns.alpha_entries").and_then(Value::as_u64), Some(2));
        assert_eq!(root.lookup("phys.dpi_x").and_then(Value::as_u64), Some(72));
        assert_eq!(root.lookup("phys.unit").and_then(Value::as_str), Some("meter"));
        assert_eq!(root.get("gama").and_then(Value::as_f64), Some(0.45455));
        assert_eq!(
            root.lookup("srgb.rendering_intent_name").and_then(Value::as_str),
            Some("perceptual")
        );
        assert_eq!(root.get("time").and_then(Value::as_str), Some("2024-03-15T12:30:05"));
        assert_eq!(root.get("bkgd").and_then(Value::as_bool), Some(true));
        assert_eq!(root.lookup("iccp.profile_name").and_then(Value::as_str), Some("sRGB"));
        assert!(matches!(root.lookup("iccp.profile"), Some(Value::Bytes(r)) if r.size == 6));
        assert!(matches!(root.get("exif"), Some(Value::Bytes(r)) if r.size == 4));
        assert_eq!(root.lookup("chunk_counts.prVt").and_then(Value::as_u64), Some(1));
        assert!(root.get("error").is_none());
    }

    #[test]
    fn test_ztxt_and_itxt() {
        let mut ztxt = b"Comment\0\0".to_vec();
        ztxt.extend_from_slice(&zlib(b"compressed words"));

        let mut itxt = b"Description\0\0\0en\0Beschreibung\0".to_vec();
        itxt.extend_from_slice("caf\u{e9}".as_bytes());

        let mut xmp = b"XML:com.adobe.xmp\0\0\0\0\0".to_vec();
        xmp.extend_from_slice(b"<x:xmpmeta/>");

        let data = png(&[
            ihdr(1, 1, 0),
            chunk(b"zTXt", &ztxt),
            chunk(b"iTXt", &itxt),
            chunk(b"iTXt", &xmp),
            chunk(b"IEND", &[]),
        ]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        assert_eq!(
            root.lookup("text.Comment").and_then(Value::as_str),
            Some("compressed words")
        );
        assert_eq!(
            root.lookup("text.Description.text").and_then(Value::as_str),
            Some("caf\u{e9}")
        );
        assert_eq!(
            root.lookup("text.Description.language").and_then(Value::as_str),
            Some("en")
        );
        assert!(matches!(root.get("xmp"), Some(Value::Bytes(r)) if r.size == 12));
    }

    #[test]
    fn test_inflate_disabled_keeps_reference() {
        let mut ztxt = b"Comment\0\0".to_vec();
        let compressed = zlib(b"compressed words");
        ztxt.extend_from_slice(&compressed);
        let data = png(&[ihdr(1, 1, 0), chunk(b"zTXt", &ztxt), chunk(b"IEND", &[])]);

        let mut opts = ParseOptions::default();
        opts.capabilities.inflate_text = false;
        let root = parse(&data, &opts).unwrap();

        assert!(matches!(
            root.lookup("text.Comment.compressed"),
            Some(Value::Bytes(r)) if r.size == compressed.len() as u64
        ));
    }

    #[test]
    fn test_inflate_limit() {
        let bomb = zlib(&vec![b'a'; 4096]);
        assert!(inflate(&bomb, 1024).is_err());
        assert_eq!(inflate(&bomb, 4096).unwrap().len(), 4096);
    }

    #[test]
    fn test_apng_frame_controls() {
        let mut fctl = 0u32.to_be_bytes().to_vec();
        for v in [10u32, 10, 0, 0] {
            fctl.extend_from_slice(&v.to_be_bytes());
        }
        fctl.extend_from_slice(&1u16.to_be_bytes());
        fctl.extend_from_slice(&10u16.to_be_bytes());
        fctl.extend_from_slice(&[0, 0]);

        let mut actl = 2u32.to_be_bytes().to_vec();
        actl.extend_from_slice(&0u32.to_be_bytes());
        let data = png(&[
            ihdr(10, 10, 6),
            chunk(b"acTL", &actl),
            chunk(b"fcTL", &fctl),
            chunk(b"IDAT", &[0]),
            chunk(b"fcTL", &fctl),
            chunk(b"fdAT", &[0; 5]),
            chunk(b"IEND", &[]),
        ]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        assert_eq!(root.lookup("actl.num_frames").and_then(Value::as_u64), Some(2));
        assert_eq!(root.lookup("fctl.frame_controls").and_then(Value::as_u64), Some(2));
        assert_eq!(root.lookup("fctl.duration_seconds").and_then(Value::as_f64), Some(0.2));
        assert_eq!(root.lookup("fctl.first_frame.width").and_then(Value::as_u64), Some(10));
    }

    #[test]
    fn test_truncated_idat_stops_walk() {
        let mut data = png(&[ihdr(8, 8, 2), chunk(b"IDAT", &[0; 100])]);
        data.truncate(data.len() - 60);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        assert_eq!(root.lookup("ihdr.width").and_then(Value::as_u64), Some(8));
        assert_eq!(root.get("complete").and_then(Value::as_bool), Some(false));
        let error = root.get("error").and_then(Value::as_str).unwrap();
        assert!(error.contains("IDAT"), "{}", error);
    }

    #[test]
    fn test_bad_chunk_degrades_and_continues() {
        let data = png(&[
            ihdr(3, 3, 2),
            chunk(b"tIME", &[0x07, 0xE8, 13, 1, 0, 0, 0]),
            chunk(b"gAMA", &100_000u32.to_be_bytes()),
            chunk(b"IEND", &[]),
        ]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        assert!(root.lookup("tIME.error").is_some());
        assert!(root.get("time").is_none());
        assert_eq!(root.get("gama").and_then(Value::as_f64), Some(1.0));
        assert!(root.get("error").is_some());
    }

    #[test]
    fn test_signature() {
        assert!(matches!(
            parse(b"\x89PNG\r\n", &ParseOptions::default()),
            Err(ProbeError::Truncated { .. })
        ));
        assert!(matches!(
            parse(b"GIF89a\0\0\0\0", &ParseOptions::default()),
            Err(ProbeError::InvalidSignature(_))
        ));
    }
}
