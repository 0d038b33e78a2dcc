//! AVI (`RIFF....AVI `).
//!
//! `LIST` chunks are keyed by their list type (`hdrl`, `strl`, `INFO`, ...)
//! and other chunks by their fourcc. `movi` is never descended into; only
//! its position and size are kept. One [`Track`] is built per `strl`.

use serde::Serialize;
use tracing::trace;

use super::{body, parse_riff_header, Chunk, Chunks, AVI_FORM};
use crate::error::{ProbeError, Result};
use crate::options::ParseOptions;
use crate::reader::{fourcc_str, latin1, ByteCursor};
use crate::track::{fourcc_codec_name, MediaType, Track};
use crate::value::{ByteRef, Node, Value};
use crate::walk::Diagnostics;

const AVIF_HASINDEX: u32 = 0x10;
const AVIF_MUSTUSEINDEX: u32 = 0x20;
const AVIF_ISINTERLEAVED: u32 = 0x100;

const IDX1_ENTRY_LEN: u32 = 16;

/// Parse an AVI buffer.
pub fn parse(data: &[u8], opts: &ParseOptions) -> Result<Node> {
    let header = parse_riff_header(data, AVI_FORM)?;

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

    let tree = walker.walk(body(data, &header), 1, "RIFF");
    root.extend(tree);
    walker.summarize(&mut root);
    Ok(root)
}

/// `avih`
#[derive(Debug, Clone, Serialize)]
pub struct MainHeader {
    pub microsec_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub padding_granularity: u32,
    pub flags: u32,
    pub has_index: bool,
    pub must_use_index: bool,
    pub is_interleaved: bool,
    pub total_frames: u32,
    pub initial_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
}

impl MainHeader {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let microsec_per_frame = c.le_u32()?;
        let max_bytes_per_sec = c.le_u32()?;
        let padding_granularity = c.le_u32()?;
        let flags = c.le_u32()?;
        Ok(Self {
            microsec_per_frame,
            max_bytes_per_sec,
            padding_granularity,
            flags,
            has_index: flags & AVIF_HASINDEX != 0,
            must_use_index: flags & AVIF_MUSTUSEINDEX != 0,
            is_interleaved: flags & AVIF_ISINTERLEAVED != 0,
            total_frames: c.le_u32()?,
            initial_frames: c.le_u32()?,
            streams: c.le_u32()?,
            suggested_buffer_size: c.le_u32()?,
            width: c.le_u32()?,
            height: c.le_u32()?,
        })
    }
}

/// `strh`
#[derive(Debug, Clone, Serialize)]
pub struct StreamHeader {
    pub fcc_type: String,
    pub fcc_handler: String,
    pub flags: u32,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub suggested_buffer_size: u32,
    pub quality: i32,
    pub sample_size: u32,
    /// left, top, right, bottom
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<[i16; 4]>,
}

impl StreamHeader {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let fcc_type = fourcc_str(&c.fourcc()?);
        let fcc_handler = fourcc_str(&c.fourcc()?);
        let mut header = Self {
            fcc_type,
            fcc_handler,
            flags: c.le_u32()?,
            priority: c.le_u16()?,
            language: c.le_u16()?,
            initial_frames: c.le_u32()?,
            scale: c.le_u32()?,
            rate: c.le_u32()?,
            start: c.le_u32()?,
            length: c.le_u32()?,
            suggested_buffer_size: c.le_u32()?,
            quality: c.le_i32()?,
            sample_size: c.le_u32()?,
            frame: None,
        };
        // rcFrame is missing from some old writers
        if c.remaining() >= 8 {
            let mut frame = [0i16; 4];
            for v in frame.iter_mut() {
                *v = c.le_u16()? as i16;
            }
            header.frame = Some(frame);
        }
        Ok(header)
    }

    pub fn media_type(&self) -> MediaType {
        MediaType::from_avi(self.fcc_type.as_bytes())
    }

    /// `rate / scale`, when both are set.
    pub fn units_per_second(&self) -> Option<f64> {
        (self.scale > 0 && self.rate > 0).then(|| self.rate as f64 / self.scale as f64)
    }
}

/// `strf` for a video stream.
#[derive(Debug, Clone, Serialize)]
pub struct BitmapInfo {
    pub header_size: u32,
    pub width: i32,
    /// Negative for top-down bitmaps.
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: String,
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub colors_used: u32,
    pub colors_important: u32,
}

impl BitmapInfo {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        Ok(Self {
            header_size: c.le_u32()?,
            width: c.le_i32()?,
            height: c.le_i32()?,
            planes: c.le_u16()?,
            bit_count: c.le_u16()?,
            compression: compression_str(c.fourcc()?),
            size_image: c.le_u32()?,
            x_pels_per_meter: c.le_i32()?,
            y_pels_per_meter: c.le_i32()?,
            colors_used: c.le_u32()?,
            colors_important: c.le_u32()?,
        })
    }
}

/// `BI_RGB` and friends are small integers, not fourccs.
fn compression_str(raw: [u8; 4]) -> String {
    match u32::from_le_bytes(raw) {
        0 => "RGB".to_string(),
        1 => "RLE8".to_string(),
        2 => "RLE4".to_string(),
        3 => "BITFIELDS".to_string(),
        _ => fourcc_str(&raw),
    }
}

/// `strf` for an audio stream.
#[derive(Debug, Clone, Serialize)]
pub struct WaveFormat {
    pub format_tag: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_name: Option<&'static str>,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_size: Option<u16>,
}

impl WaveFormat {
    pub fn parse(c: &mut ByteCursor) -> Result<Self> {
        let format_tag = c.le_u16()?;
        Ok(Self {
            format_tag,
            format_name: wave_format_name(format_tag),
            channels: c.le_u16()?,
            samples_per_sec: c.le_u32()?,
            avg_bytes_per_sec: c.le_u32()?,
            block_align: c.le_u16()?,
            bits_per_sample: c.le_u16()?,
            extra_size: if c.remaining() >= 2 {
                Some(c.le_u16()?)
            } else {
                None
            },
        })
    }
}

/// Codec name for a `WAVEFORMATEX` format tag.
pub fn wave_format_name(tag: u16) -> Option<&'static str> {
    let name = match tag {
        0x0001 => "PCM",
        0x0002 => "ADPCM",
        0x0003 => "PCM Float",
        0x0006 => "A-law",
        0x0007 => "mu-law",
        0x0011 => "IMA ADPCM",
        0x0050 => "MP2",
        0x0055 => "MP3",
        0x00FF | 0x1610 => "AAC",
        0x0161 | 0x0162 | 0x0163 => "WMA",
        0x2000 => "AC-3",
        0x2001 => "DTS",
        0xF1AC => "FLAC",
        0xFFFE => "Extensible",
        _ => return None,
    };
    Some(name)
}

/// Friendly key for a `LIST INFO` sub-chunk.
pub fn info_tag_name(id: &[u8; 4]) -> Option<&'static str> {
    let name = match id {
        b"INAM" => "title",
        b"IART" => "artist",
        b"ICMT" => "comment",
        b"ICOP" => "copyright",
        b"ICRD" => "creation_date",
        b"IGNR" => "genre",
        b"ISFT" => "software",
        b"IENG" => "engineer",
        b"IPRD" => "product",
        b"ISBJ" => "subject",
        b"IKEY" => "keywords",
        b"ISRC" => "source",
        b"ITCH" => "technician",
        b"ILNG" => "language",
        b"IPRT" | b"ITRK" => "track_number",
        _ => return None,
    };
    Some(name)
}

#[derive(Debug, Default)]
struct Stream {
    header: Option<StreamHeader>,
    video: Option<BitmapInfo>,
    audio: Option<WaveFormat>,
    name: Option<String>,
}

impl Stream {
    fn into_track(self, index: usize) -> Track {
        let media_type = self
            .header
            .as_ref()
            .map_or(MediaType::Other, StreamHeader::media_type);
        let mut track = Track::new(index as u64, media_type);
        track.name = self.name;

        if let Some(header) = &self.header {
            track.timescale = (header.rate > 0).then_some(header.rate as u64);
            track.duration = Some(header.length as u64 * header.scale as u64);
            track.derive_seconds();
            if media_type == MediaType::Video {
                track.frame_rate = header
                    .units_per_second()
                    .map(|fps| (fps * 1000.0).round() / 1000.0);
            }
            let handler = header.fcc_handler.trim_end_matches(['.', ' ']);
            if !handler.is_empty() {
                track.codec_tag = Some(header.fcc_handler.clone());
            }
        }

        if let Some(video) = &self.video {
            if !matches!(video.compression.as_str(), "RGB" | "RLE8" | "RLE4" | "BITFIELDS")
                || track.codec_tag.is_none()
            {
                track.codec_tag = Some(video.compression.clone());
            }
            track.width = Some(video.width.unsigned_abs());
            track.height = Some(video.height.unsigned_abs());
            track.bits_per_sample = Some(video.bit_count as u32);
        }
        if let Some(audio) = &self.audio {
            track.codec_tag = Some(format!("0x{:04x}", audio.format_tag));
            track.codec_name = audio.format_name.map(str::to_string);
            track.sample_rate = Some(audio.samples_per_sec as f64);
            track.channels = Some(audio.channels as u32);
            if audio.bits_per_sample > 0 {
                track.bits_per_sample = Some(audio.bits_per_sample as u32);
            }
        }
        if track.codec_name.is_none() {
            track.codec_name = track
                .codec_tag
                .as_deref()
                .and_then(fourcc_codec_name)
                .map(str::to_string);
        }
        track
    }
}

struct Walker<'o> {
    opts: &'o ParseOptions,
    diagnostics: Diagnostics,
    total_chunks: u64,
    max_depth: usize,
    main_header: Option<MainHeader>,
    streams: Vec<Stream>,
    odml_total_frames: Option<u32>,
}

impl<'o> Walker<'o> {
    fn new(opts: &'o ParseOptions) -> Self {
        Self {
            opts,
            diagnostics: Diagnostics::new(),
            total_chunks: 0,
            max_depth: 0,
            main_header: None,
            streams: Vec::new(),
            odml_total_frames: None,
        }
    }

    fn walk(&mut self, cursor: ByteCursor, depth: usize, parent: &str) -> Node {
        let mut node = Node::new();
        self.max_depth = self.max_depth.max(depth);

        for chunk in Chunks::new(cursor) {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.diagnostics.record(&mut node, parent, &e);
                    break;
                }
            };
            self.total_chunks += 1;
            trace!(
                "chunk '{}' at {} size {} depth {}",
                chunk.id_str(),
                chunk.offset,
                chunk.size,
                depth
            );

            let (key, mut value) = self.visit(chunk.clone(), depth);
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

    fn visit(&mut self, chunk: Chunk, depth: usize) -> (String, Value) {
        if chunk.is_list() {
            return self.list(chunk, depth);
        }
        let key = chunk.id_str();
        match self.interpret(&chunk) {
            Ok(value) => (key, value),
            Err(e) => self.degrade(&chunk, &e),
        }
    }

    fn list(&mut self, chunk: Chunk, depth: usize) -> (String, Value) {
        let mut data = chunk.data.clone();
        let list_type = match data.fourcc() {
            Ok(list_type) => list_type,
            Err(e) => return self.degrade(&chunk, &e),
        };
        let key = fourcc_str(&list_type);

        match &list_type {
            b"movi" => {
                let mut node = Node::new();
                node.insert("offset", data.offset());
                node.insert("size", data.remaining());
                (key, Value::Map(node))
            }
            b"INFO" => (key, Value::Map(self.info(data))),
            _ => {
                if depth + 1 > self.opts.max_box_depth {
                    let err = ProbeError::malformed(format!(
                        "LIST nesting exceeds {}",
                        self.opts.max_box_depth
                    ));
                    let (_, value) = self.degrade(&chunk, &err);
                    return (key, value);
                }
                if &list_type == b"strl" {
                    self.streams.push(Stream::default());
                }
                (key, Value::Map(self.walk(data, depth + 1, "LIST")))
            }
        }
    }

    fn info(&mut self, data: ByteCursor) -> Node {
        let mut node = Node::new();
        for item in Chunks::new(data) {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    self.diagnostics.record(&mut node, "INFO", &e);
                    break;
                }
            };
            self.total_chunks += 1;
            let key = info_tag_name(&item.id).map_or_else(|| item.id_str(), str::to_string);
            let mut payload = item.data.clone();
            node.insert(key, latin1(payload.rest(), self.opts.max_text_bytes));
        }
        node
    }

    fn interpret(&mut self, chunk: &Chunk) -> Result<Value> {
        let mut c = chunk.data.clone();
        let value = match &chunk.id {
            b"avih" => {
                let header = MainHeader::parse(&mut c)?;
                let value = Value::record(&header);
                self.main_header = Some(header);
                value
            }
            b"strh" => {
                let header = StreamHeader::parse(&mut c)?;
                let value = Value::record(&header);
                self.stream().header = Some(header);
                value
            }
            b"strf" => self.stream_format(&mut c)?,
            b"strn" => {
                let name = latin1(c.rest(), self.opts.max_text_bytes);
                self.stream().name = Some(name.clone());
                Value::from(name)
            }
            b"dmlh" => {
                let total_frames = c.le_u32()?;
                self.odml_total_frames = Some(total_frames);
                let mut node = Node::new();
                node.insert("total_frames", total_frames);
                Value::Map(node)
            }
            b"idx1" => {
                let mut node = Node::new();
                node.insert("entries", chunk.size / IDX1_ENTRY_LEN);
                node.insert("offset", chunk.offset);
                Value::Map(node)
            }
            _ => Value::Map(chunk.opaque()),
        };
        Ok(value)
    }

    fn stream_format(&mut self, c: &mut ByteCursor) -> Result<Value> {
        let media_type = self
            .stream()
            .header
            .as_ref()
            .map_or(MediaType::Other, StreamHeader::media_type);
        match media_type {
            MediaType::Video => {
                let info = BitmapInfo::parse(c)?;
                let value = Value::record(&info);
                self.stream().video = Some(info);
                Ok(value)
            }
            MediaType::Audio => {
                let format = WaveFormat::parse(c)?;
                let value = Value::record(&format);
                self.stream().audio = Some(format);
                Ok(value)
            }
            _ => {
                let offset = c.offset();
                Ok(ByteRef::new(c.rest(), offset, self.opts.hash_payloads()).into())
            }
        }
    }

    /// Stream the current `strl` describes; a stray `strh` gets its own.
    fn stream(&mut self) -> &mut Stream {
        if self.streams.is_empty() {
            self.streams.push(Stream::default());
        }
        let last = self.streams.len() - 1;
        &mut self.streams[last]
    }

    fn degrade(&mut self, chunk: &Chunk, err: &ProbeError) -> (String, Value) {
        let mut node = chunk.opaque();
        let context = format!("'{}' at {}", chunk.id_str(), chunk.offset);
        self.diagnostics.record(&mut node, &context, err);
        (chunk.id_str(), Value::Map(node))
    }

    fn summarize(self, root: &mut Node) {
        root.insert("total_chunks", self.total_chunks);
        root.insert("max_depth", self.max_depth);

        if let Some(main) = &self.main_header {
            let total_frames = self.odml_total_frames.unwrap_or(main.total_frames);
            root.insert("total_frames", total_frames);
            if main.microsec_per_frame > 0 {
                let fps = 1_000_000.0 / main.microsec_per_frame as f64;
                root.insert("frame_rate", (fps * 1000.0).round() / 1000.0);
                root.insert(
                    "duration_seconds",
                    total_frames as f64 * main.microsec_per_frame as f64 / 1_000_000.0,
                );
            }
        }

        let tracks: Vec<Value> = self
            .streams
            .into_iter()
            .enumerate()
            .map(|(i, stream)| Value::record(&stream.into_track(i)))
            .collect();
        if !tracks.is_empty() {
            root.insert("tracks", Value::List(tracks));
        }
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

    fn list(list_type: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = list_type.to_vec();
        for child in children {
            payload.extend_from_slice(child);
        }
        chunk(b"LIST", &payload)
    }

    fn riff(children: &[Vec<u8>]) -> Vec<u8> {
        let mut payload = b"AVI ".to_vec();
        for child in children {
            payload.extend_from_slice(child);
        }
        chunk(b"RIFF", &payload)
    }

    fn avih(us_per_frame: u32, frames: u32, w: u32, h: u32) -> Vec<u8> {
        let mut p = Vec::new();
        for v in [us_per_frame, 0, 0, AVIF_HASINDEX, frames, 0, 2, 0, w, h, 0, 0, 0, 0] {
            p.extend_from_slice(&v.to_le_bytes());
        }
        chunk(b"avih", &p)
    }

    fn strh(fcc_type: &[u8; 4], handler: &[u8; 4], scale: u32, rate: u32, length: u32) -> Vec<u8> {
        let mut p = fcc_type.to_vec();
        p.extend_from_slice(handler);
        p.extend_from_slice(&0u32.to_le_bytes()); // flags
        p.extend_from_slice(&[0; 4]); // priority, language
        for v in [0, scale, rate, 0, length, 0] {
            p.extend_from_slice(&v.to_le_bytes());
        }
        p.extend_from_slice(&(-1i32).to_le_bytes());
        p.extend_from_slice(&0u32.to_le_bytes());
        p.extend_from_slice(&[0; 8]);
        chunk(b"strh", &p)
    }

    fn bitmap(w: i32, h: i32, compression: &[u8; 4]) -> Vec<u8> {
        let mut p = 40u32.to_le_bytes().to_vec();
        p.extend_from_slice(&w.to_le_bytes());
        p.extend_from_slice(&h.to_le_bytes());
        p.extend_from_slice(&1u16.to_le_bytes());
        p.extend_from_slice(&24u16.to_le_bytes());
        p.extend_from_slice(compression);
        p.extend_from_slice(&[0; 20]);
        chunk(b"strf", &p)
    }

    fn wave(tag: u16, channels: u16, rate: u32) -> Vec<u8> {
        let mut p = tag.to_le_bytes().to_vec();
        p.extend_from_slice(&channels.to_le_bytes());
        p.extend_from_slice(&rate.to_le_bytes());
        p.extend_from_slice(&(rate * 4).to_le_bytes());
        p.extend_from_slice(&4u16.to_le_bytes());
        p.extend_from_slice(&16u16.to_le_bytes());
        chunk(b"strf", &p)
    }

    fn sample_avi() -> Vec<u8> {
        riff(&[
            list(
                b"hdrl",
                &[
                    avih(40_000, 250, 640, 480),
                    list(
                        b"strl",
                        &[
                            strh(b"vids", b"XVID", 1, 25, 250),
                            bitmap(640, 480, b"XVID"),
                            chunk(b"strn", b"Video\0"),
                        ],
                    ),
                    list(b"strl", &[strh(b"auds", b"\0\0\0\0", 1, 44100, 441_000), wave(0x55, 2, 44100)]),
                    list(b"odml", &[chunk(b"dmlh", &300u32.to_le_bytes())]),
                ],
            ),
            list(b"INFO", &[chunk(b"ISFT", b"Lavf58.76.100\0"), chunk(b"IXYZ", b"odd")]),
            chunk(b"JUNK", &[0; 12]),
            list(b"movi", &[chunk(b"00dc", &[1, 2, 3, 4])]),
            chunk(b"idx1", &[0; 32]),
        ])
    }

    #[test]
    fn test_parse_avi_headers_and_tracks() {
        let root = parse(&sample_avi(), &ParseOptions::default()).unwrap();

        assert_eq!(root.get("form_type").and_then(Value::as_str), Some("AVI "));
        assert_eq!(root.lookup("hdrl.avih.width").and_then(Value::as_u64), Some(640));
        assert_eq!(root.lookup("hdrl.avih.has_index").and_then(Value::as_bool), Some(true));
        assert_eq!(root.lookup("hdrl.odml.dmlh.total_frames").and_then(Value::as_u64), Some(300));
        assert_eq!(root.get("total_frames").and_then(Value::as_u64), Some(300));
        assert_eq!(root.get("frame_rate").and_then(Value::as_f64), Some(25.0));
        assert_eq!(root.get("duration_seconds").and_then(Value::as_f64), Some(12.0));
        assert!(root.get("error").is_none());

        let tracks = root.get("tracks").and_then(Value::as_list).unwrap();
        assert_eq!(tracks.len(), 2);
        let video = tracks[0].as_map().unwrap();
        assert_eq!(video.get("media_type").and_then(Value::as_str), Some("video"));
        assert_eq!(video.get("codec_name").and_then(Value::as_str), Some("MPEG-4"));
        assert_eq!(video.get("frame_rate").and_then(Value::as_f64), Some(25.0));
        assert_eq!(video.get("duration_seconds").and_then(Value::as_f64), Some(10.0));
        assert_eq!(video.get("name").and_then(Value::as_str), Some("Video"));
        let audio = tracks[1].as_map().unwrap();
        assert_eq!(audio.get("codec_name").and_then(Value::as_str), Some("MP3"));
        assert_eq!(audio.get("channels").and_then(Value::as_u64), Some(2));
    }

    #[test]
    fn test_info_movi_idx1_and_unknown() {
        let root = parse(&sample_avi(), &ParseOptions::default()).unwrap();

        assert_eq!(root.lookup("INFO.software").and_then(Value::as_str), Some("Lavf58.76.100"));
        assert_eq!(root.lookup("INFO.IXYZ").and_then(Value::as_str), Some("odd"));
        assert_eq!(root.lookup("movi.size").and_then(Value::as_u64), Some(12));
        assert_eq!(root.lookup("idx1.entries").and_then(Value::as_u64), Some(2));
        assert_eq!(root.lookup("JUNK.size").and_then(Value::as_u64), Some(12));
        // movi children are not walked
        assert!(root.lookup("movi.00dc").is_none());
    }

    #[test]
    fn test_truncated_avi_keeps_headers() {
        let data = sample_avi();
        let cut = &data[..data.len() - 20];
        let root = parse(cut, &ParseOptions::default()).unwrap();

        assert_eq!(root.lookup("hdrl.avih.width").and_then(Value::as_u64), Some(640));
        let error = root.get("error").and_then(Value::as_str).unwrap();
        assert!(error.contains("Truncated"), "{}", error);
    }

    #[test]
    fn test_short_strh_degrades() {
        let data = riff(&[list(b"hdrl", &[list(b"strl", &[chunk(b"strh", b"vids")])])]);
        let root = parse(&data, &ParseOptions::default()).unwrap();

        let strh = root.lookup("hdrl.strl.strh").and_then(Value::as_map).unwrap();
        assert_eq!(strh.get("type").and_then(Value::as_str), Some("strh"));
        assert!(strh.contains_key("error"));
        assert!(root.contains_key("error"));
    }

    #[test]
    fn test_list_depth_limit() {
        let mut nested = list(b"deep", &[]);
        for _ in 0..8 {
            nested = list(b"deep", &[nested]);
        }
        let root = parse(&riff(&[nested]), &ParseOptions::default()).unwrap();

        let error = root.get("error").and_then(Value::as_str).unwrap();
        assert!(error.contains("nesting"), "{}", error);
        assert_eq!(root.get("max_depth").and_then(Value::as_u64), Some(6));
    }

    #[test]
    fn test_wave_format_names() {
        assert_eq!(wave_format_name(0x2000), Some("AC-3"));
        assert_eq!(wave_format_name(0x1234), None);
        assert_eq!(info_tag_name(b"INAM"), Some("title"));
    }
}
