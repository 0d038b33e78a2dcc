//! Matroska / WebM (EBML).
//!
//! Elements are decoded through a fixed ID table ([`elements::lookup`]);
//! unknown IDs are skipped by their declared size. A few masters get a
//! dedicated pass once their children are decoded:
//!
//! - `info`: `duration_seconds` from `duration` and `timestamp_scale`
//! - `track_entry`: a unified [`Track`] and, for AVC/HEVC/AV1, the decoded
//!   `CodecPrivate`
//! - `tag`: `SimpleTag` name/value pairs flattened into one map
//! - `chapter_atom`: start/end in seconds and the first display title
//!
//! `Cluster`, `Cues` and `SeekHead` are only counted; their contents are
//! block data and index entries.

pub mod elements;

use metascope_codec::Codec;
use tracing::trace;

use crate::ebml::{read_element_header, read_float, read_int, read_uint, EbmlSize, ElementHeader};
use crate::error::{ProbeError, Result};
use crate::options::ParseOptions;
use crate::reader::{text, ByteCursor};
use crate::track::{codec_id_to_name, MediaType, Track};
use crate::value::{ByteRef, Node, Value};
use crate::walk::Diagnostics;

use elements::{ElementSpec, Kind};

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Parse a Matroska/WebM buffer into an element tree.
pub fn parse(data: &[u8], opts: &ParseOptions) -> Result<Node> {
    if data.len() < EBML_MAGIC.len() {
        return Err(ProbeError::Truncated {
            offset: 0,
            needed: EBML_MAGIC.len() as u64,
            available: data.len() as u64,
        });
    }
    if data[..4] != EBML_MAGIC {
        return Err(ProbeError::invalid_signature("missing EBML header"));
    }

    let mut walker = Walker::new(opts);
    let mut root = walker.walk(ByteCursor::new(data), 1);
    walker.summarize(&mut root);
    Ok(root)
}

struct Walker<'a, 'o> {
    opts: &'o ParseOptions,
    diagnostics: Diagnostics,
    total_elements: u64,
    skipped_elements: u64,
    max_depth: usize,
    doc_type: Option<String>,
    duration_seconds: Option<f64>,
    tracks: Vec<Track>,
    codec_private: Option<&'a [u8]>,
    cluster_count: u64,
    first_cluster_offset: Option<u64>,
}

impl<'a, 'o> Walker<'a, 'o> {
    fn new(opts: &'o ParseOptions) -> Self {
        Self {
            opts,
            diagnostics: Diagnostics::new(),
            total_elements: 0,
            skipped_elements: 0,
            max_depth: 0,
            doc_type: None,
            duration_seconds: None,
            tracks: Vec::new(),
            codec_private: None,
            cluster_count: 0,
            first_cluster_offset: None,
        }
    }

    fn walk(&mut self, mut cursor: ByteCursor<'a>, depth: usize) -> Node {
        let mut node = Node::new();
        self.max_depth = self.max_depth.max(depth);

        while !cursor.is_empty() {
            let header = match read_element_header(&mut cursor) {
                Ok(header) => header,
                Err(e) => {
                    self.diagnostics.record(&mut node, "element header", &e);
                    break;
                }
            };
            self.total_elements += 1;

            let spec = elements::lookup(header.id);
            let is_master = spec.is_some_and(|s| s.kind == Kind::Master);
            let remaining = cursor.remaining();
            let (len, truncated) = match header.size {
                EbmlSize::Known(n) if n > remaining as u64 => (remaining, true),
                EbmlSize::Known(n) => (n as usize, false),
                EbmlSize::Unknown if is_master => (unknown_extent(&cursor, header.id), false),
                EbmlSize::Unknown => {
                    let err = ProbeError::malformed(format!(
                        "unknown size on non-master element {:#X}",
                        header.id
                    ));
                    self.diagnostics.record(&mut node, "element size", &err);
                    break;
                }
            };
            let Ok(payload) = cursor.sub_cursor(len) else {
                break;
            };
            trace!(
                "element {:#X} at {} len {} depth {}",
                header.id,
                header.offset,
                len,
                depth
            );

            let Some(spec) = spec else {
                if header.id != elements::VOID && header.id != elements::CRC32 {
                    self.skipped_elements += 1;
                }
                continue;
            };

            let value = if spec.kind == Kind::Master {
                self.master(&header, spec, payload, depth)
            } else {
                Some(match self.leaf(&header, spec, payload) {
                    Ok(value) => value,
                    Err(e) => {
                        let mut degraded = opaque(&header, len);
                        self.diagnostics.record(&mut degraded, spec.name, &e);
                        Value::Map(degraded)
                    }
                })
            };

            if truncated {
                let err = ProbeError::Truncated {
                    offset: header.offset,
                    needed: header.header_len as u64 + header.size.known().unwrap_or(0),
                    available: (header.header_len + remaining) as u64,
                };
                self.diagnostics.record(&mut node, spec.name, &err);
            }
            if let Some(value) = value {
                node.insert(spec.name, value);
            }
        }
        node
    }

    /// Decode a master element. `None` means it was only counted.
    fn master(
        &mut self,
        header: &ElementHeader,
        spec: ElementSpec,
        payload: ByteCursor<'a>,
        depth: usize,
    ) -> Option<Value> {
        if depth + 1 > self.opts.max_element_depth {
            let mut node = opaque(header, payload.len());
            let err = ProbeError::malformed(format!(
                "element nesting exceeds depth limit {}",
                self.opts.max_element_depth
            ));
            self.diagnostics.record(&mut node, spec.name, &err);
            return Some(Value::Map(node));
        }

        match header.id {
            elements::CLUSTER => {
                self.cluster_count += 1;
                self.first_cluster_offset.get_or_insert(header.offset);
                return None;
            }
            elements::CUES => {
                let mut node = Node::new();
                node.insert("cue_points", self.count_children(payload, elements::CUE_POINT));
                return Some(Value::Map(node));
            }
            elements::SEEK_HEAD => {
                let mut node = Node::new();
                node.insert("seek_entries", self.count_children(payload, elements::SEEK));
                return Some(Value::Map(node));
            }
            elements::TRACK_ENTRY => self.codec_private = None,
            _ => {}
        }

        let mut children = self.walk(payload, depth + 1);
        match header.id {
            elements::EBML => {
                self.doc_type = children
                    .get("doc_type")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            elements::INFO => self.interpret_info(&mut children),
            elements::TRACK_ENTRY => self.interpret_track(&mut children),
            elements::TAG => children = interpret_tag(&children),
            elements::CHAPTER_ATOM => interpret_chapter(&mut children),
            _ => {}
        }
        Some(Value::Map(children))
    }

    fn leaf(&mut self, header: &ElementHeader, spec: ElementSpec, mut payload: ByteCursor<'a>) -> Result<Value> {
        let offset = payload.offset();
        let bytes = payload.rest();

        Ok(match spec.kind {
            Kind::UInt => Value::UInt(read_uint(bytes)?),
            Kind::Int => Value::Int(read_int(bytes)?),
            Kind::Float => Value::Float(read_float(bytes)?),
            Kind::Str | Kind::Utf8 => Value::Str(text(bytes, self.opts.max_text_bytes)),
            Kind::Date => {
                let nanos = read_int(bytes)?;
                Value::Int(nanos.div_euclid(1_000_000_000) + elements::MATROSKA_EPOCH_OFFSET)
            }
            Kind::Binary => {
                // Identifiers are shown as hex; every other binary payload,
                // whatever its size, is a reference.
                if header.id == elements::SEGMENT_UID {
                    Value::Str(hex::encode(bytes))
                } else {
                    if header.id == elements::CODEC_PRIVATE {
                        self.codec_private = Some(bytes);
                    }
                    Value::Bytes(ByteRef::new(bytes, offset, self.opts.hash_payloads()))
                }
            }
            Kind::Master => {
                return Err(ProbeError::malformed(format!("{} decoded as a leaf", spec.name)))
            }
        })
    }

    /// Count direct children with `id`, skipping everything by size.
    fn count_children(&mut self, mut cursor: ByteCursor<'a>, id: u32) -> u64 {
        let mut count = 0;
        while !cursor.is_empty() {
            let Ok(header) = read_element_header(&mut cursor) else {
                break;
            };
            self.total_elements += 1;
            if header.id == id {
                count += 1;
            }
            let Some(size) = header.size.known() else {
                break;
            };
            if size > cursor.remaining() as u64 || cursor.skip(size as usize).is_err() {
                break;
            }
        }
        count
    }

    fn interpret_info(&mut self, info: &mut Node) {
        let scale = info
            .get("timestamp_scale")
            .and_then(Value::as_u64)
            .unwrap_or(elements::DEFAULT_TIMESTAMP_SCALE);
        if let Some(duration) = info.get("duration").and_then(Value::as_f64) {
            let seconds = duration * scale as f64 / 1e9;
            info.insert("duration_seconds", seconds);
            self.duration_seconds = Some(seconds);
        }
    }

    fn interpret_track(&mut self, entry: &mut Node) {
        let number = entry.get("track_number").and_then(Value::as_u64).unwrap_or(0);
        let media_type =
            MediaType::from_matroska(entry.get("track_type").and_then(Value::as_u64).unwrap_or(0));
        let mut track = Track::new(number, media_type);

        let codec_id = entry.get("codec_id").and_then(Value::as_str).map(str::to_string);
        track.codec_name = codec_id.as_deref().map(codec_id_to_name);
        track.name = entry.get("name").and_then(Value::as_str).map(str::to_string);
        track.language = entry
            .get("language_bcp47")
            .or_else(|| entry.get("language"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some("eng".to_string()));
        track.duration_seconds = self.duration_seconds;

        if let Some(video) = entry.get("video").and_then(Value::as_map) {
            track.width = video.get("pixel_width").and_then(Value::as_u64).map(|w| w as u32);
            track.height = video.get("pixel_height").and_then(Value::as_u64).map(|h| h as u32);
            if let Some(frame_ns) = entry.get("default_duration").and_then(Value::as_u64) {
                if frame_ns > 0 {
                    let fps = 1e9 / frame_ns as f64;
                    track.frame_rate = Some((fps * 1000.0).round() / 1000.0);
                }
            }
        }
        if let Some(audio) = entry.get("audio").and_then(Value::as_map) {
            track.sample_rate = Some(
                audio
                    .get("sampling_frequency")
                    .and_then(Value::as_f64)
                    .unwrap_or(8000.0),
            );
            track.channels = Some(audio.get("channels").and_then(Value::as_u64).unwrap_or(1) as u32);
            track.bits_per_sample = audio.get("bit_depth").and_then(Value::as_u64).map(|b| b as u32);
        }

        let codec = match codec_id.as_deref() {
            Some("V_MPEG4/ISO/AVC") => Some(Codec::H264),
            Some("V_MPEGH/ISO/HEVC") => Some(Codec::Hevc),
            Some("V_AV1") => Some(Codec::Av1),
            _ => None,
        };
        if let (Some(codec), Some(private), true) = (
            codec,
            self.codec_private.take(),
            self.opts.capabilities.codec_parameters,
        ) {
            match metascope_codec::decode_config_record(codec, private) {
                Ok(params) => {
                    track.width = track.width.or(params.width);
                    track.height = track.height.or(params.height);
                    entry.insert("codec_parameters", Value::record(&params));
                }
                Err(e) => {
                    self.diagnostics
                        .record(entry, "codec_private", &ProbeError::from(e));
                }
            }
        }

        track.codec_tag = codec_id;
        self.tracks.push(track);
    }

    fn summarize(self, root: &mut Node) {
        root.insert_opt("doc_type", self.doc_type);
        root.insert("total_elements", self.total_elements);
        if self.skipped_elements > 0 {
            root.insert("skipped_elements", self.skipped_elements);
        }
        root.insert("max_depth", self.max_depth);
        root.insert_opt("duration_seconds", self.duration_seconds);
        if !self.tracks.is_empty() {
            root.insert(
                "tracks",
                Value::List(self.tracks.iter().map(Value::record).collect()),
            );
        }
        root.insert("cluster_count", self.cluster_count);
        root.insert_opt("first_cluster_offset", self.first_cluster_offset);
        self.diagnostics.finish(root);
    }
}

/// `{id, size, offset}` for an element whose payload was not decoded.
fn opaque(header: &ElementHeader, len: usize) -> Node {
    let mut node = Node::new();
    node.insert("id", format!("{:#X}", header.id));
    node.insert("size", len);
    node.insert("offset", header.offset);
    node
}

/// Where an unknown-size master ends.
///
/// A `Cluster` ends at the next Segment-level element; anything else runs to
/// the end of its parent.
fn unknown_extent(cursor: &ByteCursor, id: u32) -> usize {
    if id != elements::CLUSTER {
        return cursor.remaining();
    }
    let start = cursor.position();
    let mut probe = cursor.clone();
    loop {
        let at = probe.position();
        let Ok(header) = read_element_header(&mut probe) else {
            return cursor.remaining();
        };
        if elements::is_segment_child(header.id) {
            return at - start;
        }
        match header.size.known() {
            Some(size) if size <= probe.remaining() as u64 => {
                if probe.skip(size as usize).is_err() {
                    return cursor.remaining();
                }
            }
            _ => return cursor.remaining(),
        }
    }
}

/// Flatten a `Tag`: targets stay as a sub-map, each `SimpleTag` becomes
/// `name -> value`, and nested tags become `PARENT/CHILD`.
fn interpret_tag(tag: &Node) -> Node {
    let mut out = Node::new();
    if let Some(targets) = tag.get("targets") {
        out.insert("targets", targets.clone());
    }
    flatten_simple_tags(tag, None, &mut out);
    out
}

fn flatten_simple_tags(parent: &Node, prefix: Option<&str>, out: &mut Node) {
    for simple in parent.get_all("simple_tag").filter_map(Value::as_map) {
        let Some(name) = simple.get("tag_name").and_then(Value::as_str) else {
            continue;
        };
        let key = match prefix {
            Some(prefix) => format!("{}/{}", prefix, name),
            None => name.to_string(),
        };
        if let Some(value) = simple.get("tag_string").or_else(|| simple.get("tag_binary")) {
            out.insert(key.clone(), value.clone());
        }
        flatten_simple_tags(simple, Some(&key), out);
    }
}

fn interpret_chapter(atom: &mut Node) {
    let start = atom.get("chapter_time_start").and_then(Value::as_u64);
    let end = atom.get("chapter_time_end").and_then(Value::as_u64);
    let title = atom
        .lookup("chapter_display.chap_string")
        .and_then(Value::as_str)
        .map(str::to_string);

    atom.insert_opt("start_seconds", start.map(|ns| ns as f64 / 1e9));
    atom.insert_opt("end_seconds", end.map(|ns| ns as f64 / 1e9));
    atom.insert_opt("title", title);
}
