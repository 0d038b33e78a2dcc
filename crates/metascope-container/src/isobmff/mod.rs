//! ISO base media file format (MP4, MOV, M4A).
//!
//! The walker reads `size`/`type` headers, recurses into a fixed set of
//! container boxes and hands every other box to an interpreter. The output
//! tree is keyed by box type, so a file with two tracks has two `trak`
//! entries under `moov`. Box payloads are never read past their declared
//! end, and nesting is capped by [`ParseOptions::max_box_depth`].
//!
//! Besides the box tree, the root carries:
//!
//! - `total_atoms`: every box visited, including sample-entry children
//! - `max_depth`: deepest container level reached
//! - `tracks`: one unified [`Track`] per `trak`
//! - `faststart`: whether `moov` precedes the first `mdat`

pub mod atoms;
pub mod boxes;
pub mod ilst;
pub mod sample_entry;

use serde::Serialize;
use tracing::trace;

use crate::error::{ProbeError, Result};
use crate::options::ParseOptions;
use crate::reader::ByteCursor;
use crate::track::{fourcc_codec_name, MediaType, Track};
use crate::value::{Node, Value};
use crate::walk::Diagnostics;

use atoms::{read_box_header, BoxHeader, BoxType};
use sample_entry::opaque;

/// Header bytes needed before anything can be said about the file.
const MIN_HEADER: usize = 8;

/// Parse an ISOBMFF buffer into a box tree.
///
/// Only a buffer that cannot hold a box header, or whose first type code is
/// not printable, is rejected. Everything past that is reported inside the
/// tree.
pub fn parse(data: &[u8], opts: &ParseOptions) -> Result<Node> {
    if data.len() < MIN_HEADER {
        return Err(ProbeError::Truncated {
            offset: 0,
            needed: MIN_HEADER as u64,
            available: data.len() as u64,
        });
    }
    let first_type = &data[4..8];
    if !first_type
        .iter()
        .all(|&b| b.is_ascii_graphic() || b == b' ' || b == 0xA9)
    {
        return Err(ProbeError::invalid_signature(
            "first box type is not a four-character code",
        ));
    }

    let mut walker = Walker::new(opts);
    let mut root = walker.walk(ByteCursor::new(data), 1, None);
    walker.summarize(&mut root);
    Ok(root)
}

/// Per-track state collected while inside a `trak`.
struct TrackState {
    track: Track,
    handler: Option<MediaType>,
    samples: Option<(u64, u64)>,
}

struct Walker<'o> {
    opts: &'o ParseOptions,
    diagnostics: Diagnostics,
    total_atoms: u64,
    max_depth: usize,
    tracks: Vec<Track>,
    current: Option<TrackState>,
    moov_offset: Option<u64>,
    mdat_offset: Option<u64>,
    fragments: u64,
}

impl<'o> Walker<'o> {
    fn new(opts: &'o ParseOptions) -> Self {
        Self {
            opts,
            diagnostics: Diagnostics::new(),
            total_atoms: 0,
            max_depth: 0,
            tracks: Vec::new(),
            current: None,
            moov_offset: None,
            mdat_offset: None,
            fragments: 0,
        }
    }

    /// Walk sibling boxes until `cursor` is exhausted.
    fn walk(&mut self, mut cursor: ByteCursor, depth: usize, parent: Option<BoxType>) -> Node {
        let mut node = Node::new();
        self.max_depth = self.max_depth.max(depth);

        while !cursor.is_empty() {
            // QuickTime ends some atom lists with a 32-bit zero terminator.
            if cursor.remaining() < MIN_HEADER
                && cursor.peek(cursor.remaining()).is_ok_and(|b| b.iter().all(|&x| x == 0))
            {
                break;
            }

            let header = match read_box_header(&mut cursor) {
                Ok(header) => header,
                Err(e) => {
                    let context = parent.map_or("top level".to_string(), |p| p.as_string());
                    self.diagnostics.record(&mut node, &context, &e);
                    break;
                }
            };
            self.total_atoms += 1;
            trace!(
                "box '{}' at {} size {} depth {}",
                header.box_type,
                header.offset,
                header.size,
                depth
            );

            let available = cursor.remaining() as u64;
            let declared = header.data_size();
            let Ok(payload) = cursor.sub_cursor(declared.min(available) as usize) else {
                break;
            };

            let (key, mut value) = self.visit(&header, payload, depth, parent);
            if declared > available {
                let err = ProbeError::Truncated {
                    offset: header.offset,
                    needed: header.size,
                    available: available + header.header_size as u64,
                };
                match &mut value {
                    Value::Map(child) => {
                        self.diagnostics
                            .record(child, &header.box_type.as_string(), &err)
                    }
                    _ => self
                        .diagnostics
                        .record(&mut node, &header.box_type.as_string(), &err),
                }
            }
            node.insert(key, value);
        }
        node
    }

    fn visit(
        &mut self,
        header: &BoxHeader,
        mut payload: ByteCursor,
        depth: usize,
        parent: Option<BoxType>,
    ) -> (String, Value) {
        let box_type = header.box_type;

        if parent == Some(BoxType::ILST) {
            return match ilst::parse_item(box_type, &mut payload, self.opts) {
                Ok(item) => {
                    self.total_atoms += item.boxes;
                    (item.key, item.value)
                }
                Err(e) => self.degrade(header, &e),
            };
        }

        if box_type.is_container() {
            if depth + 1 > self.opts.max_box_depth {
                let mut node = opaque(header);
                let err = ProbeError::malformed(format!(
                    "box nesting exceeds depth limit {}",
                    self.opts.max_box_depth
                ));
                self.diagnostics
                    .record(&mut node, &box_type.as_string(), &err);
                return (box_type.as_string(), Value::Map(node));
            }

            match box_type {
                BoxType::META if !is_quicktime_meta(&payload) => {
                    if let Err(e) = payload.skip(4) {
                        return self.degrade(header, &e);
                    }
                }
                BoxType::MOOV => {
                    self.moov_offset.get_or_insert(header.offset);
                }
                BoxType::TRAK => self.begin_track(),
                _ => {}
            }

            let children = self.walk(payload, depth + 1, Some(box_type));
            if box_type == BoxType::TRAK {
                self.finish_track();
            }
            return (box_type.as_string(), Value::Map(children));
        }

        let key = box_type.as_string();
        match self.interpret(header, &mut payload, parent) {
            Ok(Interpreted::Field(value)) => (key, value),
            Ok(Interpreted::Renamed(name, value)) => (name, value),
            Err(e) => self.degrade(header, &e),
        }
    }

    /// `{type, size, offset}` plus the error that stopped the decode.
    fn degrade(&mut self, header: &BoxHeader, err: &ProbeError) -> (String, Value) {
        let mut node = opaque(header);
        let context = format!("'{}' at {}", header.box_type, header.offset);
        self.diagnostics.record(&mut node, &context, err);
        (header.box_type.as_string(), Value::Map(node))
    }

    fn interpret(
        &mut self,
        header: &BoxHeader,
        c: &mut ByteCursor,
        parent: Option<BoxType>,
    ) -> Result<Interpreted> {
        let opts = self.opts;

        match header.box_type {
            BoxType::FTYP => record(&boxes::parse_ftyp(c)?),
            BoxType::MVHD => record(&boxes::parse_mvhd(c)?),
            BoxType::TKHD => {
                let tkhd = boxes::parse_tkhd(c)?;
                if let Some(state) = self.current.as_mut() {
                    state.track.track_id = tkhd.track_id as u64;
                    if tkhd.width >= 1.0 && tkhd.height >= 1.0 {
                        state.track.width = Some(tkhd.width as u32);
                        state.track.height = Some(tkhd.height as u32);
                    }
                }
                record(&tkhd)
            }
            BoxType::MDHD => {
                let mdhd = boxes::parse_mdhd(c)?;
                if let Some(state) = self.current.as_mut() {
                    state.track.timescale = Some(mdhd.timescale as u64);
                    state.track.duration = Some(mdhd.duration);
                    state.track.language = mdhd.language.clone();
                }
                record(&mdhd)
            }
            BoxType::HDLR => {
                let hdlr = boxes::parse_hdlr(c, opts.max_text_bytes)?;
                // A data-reference or metadata handler outside mdia says
                // nothing about the track.
                if parent == Some(BoxType::MDIA) {
                    if let Some(state) = self.current.as_mut() {
                        state.handler = Some(hdlr.media_type);
                        state.track.media_type = hdlr.media_type;
                        state.track.name = hdlr.name.clone();
                    }
                }
                record(&hdlr)
            }
            BoxType::STSD => {
                let handler = self.current.as_ref().and_then(|s| s.handler);
                let description = sample_entry::parse_stsd(c, handler, opts)?;
                self.total_atoms += description.boxes;
                if let (Some(state), Some(entry)) =
                    (self.current.as_mut(), description.entries.first())
                {
                    let track = &mut state.track;
                    track.codec_tag = Some(entry.format.clone());
                    track.codec_name = fourcc_codec_name(&entry.format).map(str::to_string);
                    if track.width.is_none() {
                        track.width = entry.width.filter(|&w| w > 0);
                        track.height = entry.height.filter(|&h| h > 0);
                    }
                    track.channels = entry.channels;
                    track.sample_rate = entry.sample_rate;
                    track.bits_per_sample = entry.bits_per_sample;
                }
                Ok(Interpreted::Field(Value::Map(description.node)))
            }
            BoxType::STTS => {
                let stts = boxes::parse_stts(c, opts.max_table_entries)?;
                if let Some(state) = self.current.as_mut() {
                    state.samples = Some((stts.sample_count, stts.total_duration));
                }
                record(&stts)
            }
            BoxType::STSZ | BoxType::STZ2 => {
                let stsz = if header.box_type == BoxType::STSZ {
                    boxes::parse_stsz(c, opts.max_table_entries)?
                } else {
                    boxes::parse_stz2(c, opts.max_table_entries)?
                };
                if let Some(state) = self.current.as_mut() {
                    let table = &mut state.track.sample_table;
                    table.sample_count = Some(stsz.sample_count as u64);
                    table.min_sample_size = stsz.min_sample_size;
                    table.max_sample_size = stsz.max_sample_size;
                    table.total_sample_bytes = stsz.total_sample_bytes;
                }
                record(&stsz)
            }
            BoxType::STCO | BoxType::CO64 => {
                let wide = header.box_type == BoxType::CO64;
                let offsets = boxes::parse_chunk_offsets(c, wide, opts.max_table_entries)?;
                if let Some(state) = self.current.as_mut() {
                    state.track.sample_table.chunk_count = Some(offsets.entry_count as u64);
                }
                record(&offsets)
            }
            BoxType::STSS => {
                let stss = boxes::parse_stss(c, opts.preview_entries)?;
                if let Some(state) = self.current.as_mut() {
                    state.track.sample_table.sync_sample_count = Some(stss.entry_count as u64);
                }
                record(&stss)
            }
            BoxType::STSC => record(&boxes::parse_stsc(c, opts.preview_entries)?),
            BoxType::CTTS => record(&boxes::parse_ctts(c)?),
            BoxType::ELST => record(&boxes::parse_elst(c, opts.preview_entries)?),
            BoxType::MDAT => {
                self.mdat_offset.get_or_insert(header.offset);
                let mut node = opaque(header);
                node.insert("data_offset", header.offset + header.header_size as u64);
                node.insert("data_size", header.data_size());
                Ok(Interpreted::Field(Value::Map(node)))
            }
            BoxType::MOOF => {
                self.fragments += 1;
                Ok(Interpreted::Field(Value::Map(opaque(header))))
            }
            t if t.is_copyright_prefixed() && parent == Some(BoxType::UDTA) => {
                let item = ilst::parse_udta_text(t, c, opts)?;
                self.total_atoms += item.boxes;
                Ok(Interpreted::Renamed(item.key, item.value))
            }
            _ => Ok(Interpreted::Field(Value::Map(opaque(header)))),
        }
    }

    fn begin_track(&mut self) {
        if self.current.is_some() {
            self.finish_track();
        }
        self.current = Some(TrackState {
            track: Track::new(0, MediaType::Other),
            handler: None,
            samples: None,
        });
    }

    fn finish_track(&mut self) {
        let Some(state) = self.current.take() else {
            return;
        };
        let mut track = state.track;
        track.derive_seconds();
        if track.media_type == MediaType::Video {
            if let (Some((count, total)), Some(timescale)) = (state.samples, track.timescale) {
                if count > 0 && total > 0 {
                    let fps = count as f64 * timescale as f64 / total as f64;
                    track.frame_rate = Some((fps * 1000.0).round() / 1000.0);
                }
            }
        }
        self.tracks.push(track);
    }

    fn summarize(self, root: &mut Node) {
        root.insert("total_atoms", self.total_atoms);
        root.insert("max_depth", self.max_depth);
        if !self.tracks.is_empty() {
            root.insert(
                "tracks",
                Value::List(self.tracks.iter().map(Value::record).collect()),
            );
        }
        if let (Some(moov), Some(mdat)) = (self.moov_offset, self.mdat_offset) {
            root.insert("faststart", moov < mdat);
        }
        if self.fragments > 0 {
            root.insert("fragments", self.fragments);
        }
        self.diagnostics.finish(root);
    }
}

enum Interpreted {
    /// Stored under the box type.
    Field(Value),
    /// Stored under a decoded name (`©nam` -> `title`).
    Renamed(String, Value),
}

/// QuickTime `meta` has no version/flags prefix: its first child header
/// starts right away.
fn is_quicktime_meta(payload: &ByteCursor) -> bool {
    payload
        .peek(8)
        .map(|head| &head[4..8] == b"hdlr")
        .unwrap_or(false)
}

fn record<T: Serialize>(record: &T) -> Result<Interpreted> {
    Ok(Interpreted::Field(Value::record(record)))
}
