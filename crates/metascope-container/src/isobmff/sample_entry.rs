//! `stsd` sample descriptions and their child boxes.

use metascope_codec::bitstream::BitReader;
use metascope_codec::{Codec, CodecError, CodecParameters};
use serde::Serialize;
use tracing::debug;

use super::atoms::{read_box_header, BoxHeader};
use super::boxes::full_box;
use crate::error::{ProbeError, Result};
use crate::options::ParseOptions;
use crate::reader::{fourcc_str, text, ByteCursor};
use crate::track::{fourcc_codec_name, MediaType};
use crate::value::{ByteRef, Node, Value};

/// Bytes of fixed `VisualSampleEntry` fields before child boxes.
const VISUAL_ENTRY_FIXED: usize = 78;
/// Bytes of fixed `AudioSampleEntry` fields before child boxes.
const AUDIO_ENTRY_FIXED: usize = 28;
const QT_SOUND_V1_EXTRA: usize = 16;
const QT_SOUND_V2_EXTRA: usize = 36;

const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// What a track needs from one sample entry.
#[derive(Debug, Clone, Default)]
pub struct EntrySummary {
    pub format: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub channels: Option<u32>,
    pub sample_rate: Option<f64>,
    pub bits_per_sample: Option<u32>,
}

/// Decoded `stsd`.
pub struct SampleDescription {
    pub node: Node,
    pub entries: Vec<EntrySummary>,
    /// Entries plus their child boxes.
    pub boxes: u64,
}

enum EntryKind {
    Visual,
    Audio,
    Other,
}

fn entry_kind(format: &[u8; 4], handler: Option<MediaType>) -> EntryKind {
    match handler {
        Some(MediaType::Video) => return EntryKind::Visual,
        Some(MediaType::Audio) => return EntryKind::Audio,
        Some(_) => return EntryKind::Other,
        None => {}
    }
    match format {
        b"avc1" | b"avc3" | b"hvc1" | b"hev1" | b"av01" | b"vp08" | b"vp09" | b"mp4v"
        | b"jpeg" | b"mjpa" | b"apch" | b"apcn" | b"apcs" | b"apco" | b"ap4h" => {
            EntryKind::Visual
        }
        b"mp4a" | b"ac-3" | b"ec-3" | b"Opus" | b"fLaC" | b"alac" | b"lpcm" | b"sowt"
        | b"twos" | b".mp3" => EntryKind::Audio,
        _ => EntryKind::Other,
    }
}

pub fn parse_stsd(
    c: &mut ByteCursor,
    handler: Option<MediaType>,
    opts: &ParseOptions,
) -> Result<SampleDescription> {
    let (version, _) = full_box(c)?;
    let entry_count = c.be_u32()?;

    let mut node = Node::new();
    node.insert("version", version);
    node.insert("entry_count", entry_count);

    let mut entries = Vec::new();
    let mut listed = Vec::new();
    let mut boxes = 0u64;

    for _ in 0..entry_count {
        if c.remaining() < 8 {
            break;
        }
        let header = read_box_header(c)?;
        let available = c.remaining() as u64;
        let mut payload = c.sub_cursor(header.data_size().min(available) as usize)?;
        boxes += 1;

        let mut entry = Node::new();
        let (summary, children) = match parse_entry(&header, &mut payload, handler, opts, &mut entry)
        {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("sample entry '{}' degraded: {}", header.box_type, e);
                entry.set("error", e.to_string());
                (
                    EntrySummary {
                        format: header.box_type.as_string(),
                        ..Default::default()
                    },
                    0,
                )
            }
        };
        if header.data_size() > available {
            entry.set(
                "error",
                ProbeError::Truncated {
                    offset: header.offset,
                    needed: header.size,
                    available: available + header.header_size as u64,
                }
                .to_string(),
            );
        }
        boxes += children;
        entries.push(summary);
        listed.push(Value::Map(entry));
    }

    node.insert("entries", Value::List(listed));
    Ok(SampleDescription {
        node,
        entries,
        boxes,
    })
}

fn parse_entry(
    header: &BoxHeader,
    c: &mut ByteCursor,
    handler: Option<MediaType>,
    opts: &ParseOptions,
    entry: &mut Node,
) -> Result<(EntrySummary, u64)> {
    let format = header.box_type.0;
    let mut summary = EntrySummary {
        format: header.box_type.as_string(),
        ..Default::default()
    };
    entry.insert("format", summary.format.clone());
    entry.insert_opt("codec_name", fourcc_codec_name(&summary.format));

    c.skip(6)?;
    entry.insert("data_reference_index", c.be_u16()?);

    let children_at = match entry_kind(&format, handler) {
        EntryKind::Visual => {
            c.skip(16)?;
            let width = c.be_u16()? as u32;
            let height = c.be_u16()? as u32;
            let horizontal_resolution = c.be_fixed16_16()?;
            let vertical_resolution = c.be_fixed16_16()?;
            c.skip(4)?;
            let frame_count = c.be_u16()?;
            let compressor = c.read_exact(32)?;
            let depth = c.be_u16()?;
            c.skip(2)?;

            entry.insert("width", width);
            entry.insert("height", height);
            entry.insert("horizontal_resolution", horizontal_resolution);
            entry.insert("vertical_resolution", vertical_resolution);
            entry.insert("frame_count", frame_count);
            let name_len = (compressor[0] as usize).min(31);
            let compressor_name = text(&compressor[1..1 + name_len], 31);
            if !compressor_name.is_empty() {
                entry.insert("compressor_name", compressor_name);
            }
            entry.insert("depth", depth);

            summary.width = Some(width);
            summary.height = Some(height);
            VISUAL_ENTRY_FIXED
        }
        EntryKind::Audio => {
            let sound_version = c.be_u16()?;
            c.skip(6)?;
            let mut channels = c.be_u16()? as u32;
            let sample_size = c.be_u16()? as u32;
            c.skip(4)?;
            let mut sample_rate = c.be_u32()? as f64 / 65536.0;

            let fixed = match sound_version {
                1 => {
                    c.skip(QT_SOUND_V1_EXTRA)?;
                    AUDIO_ENTRY_FIXED + QT_SOUND_V1_EXTRA
                }
                2 => {
                    c.skip(4)?;
                    sample_rate = f64::from_bits(c.be_u64()?);
                    channels = c.be_u32()?;
                    c.skip(20)?;
                    AUDIO_ENTRY_FIXED + QT_SOUND_V2_EXTRA
                }
                _ => AUDIO_ENTRY_FIXED,
            };

            entry.insert("sound_version", sound_version);
            entry.insert("channels", channels);
            entry.insert("sample_size", sample_size);
            entry.insert("sample_rate", sample_rate);

            summary.channels = Some(channels);
            summary.bits_per_sample = Some(sample_size);
            summary.sample_rate = Some(sample_rate);
            fixed
        }
        EntryKind::Other => return Ok((summary, 0)),
    };

    // Child boxes start right after the fixed fields.
    c.seek(children_at)?;
    let children = parse_children(c, opts, entry, &mut summary)?;
    Ok((summary, children))
}

fn parse_children(
    c: &mut ByteCursor,
    opts: &ParseOptions,
    entry: &mut Node,
    summary: &mut EntrySummary,
) -> Result<u64> {
    let mut count = 0u64;
    while c.remaining() >= 8 {
        let header = read_box_header(c)?;
        if header.data_size() > c.remaining() as u64 {
            return Err(ProbeError::Truncated {
                offset: header.offset,
                needed: header.size,
                available: c.remaining() as u64 + header.header_size as u64,
            });
        }
        let mut payload = c.sub_cursor(header.data_size() as usize)?;
        count += 1;

        let key = header.box_type.as_string();
        let value = match interpret_child(&header, &mut payload, opts, summary) {
            Ok(value) => value,
            Err(e) => {
                debug!("'{}' in sample entry degraded: {}", key, e);
                let mut opaque = opaque(&header);
                opaque.set("error", e.to_string());
                Value::Map(opaque)
            }
        };
        entry.insert(key, value);
    }
    Ok(count)
}

/// `{type, size, offset}` for a box whose payload is not decoded.
pub fn opaque(header: &BoxHeader) -> Node {
    let mut node = Node::new();
    node.insert("type", header.box_type.as_string());
    node.insert("size", header.size);
    node.insert("offset", header.offset);
    node
}

fn interpret_child(
    header: &BoxHeader,
    c: &mut ByteCursor,
    opts: &ParseOptions,
    summary: &mut EntrySummary,
) -> Result<Value> {
    let codec = match &header.box_type.0 {
        b"avcC" => Some(Codec::H264),
        b"hvcC" => Some(Codec::Hevc),
        b"av1C" => Some(Codec::Av1),
        _ => None,
    };
    if let Some(codec) = codec {
        if !opts.capabilities.codec_parameters {
            return Ok(Value::Map(opaque(header)));
        }
        let params = metascope_codec::decode_config_record(codec, c.rest())?;
        fill_from_codec(summary, &params);
        return Ok(Value::record(&params));
    }

    Ok(match &header.box_type.0 {
        b"esds" => {
            let es = parse_esds(c)?;
            if let Some(rate) = es.sampling_frequency {
                summary.sample_rate.get_or_insert(rate as f64);
            }
            Value::record(&es)
        }
        b"pasp" => {
            let h_spacing = c.be_u32()?;
            let v_spacing = c.be_u32()?;
            let mut node = Node::new();
            node.insert("h_spacing", h_spacing);
            node.insert("v_spacing", v_spacing);
            if v_spacing > 0 {
                node.insert("pixel_aspect_ratio", h_spacing as f64 / v_spacing as f64);
            }
            Value::Map(node)
        }
        b"clap" => {
            let mut node = Node::new();
            for key in ["width", "height", "horizontal_offset", "vertical_offset"] {
                let numerator = c.be_i32()?;
                let denominator = c.be_i32()?;
                if denominator != 0 {
                    node.insert(key, numerator as f64 / denominator as f64);
                }
            }
            Value::Map(node)
        }
        b"colr" => parse_colr(c, opts)?,
        b"fiel" => {
            let mut node = Node::new();
            node.insert("field_count", c.u8()?);
            node.insert("field_ordering", c.u8()?);
            Value::Map(node)
        }
        b"chan" => {
            full_box(c)?;
            let mut node = Node::new();
            node.insert("channel_layout_tag", c.be_u32()?);
            node.insert("channel_bitmap", c.be_u32()?);
            node.insert("description_count", c.be_u32()?);
            Value::Map(node)
        }
        b"st3d" => {
            full_box(c)?;
            let mode = c.u8()?;
            let mut node = Node::new();
            node.insert("stereo_mode", mode);
            node.insert(
                "layout",
                match mode {
                    0 => "mono",
                    1 => "top-bottom",
                    2 => "left-right",
                    3 => "stereo-custom",
                    4 => "right-left",
                    _ => "unknown",
                },
            );
            Value::Map(node)
        }
        b"sv3d" => Value::Map(parse_sv3d(c, opts)?),
        b"btrt" => {
            let mut node = Node::new();
            node.insert("buffer_size_db", c.be_u32()?);
            node.insert("max_bitrate", c.be_u32()?);
            node.insert("avg_bitrate", c.be_u32()?);
            Value::Map(node)
        }
        _ => Value::Map(opaque(header)),
    })
}

fn fill_from_codec(summary: &mut EntrySummary, params: &CodecParameters) {
    if summary.width.unwrap_or(0) == 0 {
        summary.width = params.width;
    }
    if summary.height.unwrap_or(0) == 0 {
        summary.height = params.height;
    }
}

fn parse_colr(c: &mut ByteCursor, opts: &ParseOptions) -> Result<Value> {
    let colour_type = c.fourcc()?;
    let mut node = Node::new();
    node.insert("colour_type", fourcc_str(&colour_type));
    match &colour_type {
        b"nclx" | b"nclc" => {
            node.insert("colour_primaries", c.be_u16()?);
            node.insert("transfer_characteristics", c.be_u16()?);
            node.insert("matrix_coefficients", c.be_u16()?);
            if &colour_type == b"nclx" {
                node.insert("full_range", c.u8()? & 0x80 != 0);
            }
        }
        b"prof" | b"rICC" => {
            let offset = c.offset();
            let profile = c.rest();
            node.insert(
                "icc_profile",
                ByteRef::new(profile, offset, opts.hash_payloads()),
            );
        }
        other => {
            return Err(ProbeError::unsupported(format!(
                "colr type '{}'",
                fourcc_str(other)
            )))
        }
    }
    Ok(Value::Map(node))
}

/// Spherical video (`sv3d`): metadata source plus projection summary.
fn parse_sv3d(c: &mut ByteCursor, opts: &ParseOptions) -> Result<Node> {
    let mut node = Node::new();
    while c.remaining() >= 8 {
        let header = read_box_header(c)?;
        let available = c.remaining() as u64;
        let mut payload = c.sub_cursor(header.data_size().min(available) as usize)?;
        match &header.box_type.0 {
            b"svhd" => {
                full_box(&mut payload)?;
                node.insert("metadata_source", text(payload.rest(), opts.max_text_bytes));
            }
            b"proj" => {
                while payload.remaining() >= 8 {
                    let inner = read_box_header(&mut payload)?;
                    let left = payload.remaining() as u64;
                    let mut body = payload.sub_cursor(inner.data_size().min(left) as usize)?;
                    match &inner.box_type.0 {
                        b"prhd" => {
                            full_box(&mut body)?;
                            node.insert("pose_yaw_degrees", body.be_fixed16_16()?);
                            node.insert("pose_pitch_degrees", body.be_fixed16_16()?);
                            node.insert("pose_roll_degrees", body.be_fixed16_16()?);
                        }
                        b"equi" => node.insert("projection", "equirectangular"),
                        b"cbmp" => node.insert("projection", "cubemap"),
                        b"mshp" => node.insert("projection", "mesh"),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    Ok(node)
}

/// MPEG-4 elementary stream descriptor, with the AAC AudioSpecificConfig
/// when one is present.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EsDescriptor {
    pub es_id: Option<u16>,
    pub object_type_indication: Option<u8>,
    pub object_type_name: Option<&'static str>,
    pub stream_type: Option<u8>,
    pub buffer_size: Option<u32>,
    pub max_bitrate: Option<u32>,
    pub avg_bitrate: Option<u32>,
    pub audio_object_type: Option<u32>,
    pub audio_object_type_name: Option<&'static str>,
    pub sampling_frequency_index: Option<u32>,
    pub sampling_frequency: Option<u32>,
    pub channel_configuration: Option<u32>,
}

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_TAG: u8 = 0x04;
const DECODER_SPECIFIC_TAG: u8 = 0x05;

/// Descriptor tag plus its expandable (7 bits per byte) length.
fn descriptor_header(c: &mut ByteCursor) -> Result<(u8, usize)> {
    let tag = c.u8()?;
    let mut len = 0usize;
    for _ in 0..4 {
        let byte = c.u8()?;
        len = (len << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

pub fn parse_esds(c: &mut ByteCursor) -> Result<EsDescriptor> {
    full_box(c)?;
    let mut es = EsDescriptor::default();

    while c.remaining() >= 2 {
        let (tag, len) = descriptor_header(c)?;
        match tag {
            ES_DESCRIPTOR_TAG => {
                // Sub-descriptors follow inline, so keep walking this cursor.
                es.es_id = Some(c.be_u16()?);
                let flags = c.u8()?;
                if flags & 0x80 != 0 {
                    c.skip(2)?;
                }
                if flags & 0x40 != 0 {
                    let url_len = c.u8()? as usize;
                    c.skip(url_len)?;
                }
                if flags & 0x20 != 0 {
                    c.skip(2)?;
                }
            }
            DECODER_CONFIG_TAG => {
                let object_type = c.u8()?;
                es.object_type_indication = Some(object_type);
                es.object_type_name = object_type_name(object_type);
                es.stream_type = Some(c.u8()? >> 2);
                es.buffer_size = Some(c.be_u24()?);
                es.max_bitrate = Some(c.be_u32()?);
                es.avg_bitrate = Some(c.be_u32()?);
            }
            DECODER_SPECIFIC_TAG => {
                let config = c.read_exact(len)?;
                if is_aac(es.object_type_indication) {
                    parse_audio_specific_config(config, &mut es).map_err(CodecError::from)?;
                }
            }
            _ => c.skip(len.min(c.remaining()))?,
        }
    }
    Ok(es)
}

fn is_aac(object_type: Option<u8>) -> bool {
    matches!(object_type, Some(0x40) | Some(0x66..=0x68))
}

fn object_type_name(object_type: u8) -> Option<&'static str> {
    match object_type {
        0x20 => Some("MPEG-4 Visual"),
        0x21 => Some("AVC"),
        0x23 => Some("HEVC"),
        0x40 | 0x66..=0x68 => Some("AAC"),
        0x69 | 0x6B => Some("MP3"),
        0xA5 => Some("AC-3"),
        0xA6 => Some("E-AC-3"),
        0xAD => Some("Opus"),
        _ => None,
    }
}

fn parse_audio_specific_config(
    config: &[u8],
    es: &mut EsDescriptor,
) -> std::result::Result<(), metascope_codec::BitstreamError> {
    let mut bits = BitReader::new(config);
    let mut audio_object_type = bits.read_bits(5)?;
    if audio_object_type == 31 {
        audio_object_type = 32 + bits.read_bits(6)?;
    }
    es.audio_object_type = Some(audio_object_type);
    es.audio_object_type_name = match audio_object_type {
        1 => Some("AAC Main"),
        2 => Some("AAC LC"),
        3 => Some("AAC SSR"),
        4 => Some("AAC LTP"),
        5 => Some("HE-AAC"),
        23 => Some("AAC LD"),
        29 => Some("HE-AAC v2"),
        39 => Some("AAC ELD"),
        42 => Some("xHE-AAC"),
        _ => None,
    };

    let index = bits.read_bits(4)?;
    es.sampling_frequency_index = Some(index);
    es.sampling_frequency = if index == 15 {
        Some(bits.read_bits(24)?)
    } else {
        AAC_SAMPLE_RATES.get(index as usize).copied()
    };
    es.channel_configuration = Some(bits.read_bits(4)?);
    Ok(())
}
