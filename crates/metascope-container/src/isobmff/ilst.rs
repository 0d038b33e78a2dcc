//! iTunes-style `ilst` items and QuickTime `udta` text atoms.

use super::atoms::{read_box_header, BoxType};
use super::boxes::full_box;
use crate::error::{ProbeError, Result};
use crate::options::ParseOptions;
use crate::reader::{fourcc_str, text, ByteCursor};
use crate::value::{ByteRef, Node, Value};

/// `data` box type codes.
mod well_known {
    pub const IMPLICIT: u32 = 0;
    pub const UTF8: u32 = 1;
    pub const UTF16: u32 = 2;
    pub const JPEG: u32 = 13;
    pub const PNG: u32 = 14;
    pub const SIGNED_INT: u32 = 21;
    pub const UNSIGNED_INT: u32 = 22;
    pub const FLOAT32: u32 = 23;
    pub const FLOAT64: u32 = 24;
    pub const BMP: u32 = 27;
}

/// Field name for a well-known item type.
pub fn tag_name(code: &[u8; 4]) -> Option<&'static str> {
    let name = match code {
        b"\xA9nam" => "title",
        b"\xA9ART" => "artist",
        b"aART" => "album_artist",
        b"\xA9alb" => "album",
        b"\xA9gen" => "genre",
        b"gnre" => "genre_id",
        b"\xA9day" => "date",
        b"\xA9wrt" => "composer",
        b"\xA9cmt" => "comment",
        b"\xA9too" => "encoder",
        b"\xA9enc" => "encoded_by",
        b"\xA9lyr" => "lyrics",
        b"\xA9grp" => "grouping",
        b"\xA9wrk" => "work",
        b"\xA9mvn" => "movement",
        b"trkn" => "track_number",
        b"disk" => "disc_number",
        b"cpil" => "compilation",
        b"pgap" => "gapless",
        b"pcst" => "podcast",
        b"hdvd" => "hd_video",
        b"tmpo" => "tempo",
        b"covr" => "cover_art",
        b"desc" => "description",
        b"ldes" => "long_description",
        b"cprt" | b"\xA9cpy" => "copyright",
        b"rtng" => "rating",
        b"stik" => "media_kind",
        b"tvsh" => "tv_show",
        b"tvsn" => "tv_season",
        b"tves" => "tv_episode",
        b"tven" => "tv_episode_id",
        b"tvnn" => "tv_network",
        b"catg" => "category",
        b"keyw" => "keywords",
        b"sonm" => "sort_title",
        b"soar" => "sort_artist",
        b"soal" => "sort_album",
        b"soaa" => "sort_album_artist",
        b"soco" => "sort_composer",
        b"purd" => "purchase_date",
        _ => return None,
    };
    Some(name)
}

/// One decoded `ilst` item.
pub struct Item {
    pub key: String,
    pub value: Value,
    /// `data`/`mean`/`name` boxes inside the item.
    pub boxes: u64,
}

/// Decode the payload of one `ilst` item box.
pub fn parse_item(item_type: BoxType, c: &mut ByteCursor, opts: &ParseOptions) -> Result<Item> {
    let mut values = Vec::new();
    let mut mean = None;
    let mut name = None;
    let mut boxes = 0u64;

    while c.remaining() >= 8 {
        let header = read_box_header(c)?;
        let available = c.remaining() as u64;
        if header.data_size() > available {
            return Err(ProbeError::Truncated {
                offset: header.offset,
                needed: header.size,
                available: available + header.header_size as u64,
            });
        }
        let mut payload = c.sub_cursor(header.data_size() as usize)?;
        boxes += 1;

        match header.box_type {
            BoxType::DATA => values.push(parse_data(&item_type.0, &mut payload, opts)?),
            BoxType::MEAN => {
                full_box(&mut payload)?;
                mean = Some(text(payload.rest(), opts.max_text_bytes));
            }
            BoxType::NAME => {
                full_box(&mut payload)?;
                name = Some(text(payload.rest(), opts.max_text_bytes));
            }
            _ => {}
        }
    }

    let key = if item_type == BoxType::FREEFORM {
        match (mean, name) {
            (Some(mean), Some(name)) => format!("{}:{}", mean, name),
            (None, Some(name)) => name,
            _ => item_type.as_string(),
        }
    } else {
        tag_name(&item_type.0)
            .map(str::to_string)
            .unwrap_or_else(|| item_type.as_string())
    };

    let value = match values.len() {
        0 => return Err(ProbeError::malformed(format!("item '{}' has no data box", key))),
        1 => values.remove(0),
        _ => Value::List(values),
    };

    Ok(Item { key, value, boxes })
}

fn parse_data(tag: &[u8; 4], c: &mut ByteCursor, opts: &ParseOptions) -> Result<Value> {
    use well_known::*;

    let type_code = c.be_u32()? & 0x00FF_FFFF;
    // locale
    c.skip(4)?;
    let offset = c.offset();
    let payload = c.rest();

    Ok(match type_code {
        UTF8 => Value::Str(text(payload, opts.max_text_bytes)),
        UTF16 => {
            let capped = &payload[..payload.len().min(opts.max_text_bytes)];
            let units: Vec<u16> = capped
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Value::Str(String::from_utf16_lossy(&units).trim_end_matches('\0').to_string())
        }
        JPEG | PNG | BMP => {
            let mut image = Node::new();
            image.insert(
                "mime",
                match type_code {
                    JPEG => "image/jpeg",
                    PNG => "image/png",
                    _ => "image/bmp",
                },
            );
            image.insert("size", payload.len());
            Value::Map(image)
        }
        SIGNED_INT => Value::Int(be_signed(payload)?),
        UNSIGNED_INT => Value::UInt(be_unsigned(payload)?),
        FLOAT32 if payload.len() == 4 => {
            Value::Float(f32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as f64)
        }
        FLOAT64 if payload.len() == 8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(payload);
            Value::Float(f64::from_be_bytes(bytes))
        }
        IMPLICIT => implicit(tag, payload, offset, opts)?,
        _ => Value::Bytes(ByteRef::new(payload, offset, opts.hash_payloads())),
    })
}

/// Type code 0: the layout depends on the item.
fn implicit(tag: &[u8; 4], payload: &[u8], offset: u64, opts: &ParseOptions) -> Result<Value> {
    let mut c = ByteCursor::with_base(payload, offset);
    Ok(match tag {
        b"trkn" | b"disk" => {
            c.skip(2)?;
            let mut pair = Node::new();
            pair.insert("number", c.be_u16()?);
            if let Ok(total) = c.be_u16() {
                if total > 0 {
                    pair.insert("total", total);
                }
            }
            Value::Map(pair)
        }
        b"cpil" | b"pgap" | b"pcst" | b"hdvd" => Value::Bool(c.u8()? != 0),
        b"tmpo" | b"gnre" => Value::UInt(c.be_u16()? as u64),
        b"stik" | b"rtng" => Value::UInt(c.u8()? as u64),
        _ => Value::Bytes(ByteRef::new(payload, offset, opts.hash_payloads())),
    })
}

fn be_unsigned(bytes: &[u8]) -> Result<u64> {
    match bytes.len() {
        1..=8 => Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)),
        n => Err(ProbeError::unsupported(format!("{}-byte integer", n))),
    }
}

fn be_signed(bytes: &[u8]) -> Result<i64> {
    let unsigned = be_unsigned(bytes)?;
    let shift = 64 - bytes.len() as u32 * 8;
    Ok(((unsigned << shift) as i64) >> shift)
}

/// QuickTime `udta` text atom: 16-bit length, 16-bit language, then text.
///
/// Some writers put an `ilst`-style `data` box here instead.
pub fn parse_udta_text(atom: BoxType, c: &mut ByteCursor, opts: &ParseOptions) -> Result<Item> {
    if c.remaining() >= 8 && c.peek(8).map(|h| &h[4..8] == b"data").unwrap_or(false) {
        return parse_item(atom, c, opts);
    }

    let len = c.be_u16()? as usize;
    let _language = c.be_u16()?;
    let raw = c.read_exact(len.min(c.remaining()))?;

    Ok(Item {
        key: tag_name(&atom.0)
            .map(str::to_string)
            .unwrap_or_else(|| fourcc_str(&atom.0)),
        value: Value::Str(text(raw, opts.max_text_bytes)),
        boxes: 0,
    })
}
