//! Fixed-layout box interpreters.

use serde::Serialize;

use crate::error::{ProbeError, Result};
use crate::reader::{fourcc_str, text, ByteCursor};
use crate::track::MediaType;

/// Seconds between 1904-01-01 (Mac epoch) and 1970-01-01.
pub const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

const TKHD_ENABLED: u32 = 0x1;
const TKHD_IN_MOVIE: u32 = 0x2;
const TKHD_IN_PREVIEW: u32 = 0x4;

/// Read the version byte and 24-bit flags of a full box.
pub fn full_box(c: &mut ByteCursor) -> Result<(u8, u32)> {
    let version = c.u8()?;
    let flags = c.be_u24()?;
    Ok((version, flags))
}

/// Mac-epoch seconds to Unix seconds. Zero means "not set".
pub fn unix_time(mac_seconds: u64) -> Option<i64> {
    if mac_seconds == 0 {
        return None;
    }
    i64::try_from(mac_seconds)
        .ok()
        .map(|t| t - MAC_EPOCH_OFFSET)
}

/// Read a 32- or 64-bit field depending on the full box version.
fn versioned(c: &mut ByteCursor, version: u8) -> Result<u64> {
    match version {
        0 => Ok(c.be_u32()? as u64),
        1 => c.be_u64(),
        v => Err(ProbeError::unsupported(format!("box version {}", v))),
    }
}

fn seconds(duration: u64, timescale: u32) -> Option<f64> {
    (timescale > 0).then(|| duration as f64 / timescale as f64)
}

#[derive(Debug, Clone, Serialize)]
pub struct FileType {
    pub major_brand: String,
    pub minor_version: u32,
    pub compatible_brands: Vec<String>,
}

pub fn parse_ftyp(c: &mut ByteCursor) -> Result<FileType> {
    let major_brand = fourcc_str(&c.fourcc()?);
    let minor_version = c.be_u32()?;
    let mut compatible_brands = Vec::with_capacity(c.remaining() / 4);
    while c.remaining() >= 4 {
        compatible_brands.push(fourcc_str(&c.fourcc()?));
    }
    Ok(FileType {
        major_brand,
        minor_version,
        compatible_brands,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct MovieHeader {
    pub version: u8,
    pub creation_time: Option<i64>,
    pub modification_time: Option<i64>,
    pub timescale: u32,
    pub duration: u64,
    pub duration_seconds: Option<f64>,
    pub preferred_rate: f64,
    pub preferred_volume: f64,
    pub next_track_id: u32,
}

pub fn parse_mvhd(c: &mut ByteCursor) -> Result<MovieHeader> {
    let (version, _) = full_box(c)?;
    let creation = versioned(c, version)?;
    let modification = versioned(c, version)?;
    let timescale = c.be_u32()?;
    let duration = versioned(c, version)?;
    let preferred_rate = c.be_fixed16_16()?;
    let preferred_volume = c.be_fixed8_8()?;
    // reserved(10) + matrix(36) + pre_defined(24)
    c.skip(70)?;
    let next_track_id = c.be_u32()?;

    Ok(MovieHeader {
        version,
        creation_time: unix_time(creation),
        modification_time: unix_time(modification),
        timescale,
        duration,
        duration_seconds: seconds(duration, timescale),
        preferred_rate,
        preferred_volume,
        next_track_id,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackHeader {
    pub version: u8,
    pub flags: u32,
    pub enabled: bool,
    pub in_movie: bool,
    pub in_preview: bool,
    pub creation_time: Option<i64>,
    pub modification_time: Option<i64>,
    pub track_id: u32,
    pub duration: u64,
    pub layer: i16,
    pub alternate_group: i16,
    pub volume: f64,
    pub width: f64,
    pub height: f64,
}

pub fn parse_tkhd(c: &mut ByteCursor) -> Result<TrackHeader> {
    let (version, flags) = full_box(c)?;
    let creation = versioned(c, version)?;
    let modification = versioned(c, version)?;
    let track_id = c.be_u32()?;
    c.skip(4)?;
    let duration = versioned(c, version)?;
    c.skip(8)?;
    let layer = c.be_i16()?;
    let alternate_group = c.be_i16()?;
    let volume = c.be_fixed8_8()?;
    // reserved(2) + matrix(36)
    c.skip(38)?;
    let width = c.be_fixed16_16()?;
    let height = c.be_fixed16_16()?;

    Ok(TrackHeader {
        version,
        flags,
        enabled: flags & TKHD_ENABLED != 0,
        in_movie: flags & TKHD_IN_MOVIE != 0,
        in_preview: flags & TKHD_IN_PREVIEW != 0,
        creation_time: unix_time(creation),
        modification_time: unix_time(modification),
        track_id,
        duration,
        layer,
        alternate_group,
        volume,
        width,
        height,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaHeader {
    pub version: u8,
    pub creation_time: Option<i64>,
    pub modification_time: Option<i64>,
    pub timescale: u32,
    pub duration: u64,
    pub duration_seconds: Option<f64>,
    pub language: Option<String>,
}

pub fn parse_mdhd(c: &mut ByteCursor) -> Result<MediaHeader> {
    let (version, _) = full_box(c)?;
    let creation = versioned(c, version)?;
    let modification = versioned(c, version)?;
    let timescale = c.be_u32()?;
    let duration = versioned(c, version)?;
    let language = c.be_u16().ok().and_then(packed_language);

    Ok(MediaHeader {
        version,
        creation_time: unix_time(creation),
        modification_time: unix_time(modification),
        timescale,
        duration,
        duration_seconds: seconds(duration, timescale),
        language,
    })
}

/// ISO-639-2/T code packed as three 5-bit letters offset by 0x60.
///
/// Values below 0x400 are Macintosh language codes and carry no letters.
pub fn packed_language(packed: u16) -> Option<String> {
    if packed < 0x400 || packed == 0x7FFF {
        return None;
    }
    let code: String = [10u16, 5, 0]
        .iter()
        .map(|shift| (((packed >> shift) & 0x1F) as u8 + 0x60) as char)
        .collect();
    code.chars().all(|ch| ch.is_ascii_lowercase()).then_some(code)
}

#[derive(Debug, Clone, Serialize)]
pub struct Handler {
    pub handler_type: String,
    pub track_type: &'static str,
    pub media_type: MediaType,
    pub name: Option<String>,
}

pub fn parse_hdlr(c: &mut ByteCursor, max_text: usize) -> Result<Handler> {
    full_box(c)?;
    // pre_defined, or the QuickTime component type
    c.skip(4)?;
    let subtype = c.fourcc()?;
    c.skip(12)?;
    let raw = c.rest();

    // QuickTime writes a Pascal string, ISO a NUL-terminated one.
    let name = match raw.split_first() {
        Some((&len, tail)) if len as usize == tail.len() && len > 0 => text(tail, max_text),
        _ => text(raw, max_text),
    };

    Ok(Handler {
        handler_type: fourcc_str(&subtype),
        track_type: handler_description(&subtype),
        media_type: MediaType::from_handler(&subtype),
        name: (!name.is_empty()).then_some(name),
    })
}

pub fn handler_description(subtype: &[u8; 4]) -> &'static str {
    match subtype {
        b"vide" => "Video",
        b"soun" => "Sound",
        b"hint" => "Hint",
        b"meta" => "Timed Metadata",
        b"text" => "Text",
        b"sbtl" | b"subt" => "Subtitle",
        b"clcp" => "Closed Caption",
        b"tmcd" => "Timecode",
        _ => "Other",
    }
}

/// How many fixed-size entries to look at: the declared count, capped by
/// the scan limit and by what the payload actually holds.
fn scan_len(c: &ByteCursor, declared: u32, entry_size: usize, limit: usize) -> usize {
    (declared as usize).min(limit).min(c.remaining() / entry_size)
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeToSample {
    pub entry_count: u32,
    pub sample_count: u64,
    pub total_duration: u64,
    pub constant_delta: Option<u32>,
    pub entries_scanned: usize,
}

pub fn parse_stts(c: &mut ByteCursor, limit: usize) -> Result<TimeToSample> {
    full_box(c)?;
    let entry_count = c.be_u32()?;
    let scanned = scan_len(c, entry_count, 8, limit);

    let mut sample_count = 0u64;
    let mut total_duration = 0u64;
    let mut deltas: Option<(u32, bool)> = None;
    for _ in 0..scanned {
        let count = c.be_u32()?;
        let delta = c.be_u32()?;
        sample_count += count as u64;
        total_duration = total_duration.saturating_add(count as u64 * delta as u64);
        deltas = match deltas {
            None => Some((delta, true)),
            Some((first, same)) => Some((first, same && first == delta)),
        };
    }

    Ok(TimeToSample {
        entry_count,
        sample_count,
        total_duration,
        constant_delta: deltas.and_then(|(d, same)| same.then_some(d)),
        entries_scanned: scanned,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositionOffsets {
    pub version: u8,
    pub entry_count: u32,
}

pub fn parse_ctts(c: &mut ByteCursor) -> Result<CompositionOffsets> {
    let (version, _) = full_box(c)?;
    Ok(CompositionOffsets {
        version,
        entry_count: c.be_u32()?,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkRun {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleToChunk {
    pub entry_count: u32,
    pub entries: Vec<ChunkRun>,
}

pub fn parse_stsc(c: &mut ByteCursor, preview: usize) -> Result<SampleToChunk> {
    full_box(c)?;
    let entry_count = c.be_u32()?;
    let shown = scan_len(c, entry_count, 12, preview);
    let mut entries = Vec::with_capacity(shown);
    for _ in 0..shown {
        entries.push(ChunkRun {
            first_chunk: c.be_u32()?,
            samples_per_chunk: c.be_u32()?,
            sample_description_index: c.be_u32()?,
        });
    }
    Ok(SampleToChunk {
        entry_count,
        entries,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleSizes {
    /// Uniform size, or 0 when each sample has its own entry.
    pub sample_size: u32,
    pub sample_count: u32,
    pub min_sample_size: Option<u32>,
    pub max_sample_size: Option<u32>,
    pub total_sample_bytes: Option<u64>,
    pub entries_scanned: usize,
}

pub fn parse_stsz(c: &mut ByteCursor, limit: usize) -> Result<SampleSizes> {
    full_box(c)?;
    let sample_size = c.be_u32()?;
    let sample_count = c.be_u32()?;

    if sample_size != 0 {
        return Ok(SampleSizes {
            sample_size,
            sample_count,
            min_sample_size: Some(sample_size),
            max_sample_size: Some(sample_size),
            total_sample_bytes: Some(sample_size as u64 * sample_count as u64),
            entries_scanned: 0,
        });
    }

    let scanned = scan_len(c, sample_count, 4, limit);
    let mut sizes = SizeStats::default();
    for _ in 0..scanned {
        sizes.add(c.be_u32()?);
    }
    Ok(sizes.into_record(sample_count, scanned))
}

/// Compact sample sizes (`stz2`) with 4, 8 or 16-bit fields.
pub fn parse_stz2(c: &mut ByteCursor, limit: usize) -> Result<SampleSizes> {
    full_box(c)?;
    c.skip(3)?;
    let field_size = c.u8()?;
    let sample_count = c.be_u32()?;

    let mut sizes = SizeStats::default();
    let scanned = match field_size {
        4 => {
            let n = (sample_count as usize).min(limit).min(c.remaining() * 2);
            for i in 0..n {
                let byte = c.peek(1)?[0];
                let value = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                if i % 2 == 1 {
                    c.skip(1)?;
                }
                sizes.add(value as u32);
            }
            n
        }
        8 => {
            let n = scan_len(c, sample_count, 1, limit);
            for _ in 0..n {
                sizes.add(c.u8()? as u32);
            }
            n
        }
        16 => {
            let n = scan_len(c, sample_count, 2, limit);
            for _ in 0..n {
                sizes.add(c.be_u16()? as u32);
            }
            n
        }
        other => {
            return Err(ProbeError::unsupported(format!(
                "stz2 field size {}",
                other
            )))
        }
    };
    Ok(sizes.into_record(sample_count, scanned))
}

#[derive(Default)]
struct SizeStats {
    min: Option<u32>,
    max: Option<u32>,
    total: u64,
}

impl SizeStats {
    fn add(&mut self, size: u32) {
        self.min = Some(self.min.map_or(size, |m| m.min(size)));
        self.max = Some(self.max.map_or(size, |m| m.max(size)));
        self.total += size as u64;
    }

    fn into_record(self, sample_count: u32, scanned: usize) -> SampleSizes {
        SampleSizes {
            sample_size: 0,
            sample_count,
            min_sample_size: self.min,
            max_sample_size: self.max,
            total_sample_bytes: self.min.map(|_| self.total),
            entries_scanned: scanned,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkOffsets {
    pub entry_count: u32,
    pub first_offset: Option<u64>,
    pub last_offset: Option<u64>,
}

/// `stco` (32-bit) or `co64` (64-bit) chunk offsets.
pub fn parse_chunk_offsets(c: &mut ByteCursor, wide: bool, limit: usize) -> Result<ChunkOffsets> {
    full_box(c)?;
    let entry_count = c.be_u32()?;
    let width = if wide { 8 } else { 4 };
    let scanned = scan_len(c, entry_count, width, limit);

    let mut first_offset = None;
    let mut last_offset = None;
    for _ in 0..scanned {
        let offset = if wide { c.be_u64()? } else { c.be_u32()? as u64 };
        first_offset.get_or_insert(offset);
        last_offset = Some(offset);
    }
    Ok(ChunkOffsets {
        entry_count,
        first_offset,
        last_offset,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSamples {
    pub entry_count: u32,
    pub first_entries: Vec<u32>,
}

pub fn parse_stss(c: &mut ByteCursor, preview: usize) -> Result<SyncSamples> {
    full_box(c)?;
    let entry_count = c.be_u32()?;
    let shown = scan_len(c, entry_count, 4, preview);
    let first_entries = (0..shown)
        .map(|_| c.be_u32())
        .collect::<Result<Vec<_>>>()?;
    Ok(SyncSamples {
        entry_count,
        first_entries,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Edit {
    pub segment_duration: u64,
    /// -1 marks an empty edit.
    pub media_time: i64,
    pub media_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditList {
    pub version: u8,
    pub entry_count: u32,
    pub entries: Vec<Edit>,
}

pub fn parse_elst(c: &mut ByteCursor, preview: usize) -> Result<EditList> {
    let (version, _) = full_box(c)?;
    let entry_count = c.be_u32()?;
    let entry_size = if version == 1 { 20 } else { 12 };
    let shown = scan_len(c, entry_count, entry_size, preview);

    let mut entries = Vec::with_capacity(shown);
    for _ in 0..shown {
        let (segment_duration, media_time) = if version == 1 {
            (c.be_u64()?, c.be_i64()?)
        } else {
            (c.be_u32()? as u64, c.be_i32()? as i64)
        };
        entries.push(Edit {
            segment_duration,
            media_time,
            media_rate: c.be_fixed16_16()?,
        });
    }
    Ok(EditList {
        version,
        entry_count,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mvhd_v0() -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0];
        data.extend_from_slice(&(MAC_EPOCH_OFFSET as u32 + 1_000).to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&5000u32.to_be_bytes());
        data.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        data.extend_from_slice(&0x0100u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 70]);
        data.extend_from_slice(&3u32.to_be_bytes());
        data
    }

    #[test]
    fn test_parse_mvhd() {
        let data = mvhd_v0();
        let mvhd = parse_mvhd(&mut ByteCursor::new(&data)).unwrap();
        assert_eq!(mvhd.timescale, 1000);
        assert_eq!(mvhd.duration, 5000);
        assert_eq!(mvhd.duration_seconds, Some(5.0));
        assert_eq!(mvhd.creation_time, Some(1_000));
        assert_eq!(mvhd.modification_time, None);
        assert_eq!(mvhd.preferred_rate, 1.0);
        assert_eq!(mvhd.preferred_volume, 1.0);
        assert_eq!(mvhd.next_track_id, 3);
    }

    #[test]
    fn test_parse_mvhd_truncated() {
        let data = mvhd_v0();
        let err = parse_mvhd(&mut ByteCursor::new(&data[..40])).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_parse_tkhd_flags_and_size() {
        let mut data = vec![0, 0, 0, 0x03];
        data.extend_from_slice(&[0u8; 8]);
        data.extend_from_slice(&7u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 8 + 2 + 2 + 2 + 2 + 36]);
        data.extend_from_slice(&(1920u32 << 16).to_be_bytes());
        data.extend_from_slice(&(1080u32 << 16).to_be_bytes());

        let tkhd = parse_tkhd(&mut ByteCursor::new(&data)).unwrap();
        assert_eq!(tkhd.track_id, 7);
        assert!(tkhd.enabled);
        assert!(tkhd.in_movie);
        assert!(!tkhd.in_preview);
        assert_eq!(tkhd.width, 1920.0);
        assert_eq!(tkhd.height, 1080.0);
    }

    #[test]
    fn test_packed_language() {
        // "und"
        assert_eq!(packed_language(0x55C4).as_deref(), Some("und"));
        // "eng"
        assert_eq!(packed_language(0x15C7).as_deref(), Some("eng"));
        assert_eq!(packed_language(0), None);
    }

    #[test]
    fn test_parse_hdlr_names() {
        let mut iso = vec![0u8; 8];
        iso.extend_from_slice(b"vide");
        iso.extend_from_slice(&[0u8; 12]);
        iso.extend_from_slice(b"VideoHandler\0");
        let hdlr = parse_hdlr(&mut ByteCursor::new(&iso), 256).unwrap();
        assert_eq!(hdlr.handler_type, "vide");
        assert_eq!(hdlr.media_type, MediaType::Video);
        assert_eq!(hdlr.name.as_deref(), Some("VideoHandler"));

        let mut qt = vec![0u8; 8];
        qt.extend_from_slice(b"soun");
        qt.extend_from_slice(&[0u8; 12]);
        qt.push(5);
        qt.extend_from_slice(b"Sound");
        let hdlr = parse_hdlr(&mut ByteCursor::new(&qt), 256).unwrap();
        assert_eq!(hdlr.track_type, "Sound");
        assert_eq!(hdlr.name.as_deref(), Some("Sound"));
    }

    #[test]
    fn test_stts_totals_and_constant_delta() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&2u32.to_be_bytes());
        for (count, delta) in [(10u32, 512u32), (5, 512)] {
            data.extend_from_slice(&count.to_be_bytes());
            data.extend_from_slice(&delta.to_be_bytes());
        }
        let stts = parse_stts(&mut ByteCursor::new(&data), 100).unwrap();
        assert_eq!(stts.sample_count, 15);
        assert_eq!(stts.total_duration, 15 * 512);
        assert_eq!(stts.constant_delta, Some(512));
    }

    #[test]
    fn test_stsz_scan_is_bounded() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&1_000_000u32.to_be_bytes());
        for size in [300u32, 100, 200] {
            data.extend_from_slice(&size.to_be_bytes());
        }
        let stsz = parse_stsz(&mut ByteCursor::new(&data), 2).unwrap();
        assert_eq!(stsz.sample_count, 1_000_000);
        assert_eq!(stsz.entries_scanned, 2);
        assert_eq!(stsz.min_sample_size, Some(100));
        assert_eq!(stsz.max_sample_size, Some(300));
        assert_eq!(stsz.total_sample_bytes, Some(400));
    }

    #[test]
    fn test_declared_count_larger_than_payload() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&u32::MAX.to_be_bytes());
        data.extend_from_slice(&9u32.to_be_bytes());
        let stss = parse_stss(&mut ByteCursor::new(&data), 10).unwrap();
        assert_eq!(stss.entry_count, u32::MAX);
        assert_eq!(stss.first_entries, vec![9]);
    }

    #[test]
    fn test_co64_offsets() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&0x1_0000_0000u64.to_be_bytes());
        data.extend_from_slice(&0x2_0000_0000u64.to_be_bytes());
        let co64 = parse_chunk_offsets(&mut ByteCursor::new(&data), true, 100).unwrap();
        assert_eq!(co64.first_offset, Some(0x1_0000_0000));
        assert_eq!(co64.last_offset, Some(0x2_0000_0000));
    }

    #[test]
    fn test_elst_empty_edit() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&(-1i32).to_be_bytes());
        data.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        let elst = parse_elst(&mut ByteCursor::new(&data), 10).unwrap();
        assert_eq!(elst.entries[0].media_time, -1);
        assert_eq!(elst.entries[0].media_rate, 1.0);
    }

    #[test]
    fn test_unknown_version_is_unsupported() {
        let data = [2u8, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            parse_mdhd(&mut ByteCursor::new(&data)),
            Err(ProbeError::UnsupportedVariant(_))
        ));
    }
}
