//! AV1 sequence header decoding
//!
//! Two inputs are accepted. An `AV1CodecConfigurationRecord` (`av1C`,
//! first byte `0x81`) is decoded exactly. Anything else is treated as a bare
//! sequence-header OBU and read with a fixed-offset heuristic: the OBU size
//! field is assumed to be one byte and only the first operating point is
//! looked at. Results from that path carry `approximate = true`.

use serde::Serialize;

use crate::bitstream::BitReader;
use crate::error::{BitstreamError, CodecError, Result};

/// `obu_type` of a sequence header.
pub const OBU_SEQUENCE_HEADER: u8 = 1;

/// marker bit + version 1
const AV1C_MARKER_VERSION: u8 = 0x81;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Av1Source {
    /// `av1C` configuration record.
    ConfigRecord,
    /// Bare OBU, heuristic path.
    Obu,
}

/// AV1 sequence-level parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Av1SequenceHeader {
    pub source: Av1Source,
    pub seq_profile: u8,
    pub profile_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub still_picture: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduced_still_picture_header: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_level_idx: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_tier: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_depth: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monochrome: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroma_subsampling_x: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroma_subsampling_y: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroma_sample_position: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_presentation_delay: Option<u8>,
    pub approximate: bool,
}

impl Av1SequenceHeader {
    fn new(source: Av1Source, seq_profile: u8) -> Self {
        Self {
            source,
            seq_profile,
            profile_name: profile_name(seq_profile),
            still_picture: None,
            reduced_still_picture_header: None,
            seq_level_idx: None,
            level: None,
            seq_tier: None,
            bit_depth: None,
            monochrome: None,
            chroma_subsampling_x: None,
            chroma_subsampling_y: None,
            chroma_sample_position: None,
            initial_presentation_delay: None,
            approximate: source == Av1Source::Obu,
        }
    }

    fn set_level(&mut self, seq_level_idx: u8) {
        self.seq_level_idx = Some(seq_level_idx);
        self.level = Some(level_name(seq_level_idx));
    }

    /// Chroma format implied by the subsampling flags, when known.
    pub fn chroma_format(&self) -> Option<&'static str> {
        if self.monochrome == Some(true) {
            return Some("4:0:0");
        }
        match (self.chroma_subsampling_x?, self.chroma_subsampling_y?) {
            (true, true) => Some("4:2:0"),
            (true, false) => Some("4:2:2"),
            (false, false) => Some("4:4:4"),
            (false, true) => None,
        }
    }
}

pub fn profile_name(seq_profile: u8) -> &'static str {
    match seq_profile {
        0 => "Main",
        1 => "High",
        2 => "Professional",
        _ => "Unknown",
    }
}

/// `seq_level_idx` as `X.Y`; 31 means no level constraint.
pub fn level_name(seq_level_idx: u8) -> String {
    if seq_level_idx == 31 {
        return "max".to_string();
    }
    format!("{}.{}", 2 + (seq_level_idx >> 2), seq_level_idx & 0x03)
}

/// Decode an `av1C` record or a sequence-header OBU.
pub fn parse_sequence_header(data: &[u8]) -> Result<Av1SequenceHeader> {
    match data.first() {
        Some(&AV1C_MARKER_VERSION) => parse_config_record(data),
        Some(_) => parse_obu(data),
        None => Err(CodecError::truncated("AV1 sequence header", 1, 0)),
    }
}

/// Decode an `AV1CodecConfigurationRecord`.
pub fn parse_config_record(data: &[u8]) -> Result<Av1SequenceHeader> {
    if data.len() < 4 {
        return Err(CodecError::truncated("av1C", 4, data.len()));
    }
    if data[0] != AV1C_MARKER_VERSION {
        return Err(CodecError::UnexpectedUnit(format!(
            "av1C marker/version byte {:#04x}",
            data[0]
        )));
    }

    let mut header = Av1SequenceHeader::new(Av1Source::ConfigRecord, data[1] >> 5);
    header.set_level(data[1] & 0x1F);
    header.seq_tier = Some(data[2] >> 7);

    let high_bitdepth = (data[2] >> 6) & 0x01 == 1;
    let twelve_bit = (data[2] >> 5) & 0x01 == 1;
    header.bit_depth = Some(match (high_bitdepth, twelve_bit) {
        (true, true) => 12,
        (true, false) => 10,
        _ => 8,
    });
    header.monochrome = Some((data[2] >> 4) & 0x01 == 1);
    header.chroma_subsampling_x = Some((data[2] >> 3) & 0x01 == 1);
    header.chroma_subsampling_y = Some((data[2] >> 2) & 0x01 == 1);
    header.chroma_sample_position = Some(data[2] & 0x03);

    if (data[3] >> 4) & 0x01 == 1 {
        header.initial_presentation_delay = Some((data[3] & 0x0F) + 1);
    }

    Ok(header)
}

/// Heuristic decode of a sequence-header OBU.
///
/// Stops after the first operating point's level and tier. When timing info
/// is present the level is not located and only the profile is returned.
pub fn parse_obu(data: &[u8]) -> Result<Av1SequenceHeader> {
    let obu_header = *data
        .first()
        .ok_or_else(|| CodecError::truncated("AV1 OBU", 1, 0))?;
    let obu_type = (obu_header >> 3) & 0x0F;
    if obu_type != OBU_SEQUENCE_HEADER {
        return Err(CodecError::UnexpectedUnit(format!(
            "OBU type {} is not a sequence header",
            obu_type
        )));
    }

    let has_extension = (obu_header >> 2) & 0x01 == 1;
    let has_size = (obu_header >> 1) & 0x01 == 1;
    let offset = 1 + usize::from(has_extension) + usize::from(has_size);
    let payload = data
        .get(offset..)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| CodecError::truncated("AV1 sequence header", offset + 1, data.len()))?;

    let mut reader = BitReader::new(payload);
    let seq_profile = reader.read_bits(3)? as u8;
    let mut header = Av1SequenceHeader::new(Av1Source::Obu, seq_profile);

    if let Err(e) = read_obu_level(&mut reader, &mut header) {
        tracing::trace!("AV1 sequence header stopped early: {}", e);
    }

    Ok(header)
}

fn read_obu_level(
    reader: &mut BitReader,
    header: &mut Av1SequenceHeader,
) -> std::result::Result<(), BitstreamError> {
    header.still_picture = Some(reader.read_flag()?);
    let reduced = reader.read_flag()?;
    header.reduced_still_picture_header = Some(reduced);

    if reduced {
        header.set_level(reader.read_bits(5)? as u8);
        header.seq_tier = Some(0);
        return Ok(());
    }

    if reader.read_flag()? {
        // timing_info_present_flag: variable-length timing info follows
        return Ok(());
    }
    reader.read_flag()?; // initial_display_delay_present_flag
    reader.read_bits(5)?; // operating_points_cnt_minus_1
    reader.read_bits(12)?; // operating_point_idc[0]
    let seq_level_idx = reader.read_bits(5)? as u8;
    header.set_level(seq_level_idx);
    header.seq_tier = Some(if seq_level_idx > 7 {
        reader.read_bits(1)? as u8
    } else {
        0
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;

    #[test]
    fn test_config_record() {
        // profile 0, level 8 (4.0), main tier, 10-bit 4:2:0
        let record = [0x81, 0x08, 0x4C, 0x00];
        let header = parse_sequence_header(&record).unwrap();
        assert_eq!(header.source, Av1Source::ConfigRecord);
        assert_eq!(header.seq_profile, 0);
        assert_eq!(header.seq_level_idx, Some(8));
        assert_eq!(header.level.as_deref(), Some("4.0"));
        assert_eq!(header.seq_tier, Some(0));
        assert_eq!(header.bit_depth, Some(10));
        assert_eq!(header.chroma_format(), Some("4:2:0"));
        assert!(!header.approximate);
    }

    #[test]
    fn test_obu_heuristic() {
        let mut w = BitWriter::new();
        w.write_bits(0, 3); // seq_profile
        w.write_bit(false); // still_picture
        w.write_bit(false); // reduced_still_picture_header
        w.write_bit(false); // timing_info_present_flag
        w.write_bit(false); // initial_display_delay_present_flag
        w.write_bits(0, 5); // operating_points_cnt_minus_1
        w.write_bits(0, 12); // operating_point_idc
        w.write_bits(9, 5); // seq_level_idx 4.1
        w.write_bit(true); // seq_tier
        let payload = w.into_bytes();

        let mut obu = vec![0x0A, payload.len() as u8];
        obu.extend(&payload);

        let header = parse_sequence_header(&obu).unwrap();
        assert_eq!(header.source, Av1Source::Obu);
        assert_eq!(header.profile_name, "Main");
        assert_eq!(header.seq_level_idx, Some(9));
        assert_eq!(header.level.as_deref(), Some("4.1"));
        assert_eq!(header.seq_tier, Some(1));
        assert!(header.approximate);
    }

    #[test]
    fn test_obu_reduced_still_picture() {
        // profile 1, still, reduced, level 5
        let obu = [0x08, 0b0011_1001, 0b0100_0000];
        let header = parse_obu(&obu).unwrap();
        assert_eq!(header.seq_profile, 1);
        assert_eq!(header.still_picture, Some(true));
        assert_eq!(header.seq_level_idx, Some(5));
        assert_eq!(header.level.as_deref(), Some("3.1"));
    }

    #[test]
    fn test_obu_wrong_type() {
        // temporal delimiter
        assert!(matches!(
            parse_obu(&[0x12, 0x00]),
            Err(CodecError::UnexpectedUnit(_))
        ));
    }

    #[test]
    fn test_level_names() {
        assert_eq!(level_name(0), "2.0");
        assert_eq!(level_name(13), "5.1");
        assert_eq!(level_name(31), "max");
    }
}
