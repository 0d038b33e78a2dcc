//! H.264/AVC sequence parameter set decoding
//!
//! The first three RBSP bytes (`profile_idc`, constraint flags, `level_idc`)
//! are fixed width. Everything after them is Exp-Golomb coded and decoded on
//! a best-effort basis: when the bitstream runs out, the fields decoded so far
//! are kept and `complete` stays `false`.

use serde::Serialize;

use crate::bitstream::BitReader;
use crate::error::{BitstreamError, CodecError, Result};
use crate::nal::{h264_nal_type, remove_emulation_prevention, strip_start_code, H264_NAL_SPS};

/// Profiles that carry `chroma_format_idc` and bit depths in the SPS.
const HIGH_PROFILES: [u8; 13] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

/// Decoded H.264 SPS fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct H264Sps {
    pub profile_idc: u8,
    pub profile_name: &'static str,
    pub constraint_flags: u8,
    pub level_idc: u8,
    /// `level_idc / 10`, e.g. 4.2 for `level_idc == 42`.
    pub level: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq_parameter_set_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroma_format_idc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separate_colour_plane: Option<bool>,
    #[serde(rename = "bit_depth_luma_parsed", skip_serializing_if = "Option::is_none")]
    pub bit_depth_luma: Option<u8>,
    #[serde(rename = "bit_depth_chroma_parsed", skip_serializing_if = "Option::is_none")]
    pub bit_depth_chroma: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_num_ref_frames: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_mbs_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Every field through the frame cropping window was decoded.
    pub complete: bool,
}

impl H264Sps {
    fn new(profile_idc: u8, constraint_flags: u8, level_idc: u8) -> Self {
        Self {
            profile_idc,
            profile_name: profile_name(profile_idc),
            constraint_flags,
            level_idc,
            level: level_idc as f32 / 10.0,
            seq_parameter_set_id: None,
            chroma_format_idc: None,
            separate_colour_plane: None,
            bit_depth_luma: None,
            bit_depth_chroma: None,
            max_num_ref_frames: None,
            frame_mbs_only: None,
            width: None,
            height: None,
            complete: false,
        }
    }

    /// Whether this profile signals chroma format and bit depth explicitly.
    pub fn is_high_profile(&self) -> bool {
        HIGH_PROFILES.contains(&self.profile_idc)
    }
}

/// Human-readable name for an H.264 `profile_idc`.
pub fn profile_name(profile_idc: u8) -> &'static str {
    match profile_idc {
        66 => "Baseline",
        77 => "Main",
        88 => "Extended",
        100 => "High",
        110 => "High 10",
        122 => "High 4:2:2",
        244 => "High 4:4:4 Predictive",
        44 => "CAVLC 4:4:4 Intra",
        83 => "Scalable Baseline",
        86 => "Scalable High",
        118 => "Multiview High",
        128 => "Stereo High",
        138 | 139 => "Multiview Depth High",
        134 => "MFC High",
        135 => "MFC Depth High",
        _ => "Unknown",
    }
}

/// Decode an SPS from a NAL unit, with or without start code and NAL header.
///
/// Fails only when the three fixed-width bytes are missing.
pub fn parse_sps(data: &[u8]) -> Result<H264Sps> {
    let mut nal = strip_start_code(data);
    if let Some(&header) = nal.first() {
        if h264_nal_type(header) == H264_NAL_SPS && header & 0x80 == 0 {
            nal = &nal[1..];
        }
    }

    let rbsp = remove_emulation_prevention(nal);
    if rbsp.len() < 3 {
        return Err(CodecError::truncated("H.264 SPS", 3, rbsp.len()));
    }

    let mut sps = H264Sps::new(rbsp[0], rbsp[1], rbsp[2]);
    let mut reader = BitReader::new(&rbsp[3..]);

    match decode_tail(&mut reader, &mut sps) {
        Ok(()) => sps.complete = true,
        Err(e) => {
            tracing::trace!("H.264 SPS stopped early: {}", e);
        }
    }

    Ok(sps)
}

/// Decode the Exp-Golomb coded fields after `level_idc`, writing each one into
/// `sps` as soon as it is known.
fn decode_tail(reader: &mut BitReader, sps: &mut H264Sps) -> std::result::Result<(), BitstreamError> {
    sps.seq_parameter_set_id = Some(reader.read_ue()?);

    let mut chroma_format_idc = 1;
    if sps.is_high_profile() {
        chroma_format_idc = reader.read_ue()?;
        sps.chroma_format_idc = Some(chroma_format_idc);
        if chroma_format_idc == 3 {
            sps.separate_colour_plane = Some(reader.read_flag()?);
        }
        sps.bit_depth_luma = Some(reader.read_ue()?.saturating_add(8).min(255) as u8);
        sps.bit_depth_chroma = Some(reader.read_ue()?.saturating_add(8).min(255) as u8);

        reader.read_flag()?; // qpprime_y_zero_transform_bypass_flag
        if reader.read_flag()? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if reader.read_flag()? {
                    skip_scaling_list(reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.read_ue()?; // log2_max_frame_num_minus4
    match reader.read_ue()? {
        0 => {
            reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            reader.read_flag()?; // delta_pic_order_always_zero_flag
            reader.read_se()?; // offset_for_non_ref_pic
            reader.read_se()?; // offset_for_top_to_bottom_field
            let cycle = reader.read_ue()?;
            if cycle > 255 {
                return Err(BitstreamError::ExpGolombOverflow {
                    leading_zeros: cycle,
                });
            }
            for _ in 0..cycle {
                reader.read_se()?;
            }
        }
        _ => {}
    }

    sps.max_num_ref_frames = Some(reader.read_ue()?);
    reader.read_flag()?; // gaps_in_frame_num_value_allowed_flag

    let width_in_mbs = reader.read_ue()? as u64 + 1;
    let height_in_map_units = reader.read_ue()? as u64 + 1;
    let frame_mbs_only = reader.read_flag()?;
    sps.frame_mbs_only = Some(frame_mbs_only);
    if !frame_mbs_only {
        reader.read_flag()?; // mb_adaptive_frame_field_flag
    }
    reader.read_flag()?; // direct_8x8_inference_flag

    let frame_height_mul = if frame_mbs_only { 1 } else { 2 };
    let mut width = width_in_mbs * 16;
    let mut height = height_in_map_units * 16 * frame_height_mul;

    // uncropped size is already useful if the cropping window is cut off
    sps.width = u32::try_from(width).ok();
    sps.height = u32::try_from(height).ok();

    if reader.read_flag()? {
        let left = reader.read_ue()? as u64;
        let right = reader.read_ue()? as u64;
        let top = reader.read_ue()? as u64;
        let bottom = reader.read_ue()? as u64;

        let separate_planes = sps.separate_colour_plane.unwrap_or(false);
        let (sub_width, sub_height) = match (chroma_format_idc, separate_planes) {
            (0, _) | (_, true) => (1, 1),
            (1, _) => (2, 2),
            (2, _) => (2, 1),
            _ => (1, 1),
        };
        let crop_unit_x = sub_width;
        let crop_unit_y = sub_height * frame_height_mul;

        width = width.saturating_sub((left + right) * crop_unit_x);
        height = height.saturating_sub((top + bottom) * crop_unit_y);
        sps.width = u32::try_from(width).ok();
        sps.height = u32::try_from(height).ok();
    }

    Ok(())
}

/// Decoded AVCDecoderConfigurationRecord (`avcC`, MKV `CodecPrivate`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvcConfig {
    pub configuration_version: u8,
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    pub nal_length_size: u8,
    pub num_sps: u8,
    pub num_pps: u8,
    /// First SPS in the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sps: Option<H264Sps>,
}

/// Parse an `avcC` record and decode its first SPS.
pub fn parse_avc_config(data: &[u8]) -> Result<AvcConfig> {
    if data.len() < 6 {
        return Err(CodecError::truncated("avcC", 6, data.len()));
    }

    let mut config = AvcConfig {
        configuration_version: data[0],
        profile_idc: data[1],
        profile_compatibility: data[2],
        level_idc: data[3],
        nal_length_size: (data[4] & 0x03) + 1,
        num_sps: data[5] & 0x1F,
        num_pps: 0,
        sps: None,
    };

    let mut pos = 6;
    for _ in 0..config.num_sps {
        let Some(len) = data.get(pos..pos + 2) else {
            return Ok(config);
        };
        let len = u16::from_be_bytes([len[0], len[1]]) as usize;
        pos += 2;
        let Some(nal) = data.get(pos..pos + len) else {
            return Ok(config);
        };
        pos += len;
        if config.sps.is_none() {
            match parse_sps(nal) {
                Ok(sps) => config.sps = Some(sps),
                Err(e) => tracing::debug!("avcC SPS not decoded: {}", e),
            }
        }
    }

    if let Some(&n) = data.get(pos) {
        config.num_pps = n;
    }

    Ok(config)
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> std::result::Result<(), BitstreamError> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_se()?;
            next_scale = (last_scale + delta + 256).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;

    #[test]
    fn test_fixed_fields_only() {
        let sps = parse_sps(&[0x67, 0x64, 0x00, 0x2A]).unwrap();
        assert_eq!(sps.profile_idc, 100);
        assert_eq!(sps.level_idc, 42);
        assert_eq!(sps.profile_name, "High");
        assert!(sps.seq_parameter_set_id.is_none());
        assert!(!sps.complete);
    }

    #[test]
    fn test_high_profile_bit_depths() {
        let mut w = BitWriter::new();
        w.write_ue(0); // seq_parameter_set_id
        w.write_ue(1); // chroma_format_idc
        w.write_ue(2); // bit_depth_luma_minus8
        w.write_ue(2); // bit_depth_chroma_minus8
        let mut data = vec![0x67, 0x64, 0x00, 0x2A];
        data.extend(w.into_bytes());

        let sps = parse_sps(&data).unwrap();
        assert_eq!(sps.seq_parameter_set_id, Some(0));
        assert_eq!(sps.chroma_format_idc, Some(1));
        assert_eq!(sps.bit_depth_luma, Some(10));
        assert_eq!(sps.bit_depth_chroma, Some(10));
        assert!(!sps.complete);
    }

    #[test]
    fn test_start_code_is_stripped() {
        let sps = parse_sps(&[0, 0, 0, 1, 0x67, 0x4D, 0x40, 0x1F]).unwrap();
        assert_eq!(sps.profile_idc, 77);
        assert_eq!(sps.constraint_flags, 0x40);
        assert_eq!(sps.level_idc, 31);
    }

    #[test]
    fn test_main_profile_dimensions() {
        // 1920x1080: 120x68 macroblocks cropped by 8 lines at the bottom
        let mut w = BitWriter::new();
        w.write_ue(0); // seq_parameter_set_id
        w.write_ue(0); // log2_max_frame_num_minus4
        w.write_ue(0); // pic_order_cnt_type
        w.write_ue(2); // log2_max_pic_order_cnt_lsb_minus4
        w.write_ue(4); // max_num_ref_frames
        w.write_bit(false); // gaps_in_frame_num_value_allowed_flag
        w.write_ue(119); // pic_width_in_mbs_minus1
        w.write_ue(67); // pic_height_in_map_units_minus1
        w.write_bit(true); // frame_mbs_only_flag
        w.write_bit(true); // direct_8x8_inference_flag
        w.write_bit(true); // frame_cropping_flag
        w.write_ue(0);
        w.write_ue(0);
        w.write_ue(0);
        w.write_ue(4);
        let mut data = vec![0x67, 77, 0x40, 40];
        data.extend(w.finish_rbsp());

        let sps = parse_sps(&data).unwrap();
        assert!(sps.complete);
        assert_eq!(sps.width, Some(1920));
        assert_eq!(sps.height, Some(1080));
        assert_eq!(sps.max_num_ref_frames, Some(4));
        assert_eq!(sps.chroma_format_idc, None);
    }

    #[test]
    fn test_avc_config_first_sps() {
        let record = [
            0x01, 0x64, 0x00, 0x2A, 0xFF, 0xE1, // version, profile, compat, level, length 4, 1 SPS
            0x00, 0x04, 0x67, 0x64, 0x00, 0x2A, // SPS
            0x01, // PPS count
        ];
        let config = parse_avc_config(&record).unwrap();
        assert_eq!(config.profile_idc, 100);
        assert_eq!(config.nal_length_size, 4);
        assert_eq!(config.num_sps, 1);
        assert_eq!(config.num_pps, 1);
        assert_eq!(config.sps.unwrap().level_idc, 42);
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            parse_sps(&[0x67, 0x64]),
            Err(CodecError::Truncated { .. })
        ));
    }
}
