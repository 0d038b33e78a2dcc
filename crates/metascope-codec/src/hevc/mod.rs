//! HEVC (H.265) parameter parsing
//!
//! This module provides:
//! - Video Parameter Set (VPS) profile/tier/level via fixed offsets
//! - HEVCDecoderConfigurationRecord (`hvcC`, MKV `CodecPrivate`)
//! - Sequence Parameter Set (SPS) dimensions, bit depth and VUI colour

mod sps;

pub use sps::{parse_sps, HevcSps, Vui};

use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::nal::{hevc_nal_type, remove_emulation_prevention, strip_start_code, HEVC_NAL_SPS, HEVC_NAL_VPS};

/// Minimum RBSP length carrying `general_profile_idc`.
const VPS_PROFILE_OFFSET: usize = 4;
/// Offset of `general_level_idc` inside the VPS RBSP.
const VPS_LEVEL_OFFSET: usize = 15;

/// Profile/tier/level fields of a VPS.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HevcVps {
    pub vps_id: u8,
    pub max_layers: u8,
    pub max_sub_layers: u8,
    pub temporal_id_nesting: bool,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub tier: &'static str,
    pub general_profile_idc: u8,
    pub profile_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_profile_compatibility_flags: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_level_idc: Option<u8>,
    /// `general_level_idc / 30`, e.g. 4.0 for 120.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f32>,
}

/// Human-readable name for `general_profile_idc`.
pub fn profile_name(profile_idc: u8) -> &'static str {
    match profile_idc {
        1 => "Main",
        2 => "Main 10",
        3 => "Main Still Picture",
        4 => "Range Extensions",
        5 => "High Throughput",
        9 => "Screen Content Coding",
        _ => "Unknown",
    }
}

fn tier_name(tier_flag: bool) -> &'static str {
    if tier_flag {
        "High"
    } else {
        "Main"
    }
}

/// Decode profile, tier and level from a VPS NAL unit.
///
/// The start code and the two-byte NAL header are optional. The level is
/// left out when the buffer stops before it.
pub fn parse_vps(data: &[u8]) -> Result<HevcVps> {
    let mut nal = strip_start_code(data);
    if nal.len() >= 2 && hevc_nal_type(nal[0]) == HEVC_NAL_VPS {
        nal = &nal[2..];
    }

    let rbsp = remove_emulation_prevention(nal);
    if rbsp.len() <= VPS_PROFILE_OFFSET {
        return Err(CodecError::truncated(
            "HEVC VPS",
            VPS_PROFILE_OFFSET + 1,
            rbsp.len(),
        ));
    }

    let ptl = rbsp[VPS_PROFILE_OFFSET];
    let general_tier_flag = (ptl >> 5) & 0x01 == 1;
    let general_profile_idc = ptl & 0x1F;

    let general_profile_compatibility_flags = rbsp
        .get(5..9)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
    let general_level_idc = rbsp.get(VPS_LEVEL_OFFSET).copied();

    Ok(HevcVps {
        vps_id: rbsp[0] >> 4,
        max_layers: (((rbsp[1] >> 4) & 0x0F) | ((rbsp[0] & 0x03) << 4)) + 1,
        max_sub_layers: ((rbsp[1] >> 1) & 0x07) + 1,
        temporal_id_nesting: rbsp[1] & 0x01 == 1,
        general_profile_space: ptl >> 6,
        general_tier_flag,
        tier: tier_name(general_tier_flag),
        general_profile_idc,
        profile_name: profile_name(general_profile_idc),
        general_profile_compatibility_flags,
        general_level_idc,
        level: general_level_idc.map(|l| l as f32 / 30.0),
    })
}

/// One NAL array from an `hvcC` record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NalArray {
    pub nal_unit_type: u8,
    pub array_completeness: bool,
    pub count: u16,
}

/// Decoded HEVCDecoderConfigurationRecord.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HevcConfig {
    pub configuration_version: u8,
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub tier: &'static str,
    pub general_profile_idc: u8,
    pub profile_name: &'static str,
    pub general_profile_compatibility_flags: u32,
    pub general_level_idc: u8,
    pub level: f32,
    pub chroma_format_idc: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub avg_frame_rate: u16,
    pub constant_frame_rate: u8,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
    pub nal_length_size: u8,
    pub arrays: Vec<NalArray>,
    /// First SPS in the record, when it decodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sps: Option<HevcSps>,
}

/// Parse HEVC codec private data (HEVCDecoderConfigurationRecord)
///
/// This is the format used in MP4 hvcC box and MKV CodecPrivate
pub fn parse_hevc_config(data: &[u8]) -> Result<HevcConfig> {
    if data.len() < 23 {
        return Err(CodecError::truncated("hvcC", 23, data.len()));
    }

    // configurationVersion (8)
    // general_profile_space (2) + general_tier_flag (1) + general_profile_idc (5)
    // general_profile_compatibility_flags (32)
    // general_constraint_indicator_flags (48)
    // general_level_idc (8)
    // reserved (4) + min_spatial_segmentation_idc (12)
    // reserved (6) + parallelismType (2)
    // reserved (6) + chromaFormat (2)
    // reserved (5) + bitDepthLumaMinus8 (3)
    // reserved (5) + bitDepthChromaMinus8 (3)
    // avgFrameRate (16)
    // constantFrameRate (2) + numTemporalLayers (3) + temporalIdNested (1) + lengthSizeMinusOne (2)
    // numOfArrays (8)
    let general_tier_flag = (data[1] >> 5) & 0x01 == 1;
    let general_profile_idc = data[1] & 0x1F;
    let general_level_idc = data[12];

    let mut config = HevcConfig {
        configuration_version: data[0],
        general_profile_space: data[1] >> 6,
        general_tier_flag,
        tier: tier_name(general_tier_flag),
        general_profile_idc,
        profile_name: profile_name(general_profile_idc),
        general_profile_compatibility_flags: u32::from_be_bytes([
            data[2], data[3], data[4], data[5],
        ]),
        general_level_idc,
        level: general_level_idc as f32 / 30.0,
        chroma_format_idc: data[16] & 0x03,
        bit_depth_luma: (data[17] & 0x07) + 8,
        bit_depth_chroma: (data[18] & 0x07) + 8,
        avg_frame_rate: u16::from_be_bytes([data[19], data[20]]),
        constant_frame_rate: data[21] >> 6,
        num_temporal_layers: (data[21] >> 3) & 0x07,
        temporal_id_nested: (data[21] >> 2) & 0x01 == 1,
        nal_length_size: (data[21] & 0x03) + 1,
        arrays: Vec::new(),
        sps: None,
    };

    let num_arrays = data[22];
    let mut pos = 23;

    for _ in 0..num_arrays {
        if pos + 3 > data.len() {
            tracing::debug!("hvcC NAL array header truncated at {}", pos);
            break;
        }

        let array_completeness = (data[pos] >> 7) & 0x01 == 1;
        let nal_unit_type = data[pos] & 0x3F;
        let num_nalus = u16::from_be_bytes([data[pos + 1], data[pos + 2]]);
        pos += 3;

        config.arrays.push(NalArray {
            nal_unit_type,
            array_completeness,
            count: num_nalus,
        });

        for _ in 0..num_nalus {
            if pos + 2 > data.len() {
                break;
            }
            let nalu_length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
            pos += 2;
            if pos + nalu_length > data.len() {
                pos = data.len();
                break;
            }

            let nalu_data = &data[pos..pos + nalu_length];
            pos += nalu_length;

            if nal_unit_type == HEVC_NAL_SPS && config.sps.is_none() {
                match parse_sps(nalu_data) {
                    Ok(sps) => config.sps = Some(sps),
                    Err(e) => tracing::debug!("hvcC SPS not decoded: {}", e),
                }
            }
        }
    }

    Ok(config)
}
