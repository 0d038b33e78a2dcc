//! HEVC Sequence Parameter Set (SPS) parsing

use serde::Serialize;

use crate::bitstream::BitReader;
use crate::error::{BitstreamError, CodecError, Result};
use crate::nal::{hevc_nal_type, remove_emulation_prevention, strip_start_code, HEVC_NAL_SPS};

type BitResult<T> = std::result::Result<T, BitstreamError>;

/// Sequence Parameter Set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HevcSps {
    pub chroma_format_idc: u32,
    /// Picture width in luma samples, after the conformance window
    pub width: u32,
    /// Picture height in luma samples, after the conformance window
    pub height: u32,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vui: Option<Vui>,
}

/// Video Usability Information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vui {
    /// Colour primaries (ITU-T H.273)
    pub colour_primaries: u8,
    /// Transfer characteristics (ITU-T H.273)
    pub transfer_characteristics: u8,
    /// Matrix coefficients (ITU-T H.273)
    pub matrix_coefficients: u8,
    /// Video is full range (0-255) vs limited range (16-235)
    pub video_full_range: bool,
}

/// Parse an SPS NAL unit, with or without start code.
///
/// Unlike the VPS, the SPS has no fixed-offset fields worth keeping on their
/// own, so running out of bits before the bit depths is an error.
pub fn parse_sps(data: &[u8]) -> Result<HevcSps> {
    let nal = strip_start_code(data);
    if nal.len() < 3 {
        return Err(CodecError::truncated("HEVC SPS", 3, nal.len()));
    }
    let nal_type = hevc_nal_type(nal[0]);
    if nal_type != HEVC_NAL_SPS {
        return Err(CodecError::UnexpectedUnit(format!(
            "HEVC NAL type {} is not an SPS",
            nal_type
        )));
    }

    let rbsp = remove_emulation_prevention(&nal[2..]);
    let mut reader = BitReader::new(&rbsp);

    reader.read_bits(4)?; // sps_video_parameter_set_id
    let max_sub_layers_minus1 = reader.read_bits(3)? as u8;
    reader.read_flag()?; // sps_temporal_id_nesting_flag

    skip_profile_tier_level(&mut reader, max_sub_layers_minus1)?;

    reader.read_ue()?; // sps_seq_parameter_set_id
    let chroma_format_idc = reader.read_ue()?;
    let separate_colour_plane = chroma_format_idc == 3 && reader.read_flag()?;

    let mut width = reader.read_ue()?;
    let mut height = reader.read_ue()?;

    if reader.read_flag()? {
        let left = reader.read_ue()?;
        let right = reader.read_ue()?;
        let top = reader.read_ue()?;
        let bottom = reader.read_ue()?;
        let (sub_width, sub_height) = match (chroma_format_idc, separate_colour_plane) {
            (1, false) => (2, 2),
            (2, false) => (2, 1),
            _ => (1, 1),
        };
        width = width.saturating_sub(left.saturating_add(right).saturating_mul(sub_width));
        height = height.saturating_sub(top.saturating_add(bottom).saturating_mul(sub_height));
    }

    let bit_depth_luma = reader.read_ue()?.saturating_add(8).min(255) as u8;
    let bit_depth_chroma = reader.read_ue()?.saturating_add(8).min(255) as u8;

    // VUI sits behind several variable-length sections; a failure there keeps
    // the fields above
    let vui = match skip_to_vui(&mut reader, max_sub_layers_minus1) {
        Ok(true) => parse_vui(&mut reader).ok(),
        Ok(false) => None,
        Err(e) => {
            tracing::trace!("HEVC SPS VUI not reached: {}", e);
            None
        }
    };

    Ok(HevcSps {
        chroma_format_idc,
        width,
        height,
        bit_depth_luma,
        bit_depth_chroma,
        vui,
    })
}

/// Skip from `log2_max_pic_order_cnt_lsb_minus4` up to
/// `vui_parameters_present_flag`, returning that flag.
fn skip_to_vui(reader: &mut BitReader, max_sub_layers_minus1: u8) -> BitResult<bool> {
    reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4

    let sub_layer_ordering_info_present = reader.read_flag()?;
    let start = if sub_layer_ordering_info_present {
        0
    } else {
        max_sub_layers_minus1
    };
    for _ in start..=max_sub_layers_minus1 {
        reader.read_ue()?; // sps_max_dec_pic_buffering_minus1
        reader.read_ue()?; // sps_max_num_reorder_pics
        reader.read_ue()?; // sps_max_latency_increase_plus1
    }

    reader.read_ue()?; // log2_min_luma_coding_block_size_minus3
    reader.read_ue()?; // log2_diff_max_min_luma_coding_block_size
    reader.read_ue()?; // log2_min_luma_transform_block_size_minus2
    reader.read_ue()?; // log2_diff_max_min_luma_transform_block_size
    reader.read_ue()?; // max_transform_hierarchy_depth_inter
    reader.read_ue()?; // max_transform_hierarchy_depth_intra

    if reader.read_flag()? && reader.read_flag()? {
        // scaling_list_enabled_flag && sps_scaling_list_data_present_flag
        skip_scaling_list_data(reader)?;
    }

    reader.read_flag()?; // amp_enabled_flag
    reader.read_flag()?; // sample_adaptive_offset_enabled_flag

    if reader.read_flag()? {
        reader.read_bits(4)?; // pcm_sample_bit_depth_luma_minus1
        reader.read_bits(4)?; // pcm_sample_bit_depth_chroma_minus1
        reader.read_ue()?; // log2_min_pcm_luma_coding_block_size_minus3
        reader.read_ue()?; // log2_diff_max_min_pcm_luma_coding_block_size
        reader.read_flag()?; // pcm_loop_filter_disabled_flag
    }

    let num_short_term_ref_pic_sets = reader.read_ue()?;
    if num_short_term_ref_pic_sets > 64 {
        return Err(BitstreamError::ExpGolombOverflow {
            leading_zeros: num_short_term_ref_pic_sets,
        });
    }
    let mut num_delta_pocs = Vec::with_capacity(num_short_term_ref_pic_sets as usize);
    for idx in 0..num_short_term_ref_pic_sets as usize {
        let count = skip_short_term_ref_pic_set(reader, idx, &num_delta_pocs)?;
        num_delta_pocs.push(count);
    }

    if reader.read_flag()? {
        let num_long_term_ref_pics = reader.read_ue()?;
        for _ in 0..num_long_term_ref_pics.min(33) {
            reader.read_ue()?; // lt_ref_pic_poc_lsb_sps
            reader.read_flag()?; // used_by_curr_pic_lt_sps_flag
        }
    }

    reader.read_flag()?; // sps_temporal_mvp_enabled_flag
    reader.read_flag()?; // strong_intra_smoothing_enabled_flag

    reader.read_flag()
}

/// Skip profile_tier_level with profilePresentFlag set.
pub(crate) fn skip_profile_tier_level(
    reader: &mut BitReader,
    max_sub_layers_minus1: u8,
) -> BitResult<()> {
    // general profile (8) + compatibility (32) + constraints (48) + level (8)
    reader.skip_bits(96)?;

    let mut sub_layer_profile_present = Vec::with_capacity(max_sub_layers_minus1 as usize);
    let mut sub_layer_level_present = Vec::with_capacity(max_sub_layers_minus1 as usize);
    for _ in 0..max_sub_layers_minus1 {
        sub_layer_profile_present.push(reader.read_flag()?);
        sub_layer_level_present.push(reader.read_flag()?);
    }

    if max_sub_layers_minus1 > 0 {
        for _ in max_sub_layers_minus1..8 {
            reader.read_bits(2)?; // reserved_zero_2bits
        }
    }

    for (profile_present, level_present) in sub_layer_profile_present
        .into_iter()
        .zip(sub_layer_level_present)
    {
        if profile_present {
            reader.skip_bits(88)?;
        }
        if level_present {
            reader.read_bits(8)?; // sub_layer_level_idc
        }
    }

    Ok(())
}

fn skip_scaling_list_data(reader: &mut BitReader) -> BitResult<()> {
    for size_id in 0..4u32 {
        let step = if size_id == 3 { 3 } else { 1 };
        for _matrix_id in (0..6).step_by(step) {
            if !reader.read_flag()? {
                reader.read_ue()?; // scaling_list_pred_matrix_id_delta
                continue;
            }
            let coef_num = 64.min(1u32 << (4 + (size_id << 1)));
            if size_id > 1 {
                reader.read_se()?; // scaling_list_dc_coef_minus8
            }
            for _ in 0..coef_num {
                reader.read_se()?; // scaling_list_delta_coef
            }
        }
    }
    Ok(())
}

/// Skip one st_ref_pic_set and return its NumDeltaPocs.
fn skip_short_term_ref_pic_set(
    reader: &mut BitReader,
    idx: usize,
    previous: &[u32],
) -> BitResult<u32> {
    let inter_ref_pic_set_prediction = idx > 0 && reader.read_flag()?;

    if inter_ref_pic_set_prediction {
        reader.read_flag()?; // delta_rps_sign
        reader.read_ue()?; // abs_delta_rps_minus1
        let ref_delta_pocs = previous.get(idx - 1).copied().unwrap_or(0);
        let mut count = 0;
        for _ in 0..=ref_delta_pocs {
            let used_by_curr_pic = reader.read_flag()?;
            let use_delta = used_by_curr_pic || reader.read_flag()?;
            if use_delta {
                count += 1;
            }
        }
        return Ok(count);
    }

    let num_negative_pics = reader.read_ue()?.min(16);
    let num_positive_pics = reader.read_ue()?.min(16);

    for _ in 0..num_negative_pics + num_positive_pics {
        reader.read_ue()?; // delta_poc_minus1
        reader.read_flag()?; // used_by_curr_pic_flag
    }

    Ok(num_negative_pics + num_positive_pics)
}

fn parse_vui(reader: &mut BitReader) -> BitResult<Vui> {
    if reader.read_flag()? {
        let aspect_ratio_idc = reader.read_bits(8)?;
        if aspect_ratio_idc == 255 {
            reader.read_bits(16)?; // sar_width
            reader.read_bits(16)?; // sar_height
        }
    }

    if reader.read_flag()? {
        reader.read_flag()?; // overscan_appropriate_flag
    }

    let mut colour_primaries = 2; // Unspecified
    let mut transfer_characteristics = 2;
    let mut matrix_coefficients = 2;
    let mut video_full_range = false;

    if reader.read_flag()? {
        reader.read_bits(3)?; // video_format
        video_full_range = reader.read_flag()?;

        if reader.read_flag()? {
            colour_primaries = reader.read_bits(8)? as u8;
            transfer_characteristics = reader.read_bits(8)? as u8;
            matrix_coefficients = reader.read_bits(8)? as u8;
        }
    }

    Ok(Vui {
        colour_primaries,
        transfer_characteristics,
        matrix_coefficients,
        video_full_range,
    })
}
