//! # metascope-codec
//!
//! Bit-level decoders for codec parameter structures found inside media
//! containers or handed over as bare NAL/OBU buffers.
//!
//! ## Features
//!
//! - Big-endian bit reader with bounded Exp-Golomb (`ue(v)`/`se(v)`) decoding
//! - H.264: SPS (profile, level, chroma format, bit depth, dimensions) and `avcC`
//! - HEVC: VPS profile/tier/level, SPS, `hvcC`
//! - AV1: exact `av1C` records, heuristic sequence-header OBUs
//!
//! ## Example
//!
//! ```
//! use metascope_codec::{decode, Codec};
//!
//! let params = decode(Codec::H264, &[0x67, 0x64, 0x00, 0x2A]).unwrap();
//! assert_eq!(params.profile.as_deref(), Some("High"));
//! assert_eq!(params.level.as_deref(), Some("4.2"));
//! ```

pub mod av1;
pub mod bitstream;
pub mod error;
pub mod h264;
pub mod hevc;
pub mod nal;

pub use error::{BitstreamError, CodecError, Result};

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use av1::Av1SequenceHeader;
use h264::{AvcConfig, H264Sps};
use hevc::{HevcConfig, HevcSps, HevcVps};

/// Codecs with a parameter decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    Hevc,
    Av1,
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::H264 => write!(f, "h264"),
            Codec::Hevc => write!(f, "hevc"),
            Codec::Av1 => write!(f, "av1"),
        }
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "avc1" => Ok(Codec::H264),
            "hevc" | "h265" | "hvc1" | "hev1" => Ok(Codec::Hevc),
            "av1" | "av01" => Ok(Codec::Av1),
            other => Err(format!("unknown codec: {}", other)),
        }
    }
}

/// The structure a buffer was decoded as.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CodecDetails {
    H264Sps(H264Sps),
    AvcConfig(AvcConfig),
    HevcVps(HevcVps),
    HevcSps(HevcSps),
    HevcConfig(HevcConfig),
    Av1(Av1SequenceHeader),
}

/// Codec parameter record: the common fields every decoder can fill, plus
/// the full decoded structure under `details`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodecParameters {
    pub codec: Codec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroma_format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_depth_luma: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit_depth_chroma: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub details: CodecDetails,
}

impl CodecParameters {
    fn empty(codec: Codec, details: CodecDetails) -> Self {
        Self {
            codec,
            profile: None,
            level: None,
            tier: None,
            chroma_format: None,
            bit_depth_luma: None,
            bit_depth_chroma: None,
            width: None,
            height: None,
            details,
        }
    }

    fn from_h264(sps: H264Sps) -> Self {
        let mut params = Self::empty(Codec::H264, CodecDetails::H264Sps(sps.clone()));
        params.fill_h264(&sps);
        params
    }

    fn fill_h264(&mut self, sps: &H264Sps) {
        self.profile = Some(sps.profile_name.to_string());
        self.level = Some(format!("{:.1}", sps.level));
        // non-high profiles are implicitly 8-bit 4:2:0
        let chroma = sps
            .chroma_format_idc
            .or_else(|| (!sps.is_high_profile()).then_some(1));
        self.chroma_format = chroma.and_then(chroma_format_name);
        self.bit_depth_luma = sps
            .bit_depth_luma
            .or_else(|| (!sps.is_high_profile()).then_some(8));
        self.bit_depth_chroma = sps
            .bit_depth_chroma
            .or_else(|| (!sps.is_high_profile()).then_some(8));
        self.width = sps.width;
        self.height = sps.height;
    }

    fn from_avc_config(config: AvcConfig) -> Self {
        let mut params = Self::empty(Codec::H264, CodecDetails::AvcConfig(config.clone()));
        match &config.sps {
            Some(sps) => params.fill_h264(sps),
            None => {
                params.profile = Some(h264::profile_name(config.profile_idc).to_string());
                params.level = Some(format!("{:.1}", config.level_idc as f32 / 10.0));
            }
        }
        params
    }

    fn from_hevc_vps(vps: HevcVps) -> Self {
        let mut params = Self::empty(Codec::Hevc, CodecDetails::HevcVps(vps.clone()));
        params.profile = Some(vps.profile_name.to_string());
        params.tier = Some(vps.tier.to_string());
        params.level = vps.level.map(|l| format!("{:.1}", l));
        params
    }

    fn from_hevc_sps(sps: HevcSps) -> Self {
        let mut params = Self::empty(Codec::Hevc, CodecDetails::HevcSps(sps.clone()));
        params.fill_hevc_sps(&sps);
        params
    }

    fn fill_hevc_sps(&mut self, sps: &HevcSps) {
        self.chroma_format = chroma_format_name(sps.chroma_format_idc);
        self.bit_depth_luma = Some(sps.bit_depth_luma);
        self.bit_depth_chroma = Some(sps.bit_depth_chroma);
        self.width = Some(sps.width);
        self.height = Some(sps.height);
    }

    fn from_hevc_config(config: HevcConfig) -> Self {
        let mut params = Self::empty(Codec::Hevc, CodecDetails::HevcConfig(config.clone()));
        params.profile = Some(config.profile_name.to_string());
        params.tier = Some(config.tier.to_string());
        params.level = Some(format!("{:.1}", config.level));
        params.chroma_format = chroma_format_name(config.chroma_format_idc as u32);
        params.bit_depth_luma = Some(config.bit_depth_luma);
        params.bit_depth_chroma = Some(config.bit_depth_chroma);
        if let Some(sps) = &config.sps {
            params.width = Some(sps.width);
            params.height = Some(sps.height);
        }
        params
    }

    fn from_av1(header: Av1SequenceHeader) -> Self {
        let mut params = Self::empty(Codec::Av1, CodecDetails::Av1(header.clone()));
        params.profile = Some(header.profile_name.to_string());
        params.level = header.level.clone();
        params.tier = header
            .seq_tier
            .map(|t| if t == 1 { "High" } else { "Main" }.to_string());
        params.chroma_format = header.chroma_format();
        params.bit_depth_luma = header.bit_depth;
        params.bit_depth_chroma = header.bit_depth;
        params
    }
}

/// `chroma_format_idc` as a subsampling ratio.
pub fn chroma_format_name(chroma_format_idc: u32) -> Option<&'static str> {
    match chroma_format_idc {
        0 => Some("4:0:0"),
        1 => Some("4:2:0"),
        2 => Some("4:2:2"),
        3 => Some("4:4:4"),
        _ => None,
    }
}

/// Decode a bare parameter buffer for `codec`.
///
/// - H.264: an SPS NAL unit (start code and header optional) or an `avcC` record
/// - HEVC: a VPS or SPS NAL unit, or an `hvcC` record
/// - AV1: an `av1C` record or a sequence-header OBU
pub fn decode(codec: Codec, data: &[u8]) -> Result<CodecParameters> {
    match codec {
        Codec::H264 => {
            if data.first() == Some(&1) && data.len() >= 6 {
                return h264::parse_avc_config(data).map(CodecParameters::from_avc_config);
            }
            let unit = find_unit(data, |h| nal::h264_nal_type(h) == nal::H264_NAL_SPS)
                .unwrap_or(data);
            h264::parse_sps(unit).map(CodecParameters::from_h264)
        }
        Codec::Hevc => {
            if data.first() == Some(&1) && data.len() >= 23 {
                return hevc::parse_hevc_config(data).map(CodecParameters::from_hevc_config);
            }
            if let Some(vps) = find_unit(data, |h| nal::hevc_nal_type(h) == nal::HEVC_NAL_VPS) {
                return hevc::parse_vps(vps).map(CodecParameters::from_hevc_vps);
            }
            match find_unit(data, |h| nal::hevc_nal_type(h) == nal::HEVC_NAL_SPS) {
                Some(sps) => hevc::parse_sps(sps).map(CodecParameters::from_hevc_sps),
                None => hevc::parse_vps(data).map(CodecParameters::from_hevc_vps),
            }
        }
        Codec::Av1 => av1::parse_sequence_header(data).map(CodecParameters::from_av1),
    }
}

/// First NAL unit of an Annex-B stream whose header byte matches.
fn find_unit(data: &[u8], matches: impl Fn(u8) -> bool) -> Option<&[u8]> {
    nal::split_annex_b(data)
        .into_iter()
        .find(|unit| unit.first().is_some_and(|&h| matches(h)))
}

/// Decode a codec configuration record (`avcC`, `hvcC`, `av1C`, or the
/// matching MKV `CodecPrivate`).
pub fn decode_config_record(codec: Codec, data: &[u8]) -> Result<CodecParameters> {
    match codec {
        Codec::H264 => h264::parse_avc_config(data).map(CodecParameters::from_avc_config),
        Codec::Hevc => hevc::parse_hevc_config(data).map(CodecParameters::from_hevc_config),
        Codec::Av1 => av1::parse_config_record(data).map(CodecParameters::from_av1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_from_str() {
        assert_eq!("H264".parse::<Codec>(), Ok(Codec::H264));
        assert_eq!("hvc1".parse::<Codec>(), Ok(Codec::Hevc));
        assert_eq!("av01".parse::<Codec>(), Ok(Codec::Av1));
        assert!("vp9".parse::<Codec>().is_err());
    }

    #[test]
    fn test_decode_h264_summary() {
        let params = decode(Codec::H264, &[0x67, 0x4D, 0x40, 0x1F]).unwrap();
        assert_eq!(params.profile.as_deref(), Some("Main"));
        assert_eq!(params.level.as_deref(), Some("3.1"));
        assert_eq!(params.chroma_format, Some("4:2:0"));
        assert_eq!(params.bit_depth_luma, Some(8));
    }

    #[test]
    fn test_decode_high_profile_without_tail_has_no_depth() {
        let params = decode(Codec::H264, &[0x67, 0x64, 0x00, 0x2A]).unwrap();
        assert_eq!(params.bit_depth_luma, None);
        assert_eq!(params.chroma_format, None);
    }

    #[test]
    fn test_decode_av1_record() {
        let params = decode(Codec::Av1, &[0x81, 0x08, 0x0C, 0x00]).unwrap();
        assert_eq!(params.codec, Codec::Av1);
        assert_eq!(params.level.as_deref(), Some("4.0"));
        assert_eq!(params.tier.as_deref(), Some("Main"));
        assert_eq!(params.bit_depth_luma, Some(8));
        assert_eq!(params.chroma_format, Some("4:2:0"));
    }

    #[test]
    fn test_decode_picks_sps_from_annex_b_stream() {
        let stream = [
            0, 0, 0, 1, 0x09, 0xF0, // access unit delimiter
            0, 0, 0, 1, 0x67, 0x4D, 0x40, 0x28, // SPS
            0, 0, 1, 0x68, 0xEE, 0x3C, 0x80, // PPS
        ];
        let params = decode(Codec::H264, &stream).unwrap();
        assert_eq!(params.profile.as_deref(), Some("Main"));
        assert_eq!(params.level.as_deref(), Some("4.0"));
    }

    #[test]
    fn test_decode_hevc_vps_summary() {
        let vps = [
            0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF, 0x01, 0x60, 0x00, 0x00, 0x00, 0x90, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x5D,
        ];
        let params = decode(Codec::Hevc, &vps).unwrap();
        assert_eq!(params.profile.as_deref(), Some("Main"));
        assert_eq!(params.tier.as_deref(), Some("Main"));
        assert_eq!(params.level.as_deref(), Some("3.1"));
    }
}
