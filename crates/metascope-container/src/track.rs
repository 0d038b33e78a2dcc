//! Unified track record for ISOBMFF, Matroska and AVI.

use serde::Serialize;

/// Kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl MediaType {
    /// ISOBMFF `hdlr` subtype.
    pub fn from_handler(handler: &[u8]) -> Self {
        match handler {
            b"vide" => MediaType::Video,
            b"soun" => MediaType::Audio,
            b"text" | b"sbtl" | b"subt" | b"clcp" => MediaType::Subtitle,
            _ => MediaType::Other,
        }
    }

    /// Matroska `TrackType`.
    pub fn from_matroska(track_type: u64) -> Self {
        match track_type {
            1 => MediaType::Video,
            2 => MediaType::Audio,
            17 => MediaType::Subtitle,
            _ => MediaType::Other,
        }
    }

    /// AVI `strh` `fccType`.
    pub fn from_avi(fcc_type: &[u8]) -> Self {
        match fcc_type {
            b"vids" => MediaType::Video,
            b"auds" => MediaType::Audio,
            b"txts" => MediaType::Subtitle,
            _ => MediaType::Other,
        }
    }
}

/// Sample table summary: counts plus bounded statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleTableSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_sample_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_sample_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sample_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sample_bytes: Option<u64>,
}

impl SampleTableSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One track, stream or `TrackEntry`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub track_id: u64,
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timescale: Option<u64>,
    /// Duration in `timescale` units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits_per_sample: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "SampleTableSummary::is_empty")]
    pub sample_table: SampleTableSummary,
}

impl Track {
    pub fn new(track_id: u64, media_type: MediaType) -> Self {
        Self {
            track_id,
            media_type,
            codec_tag: None,
            codec_name: None,
            timescale: None,
            duration: None,
            duration_seconds: None,
            width: None,
            height: None,
            frame_rate: None,
            sample_rate: None,
            channels: None,
            bits_per_sample: None,
            language: None,
            name: None,
            sample_table: SampleTableSummary::default(),
        }
    }

    /// Fill `duration_seconds` from `duration / timescale`.
    pub fn derive_seconds(&mut self) {
        if let (Some(duration), Some(timescale)) = (self.duration, self.timescale) {
            if timescale > 0 {
                self.duration_seconds = Some(duration as f64 / timescale as f64);
            }
        }
    }
}

/// Human-readable codec name for a sample-entry fourcc or AVI handler.
pub fn fourcc_codec_name(fourcc: &str) -> Option<&'static str> {
    let name = match fourcc.trim_end().to_ascii_lowercase().as_str() {
        "avc1" | "avc3" | "h264" | "x264" => "AVC",
        "hvc1" | "hev1" | "hevc" | "h265" => "HEVC",
        "av01" => "AV1",
        "vp08" | "vp80" => "VP8",
        "vp09" | "vp90" => "VP9",
        "mp4v" | "xvid" | "divx" | "dx50" | "fmp4" => "MPEG-4",
        "mjpg" | "jpeg" => "Motion JPEG",
        "apch" | "apcn" | "apcs" | "apco" | "ap4h" => "ProRes",
        "mp4a" => "AAC",
        "ac-3" => "AC-3",
        "ec-3" => "E-AC-3",
        "opus" => "Opus",
        "flac" | "fla" => "FLAC",
        "alac" => "ALAC",
        ".mp3" | "mp3" => "MP3",
        "lpcm" | "sowt" | "twos" | "in24" | "in32" | "fl32" | "fl64" | "raw" => "PCM",
        "tx3g" => "3GPP Timed Text",
        "wvtt" => "WebVTT",
        "c608" => "CEA-608",
        _ => return None,
    };
    Some(name)
}

/// Human-readable codec name for a Matroska `CodecID`.
pub fn codec_id_to_name(codec_id: &str) -> String {
    match codec_id {
        // Video
        "V_MPEG4/ISO/AVC" => "AVC".to_string(),
        "V_MPEGH/ISO/HEVC" => "HEVC".to_string(),
        "V_AV1" => "AV1".to_string(),
        "V_VP8" => "VP8".to_string(),
        "V_VP9" => "VP9".to_string(),
        "V_MPEG1" => "MPEG-1".to_string(),
        "V_MPEG2" => "MPEG-2".to_string(),
        "V_MPEG4/ISO/SP" | "V_MPEG4/ISO/ASP" | "V_MPEG4/ISO/AP" => "MPEG-4".to_string(),
        "V_THEORA" => "Theora".to_string(),
        "V_MS/VFW/FOURCC" => "VfW".to_string(),

        // Audio
        "A_AAC" | "A_AAC/MPEG2/LC" | "A_AAC/MPEG4/LC" | "A_AAC/MPEG4/LC/SBR" => "AAC".to_string(),
        "A_AC3" => "AC-3".to_string(),
        "A_EAC3" => "E-AC-3".to_string(),
        "A_DTS" => "DTS".to_string(),
        "A_TRUEHD" => "TrueHD".to_string(),
        "A_FLAC" => "FLAC".to_string(),
        "A_VORBIS" => "Vorbis".to_string(),
        "A_OPUS" => "Opus".to_string(),
        "A_PCM/INT/LIT" | "A_PCM/INT/BIG" => "PCM".to_string(),
        "A_PCM/FLOAT/IEEE" => "PCM Float".to_string(),
        "A_MPEG/L3" => "MP3".to_string(),
        "A_MPEG/L2" => "MP2".to_string(),

        // Subtitles
        "S_TEXT/UTF8" => "SRT".to_string(),
        "S_TEXT/SSA" | "S_TEXT/ASS" => "ASS".to_string(),
        "S_HDMV/PGS" => "PGS".to_string(),
        "S_VOBSUB" => "VobSub".to_string(),
        "S_TEXT/WEBVTT" => "WebVTT".to_string(),

        other => other
            .split_once('_')
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| other.to_string()),
    }
}
