//! Matroska element IDs and their payload types.

/// How an element's payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Master,
    UInt,
    Int,
    Float,
    /// Printable ASCII.
    Str,
    Utf8,
    /// Signed nanoseconds since 2001-01-01T00:00:00 UTC.
    Date,
    Binary,
}

#[derive(Debug, Clone, Copy)]
pub struct ElementSpec {
    pub name: &'static str,
    pub kind: Kind,
}

// EBML header
pub const EBML: u32 = 0x1A45DFA3;
pub const DOC_TYPE: u32 = 0x4282;

// Segment and its top-level children
pub const SEGMENT: u32 = 0x18538067;
pub const SEEK_HEAD: u32 = 0x114D9B74;
pub const SEEK: u32 = 0x4DBB;
pub const INFO: u32 = 0x1549A966;
pub const TRACKS: u32 = 0x1654AE6B;
pub const CUES: u32 = 0x1C53BB6B;
pub const CUE_POINT: u32 = 0xBB;
pub const CLUSTER: u32 = 0x1F43B675;
pub const TAGS: u32 = 0x1254C367;
pub const CHAPTERS: u32 = 0x1043A770;
pub const ATTACHMENTS: u32 = 0x1941A469;

// Info
pub const TIMESTAMP_SCALE: u32 = 0x2AD7B1;
pub const DURATION: u32 = 0x4489;
pub const SEGMENT_UID: u32 = 0x73A4;

// Tracks
pub const TRACK_ENTRY: u32 = 0xAE;
pub const CODEC_ID: u32 = 0x86;
pub const CODEC_PRIVATE: u32 = 0x63A2;

// Tags
pub const TAG: u32 = 0x7373;
pub const SIMPLE_TAG: u32 = 0x67C8;

// Chapters
pub const CHAPTER_ATOM: u32 = 0xB6;

// Global elements allowed anywhere
pub const VOID: u32 = 0xEC;
pub const CRC32: u32 = 0xBF;

/// Default `TimestampScale`: one millisecond in nanoseconds.
pub const DEFAULT_TIMESTAMP_SCALE: u64 = 1_000_000;

/// Seconds between 1970-01-01 and the Matroska date epoch (2001-01-01).
pub const MATROSKA_EPOCH_OFFSET: i64 = 978_307_200;

/// Children of `Segment`; one of these ends an unknown-size `Cluster`.
pub fn is_segment_child(id: u32) -> bool {
    matches!(
        id,
        SEEK_HEAD | INFO | TRACKS | CUES | CLUSTER | TAGS | CHAPTERS | ATTACHMENTS
    )
}

/// Name and payload type of a known element.
pub fn lookup(id: u32) -> Option<ElementSpec> {
    use Kind::*;

    let (name, kind) = match id {
        EBML => ("ebml", Master),
        0x4286 => ("ebml_version", UInt),
        0x42F7 => ("ebml_read_version", UInt),
        0x42F2 => ("ebml_max_id_length", UInt),
        0x42F3 => ("ebml_max_size_length", UInt),
        DOC_TYPE => ("doc_type", Str),
        0x4287 => ("doc_type_version", UInt),
        0x4285 => ("doc_type_read_version", UInt),

        SEGMENT => ("segment", Master),
        SEEK_HEAD => ("seek_head", Master),
        SEEK => ("seek", Master),

        INFO => ("info", Master),
        SEGMENT_UID => ("segment_uid", Binary),
        0x7384 => ("segment_filename", Utf8),
        TIMESTAMP_SCALE => ("timestamp_scale", UInt),
        DURATION => ("duration", Float),
        0x4461 => ("date_utc", Date),
        0x7BA9 => ("title", Utf8),
        0x4D80 => ("muxing_app", Utf8),
        0x5741 => ("writing_app", Utf8),

        TRACKS => ("tracks", Master),
        TRACK_ENTRY => ("track_entry", Master),
        0xD7 => ("track_number", UInt),
        0x73C5 => ("track_uid", UInt),
        0x83 => ("track_type", UInt),
        0xB9 => ("flag_enabled", UInt),
        0x88 => ("flag_default", UInt),
        0x55AA => ("flag_forced", UInt),
        0x9C => ("flag_lacing", UInt),
        0x23E383 => ("default_duration", UInt),
        0x536E => ("name", Utf8),
        0x22B59C => ("language", Str),
        0x22B59D => ("language_bcp47", Str),
        CODEC_ID => ("codec_id", Str),
        CODEC_PRIVATE => ("codec_private", Binary),
        0x258688 => ("codec_name", Utf8),
        0x56AA => ("codec_delay", UInt),
        0x56BB => ("seek_pre_roll", UInt),

        0xE0 => ("video", Master),
        0xB0 => ("pixel_width", UInt),
        0xBA => ("pixel_height", UInt),
        0x54B0 => ("display_width", UInt),
        0x54BA => ("display_height", UInt),
        0x54B2 => ("display_unit", UInt),
        0x9A => ("flag_interlaced", UInt),
        0x53B8 => ("stereo_mode", UInt),
        0x53C0 => ("alpha_mode", UInt),
        0x55B0 => ("colour", Master),
        0x55B1 => ("matrix_coefficients", UInt),
        0x55B2 => ("bits_per_channel", UInt),
        0x55B3 => ("chroma_subsampling_horz", UInt),
        0x55B4 => ("chroma_subsampling_vert", UInt),
        0x55B9 => ("range", UInt),
        0x55BA => ("transfer_characteristics", UInt),
        0x55BB => ("primaries", UInt),
        0x55BC => ("max_cll", UInt),
        0x55BD => ("max_fall", UInt),
        0x55D0 => ("mastering_metadata", Master),
        0x55D9 => ("luminance_max", Float),
        0x55DA => ("luminance_min", Float),

        0xE1 => ("audio", Master),
        0xB5 => ("sampling_frequency", Float),
        0x78B5 => ("output_sampling_frequency", Float),
        0x9F => ("channels", UInt),
        0x6264 => ("bit_depth", UInt),

        CUES => ("cues", Master),
        CLUSTER => ("cluster", Master),

        TAGS => ("tags", Master),
        TAG => ("tag", Master),
        0x63C0 => ("targets", Master),
        0x68CA => ("target_type_value", UInt),
        0x63CA => ("target_type", Str),
        0x63C5 => ("tag_track_uid", UInt),
        SIMPLE_TAG => ("simple_tag", Master),
        0x45A3 => ("tag_name", Utf8),
        0x447A => ("tag_language", Str),
        0x4484 => ("tag_default", UInt),
        0x4487 => ("tag_string", Utf8),
        0x4485 => ("tag_binary", Binary),

        CHAPTERS => ("chapters", Master),
        0x45B9 => ("edition_entry", Master),
        0x45BC => ("edition_uid", UInt),
        0x45DB => ("edition_flag_default", UInt),
        CHAPTER_ATOM => ("chapter_atom", Master),
        0x73C4 => ("chapter_uid", UInt),
        0x91 => ("chapter_time_start", UInt),
        0x92 => ("chapter_time_end", UInt),
        0x98 => ("chapter_flag_hidden", UInt),
        0x4598 => ("chapter_flag_enabled", UInt),
        0x80 => ("chapter_display", Master),
        0x85 => ("chap_string", Utf8),
        0x437C => ("chap_language", Str),
        0x437E => ("chap_country", Str),

        ATTACHMENTS => ("attachments", Master),
        0x61A7 => ("attached_file", Master),
        0x467E => ("file_description", Utf8),
        0x466E => ("file_name", Utf8),
        0x4660 => ("file_media_type", Str),
        0x465C => ("file_data", Binary),
        0x46AE => ("file_uid", UInt),

        _ => return None,
    };
    Some(ElementSpec { name, kind })
}
