//! # metascope-container
//!
//! Hand-rolled metadata walkers for media and image containers.
//!
//! Each format module turns raw bytes into a [`Node`] tree: ISOBMFF boxes,
//! Matroska elements, RIFF chunks (AVI, WebP), PNG chunks and GIF blocks.
//! Malformed pieces are reported inside the tree under `error` and the walk
//! carries on, so a damaged file still yields everything readable in it.
//!
//! ## Example
//!
//! ```no_run
//! use metascope_container::{parse_file, ParseOptions};
//!
//! let report = parse_file("clip.mp4", None, &ParseOptions::default()).unwrap();
//! println!("{} fields from a {} file", report.fields_extracted, report.kind);
//! if let Some(width) = report.tree.lookup("moov.trak.tkhd.width") {
//!     println!("width: {:?}", width);
//! }
//! ```

pub mod detect;
pub mod ebml;
pub mod error;
pub mod gif;
pub mod isobmff;
pub mod mkv;
pub mod options;
pub mod png;
pub mod reader;
pub mod riff;
pub mod track;
pub mod value;
mod walk;

pub use detect::{detect_bytes, detect_file, kind_from_extension, ContainerKind};
pub use error::{ProbeError, Result};
pub use options::{Capabilities, ParseOptions};
pub use track::{MediaType, SampleTableSummary, Track};
pub use value::{ByteRef, Node, Value};

pub use metascope_codec::{Codec, CodecParameters};

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

/// Result of walking one buffer.
#[derive(Debug, Clone, Serialize)]
pub struct ParseReport {
    pub kind: ContainerKind,
    pub tree: Node,
    /// Leaf count of `tree`, not counting `error`/`warnings`.
    pub fields_extracted: usize,
    /// First problem met during the walk, also present at `tree.error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParseReport {
    fn new(kind: ContainerKind, tree: Node) -> Self {
        let fields_extracted = tree.leaf_count();
        let error = tree.get("error").and_then(Value::as_str).map(str::to_string);
        Self {
            kind,
            tree,
            fields_extracted,
            error,
        }
    }

    /// Whether the walk finished without recording any error.
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Parse an in-memory buffer.
///
/// `hint` picks the walker; without it the kind is detected from magic
/// bytes. Only a buffer the chosen walker cannot start on is an `Err`.
pub fn parse_bytes(
    data: &[u8],
    hint: Option<ContainerKind>,
    opts: &ParseOptions,
) -> Result<ParseReport> {
    let kind = match hint {
        Some(kind) => kind,
        None => detect_bytes(data).ok_or_else(|| {
            ProbeError::UnsupportedContainer(
                "Unable to detect container format from magic bytes".to_string(),
            )
        })?,
    };
    debug!("parsing {} bytes as {}", data.len(), kind);

    let tree = match kind {
        ContainerKind::Mp4 => isobmff::parse(data, opts)?,
        ContainerKind::Matroska => mkv::parse(data, opts)?,
        ContainerKind::Avi => riff::avi::parse(data, opts)?,
        ContainerKind::WebP => riff::webp::parse(data, opts)?,
        ContainerKind::Png => png::parse(data, opts)?,
        ContainerKind::Gif => gif::parse(data, opts)?,
    };
    Ok(ParseReport::new(kind, tree))
}

/// Read a file and parse it.
///
/// Without a hint the kind comes from magic bytes, then the extension.
/// Files larger than [`ParseOptions::max_file_size`] are refused.
pub fn parse_file<P: AsRef<Path>>(
    path: P,
    hint: Option<ContainerKind>,
    opts: &ParseOptions,
) -> Result<ParseReport> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProbeError::FileNotFound(path.to_path_buf())
        } else {
            ProbeError::Io(e)
        }
    })?;

    let size = file.metadata()?.len();
    if size > opts.max_file_size {
        return Err(ProbeError::UnsupportedVariant(format!(
            "file is {} bytes, limit is {}",
            size, opts.max_file_size
        )));
    }

    // The file may grow after the size check; never read past the limit.
    let mut data = Vec::new();
    file.take(opts.max_file_size).read_to_end(&mut data)?;

    let kind = match hint.or_else(|| detect_bytes(&data)) {
        Some(kind) => kind,
        None => kind_from_extension(path).ok_or_else(|| {
            ProbeError::UnsupportedContainer(format!(
                "Unable to detect container format of {}",
                path.display()
            ))
        })?,
    };
    parse_bytes(&data, Some(kind), opts)
}

/// Decode a bare NAL unit or OBU buffer.
pub fn decode_codec(codec: Codec, data: &[u8]) -> Result<CodecParameters> {
    Ok(metascope_codec::decode(codec, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes_detects_kind() {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&[2, 0, 2, 0, 0, 0, 0, 0x3B]);
        let report = parse_bytes(&data, None, &ParseOptions::default()).unwrap();

        assert_eq!(report.kind, ContainerKind::Gif);
        assert!(report.is_clean());
        assert_eq!(report.fields_extracted, report.tree.leaf_count());
    }

    #[test]
    fn test_parse_bytes_unknown() {
        assert!(matches!(
            parse_bytes(b"hello world!", None, &ParseOptions::default()),
            Err(ProbeError::UnsupportedContainer(_))
        ));
    }

    #[test]
    fn test_hint_overrides_detection() {
        let mut data = b"GIF89a".to_vec();
        data.extend_from_slice(&[0; 8]);
        assert!(matches!(
            parse_bytes(&data, Some(ContainerKind::Png), &ParseOptions::default()),
            Err(ProbeError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_report_carries_first_error() {
        // GIF without a trailer
        let mut data = b"GIF87a".to_vec();
        data.extend_from_slice(&[1, 0, 1, 0, 0, 0, 0]);
        let report = parse_bytes(&data, None, &ParseOptions::default()).unwrap();

        assert!(!report.is_clean());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "gif");
        assert_eq!(json["error"], json["tree"]["error"]);
    }

    #[test]
    fn test_decode_codec_h264() {
        let params = decode_codec(Codec::H264, &[0x67, 0x42, 0x00, 0x1E]).unwrap();
        assert_eq!(params.profile.as_deref(), Some("Baseline"));
        assert_eq!(params.level.as_deref(), Some("3.0"));
    }
}
