//! Container format detection

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ProbeError, Result};

/// Bytes needed to tell every supported format apart.
pub const MAGIC_LEN: usize = 12;

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const ISOBMFF_TOP_LEVEL: [&[u8; 4]; 6] = [b"ftyp", b"mdat", b"moov", b"free", b"skip", b"wide"];

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// ISO base media (.mp4, .m4a, .mov)
    Mp4,
    /// Matroska (.mkv, .webm)
    Matroska,
    Avi,
    Png,
    Gif,
    WebP,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 6] = [
        ContainerKind::Mp4,
        ContainerKind::Matroska,
        ContainerKind::Avi,
        ContainerKind::Png,
        ContainerKind::Gif,
        ContainerKind::WebP,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Mp4 => "mp4",
            ContainerKind::Matroska => "matroska",
            ContainerKind::Avi => "avi",
            ContainerKind::Png => "png",
            ContainerKind::Gif => "gif",
            ContainerKind::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::Mp4 => write!(f, "MP4"),
            ContainerKind::Matroska => write!(f, "Matroska"),
            ContainerKind::Avi => write!(f, "AVI"),
            ContainerKind::Png => write!(f, "PNG"),
            ContainerKind::Gif => write!(f, "GIF"),
            ContainerKind::WebP => write!(f, "WebP"),
        }
    }
}

impl FromStr for ContainerKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" | "mov" | "m4a" | "m4v" | "isobmff" => Ok(ContainerKind::Mp4),
            "mkv" | "webm" | "matroska" => Ok(ContainerKind::Matroska),
            "avi" => Ok(ContainerKind::Avi),
            "png" | "apng" => Ok(ContainerKind::Png),
            "gif" => Ok(ContainerKind::Gif),
            "webp" => Ok(ContainerKind::WebP),
            other => Err(ProbeError::UnsupportedContainer(other.to_string())),
        }
    }
}

/// Detect container format from leading magic bytes
pub fn detect_bytes(magic: &[u8]) -> Option<ContainerKind> {
    if magic.starts_with(&EBML_MAGIC) {
        return Some(ContainerKind::Matroska);
    }
    if magic.starts_with(&PNG_MAGIC) {
        return Some(ContainerKind::Png);
    }
    if magic.len() >= 6 && &magic[..3] == b"GIF" {
        return Some(ContainerKind::Gif);
    }
    if magic.len() >= 12 && &magic[..4] == b"RIFF" {
        match &magic[8..12] {
            b"AVI " => return Some(ContainerKind::Avi),
            b"WEBP" => return Some(ContainerKind::WebP),
            _ => {}
        }
    }
    if magic.len() >= 8 && ISOBMFF_TOP_LEVEL.iter().any(|t| &magic[4..8] == *t) {
        return Some(ContainerKind::Mp4);
    }
    None
}

/// Get container type from file extension (fallback)
pub fn kind_from_extension(path: &Path) -> Option<ContainerKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "mkv" | "webm" | "mka" | "mk3d" => Some(ContainerKind::Matroska),
        "mp4" | "m4v" | "m4a" | "mov" | "3gp" | "3g2" => Some(ContainerKind::Mp4),
        "avi" => Some(ContainerKind::Avi),
        "png" | "apng" => Some(ContainerKind::Png),
        "gif" => Some(ContainerKind::Gif),
        "webp" => Some(ContainerKind::WebP),
        _ => None,
    }
}

/// Detect container format of a file, by magic bytes then extension
pub fn detect_file(path: &Path) -> Result<ContainerKind> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProbeError::FileNotFound(path.to_path_buf())
        } else {
            ProbeError::Io(e)
        }
    })?;

    let mut magic = Vec::with_capacity(MAGIC_LEN);
    file.by_ref().take(MAGIC_LEN as u64).read_to_end(&mut magic)?;

    detect_bytes(&magic)
        .or_else(|| kind_from_extension(path))
        .ok_or_else(|| {
            ProbeError::UnsupportedContainer(
                "Unable to detect container format from magic bytes".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_magic() {
        assert_eq!(
            detect_bytes(&[0x1A, 0x45, 0xDF, 0xA3, 0x93]),
            Some(ContainerKind::Matroska)
        );
        assert_eq!(detect_bytes(&PNG_MAGIC), Some(ContainerKind::Png));
        assert_eq!(detect_bytes(b"GIF89a"), Some(ContainerKind::Gif));
        assert_eq!(detect_bytes(b"RIFF\x10\0\0\0AVI LIST"), Some(ContainerKind::Avi));
        assert_eq!(detect_bytes(b"RIFF\x10\0\0\0WEBPVP8 "), Some(ContainerKind::WebP));
        assert_eq!(detect_bytes(b"RIFF\x10\0\0\0WAVE"), None);
        assert_eq!(detect_bytes(b"\0\0\0\x18ftypmp42"), Some(ContainerKind::Mp4));
        assert_eq!(detect_bytes(b"\0\0\0\x08wide"), Some(ContainerKind::Mp4));
        assert_eq!(detect_bytes(b"GIF"), None);
        assert_eq!(detect_bytes(&[]), None);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("MOV".parse::<ContainerKind>().unwrap(), ContainerKind::Mp4);
        assert_eq!("webm".parse::<ContainerKind>().unwrap(), ContainerKind::Matroska);
        assert!("tiff".parse::<ContainerKind>().is_err());
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(
            kind_from_extension(Path::new("a/b/clip.WEBM")),
            Some(ContainerKind::Matroska)
        );
        assert_eq!(kind_from_extension(Path::new("photo.webp")), Some(ContainerKind::WebP));
        assert_eq!(kind_from_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_detect_file_missing() {
        assert!(matches!(
            detect_file(Path::new("/nonexistent/file.mp4")),
            Err(ProbeError::FileNotFound(_))
        ));
    }
}
