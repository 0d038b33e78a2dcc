//! Parse limits and optional decoders.
//!
//! Passed into every entry point; nothing here is global.

use serde::{Deserialize, Serialize};

/// Optional decoders that can be switched off per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Decode avcC/hvcC/av1C and MKV CodecPrivate into codec parameters.
    pub codec_parameters: bool,
    /// Inflate zTXt and compressed iTXt chunks.
    pub inflate_text: bool,
    /// SHA-256 opaque payloads referenced from the tree.
    pub content_hashes: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            codec_parameters: true,
            inflate_text: true,
            content_hashes: true,
        }
    }
}

/// Limits applied while walking a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// ISOBMFF container and RIFF `LIST` nesting limit.
    pub max_box_depth: usize,
    /// EBML master element nesting limit.
    pub max_element_depth: usize,
    /// Sample table entries scanned for min/max summaries.
    pub max_table_entries: usize,
    /// Entries listed verbatim for stss/elst/stsc.
    pub preview_entries: usize,
    /// Longest decoded text value, in bytes.
    pub max_text_bytes: usize,
    /// Inflation cap for zTXt/iTXt.
    pub max_inflated_bytes: usize,
    /// Largest file `parse_file` will load.
    pub max_file_size: u64,
    pub capabilities: Capabilities,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_box_depth: 6,
            max_element_depth: 8,
            max_table_entries: 1_000_000,
            preview_entries: 10,
            max_text_bytes: 64 * 1024,
            max_inflated_bytes: 1024 * 1024,
            max_file_size: 4 * 1024 * 1024 * 1024,
            capabilities: Capabilities::default(),
        }
    }
}

impl ParseOptions {
    pub fn hash_payloads(&self) -> bool {
        self.capabilities.content_hashes
    }
}
