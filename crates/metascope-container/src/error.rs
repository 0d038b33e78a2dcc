//! Error types for metascope-container

use std::path::PathBuf;

use metascope_codec::CodecError;

/// Result type for container parsing.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors that can occur while walking a container
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Fewer bytes available than a declared length requires
    #[error("Truncated at offset {offset}: need {needed} bytes, have {available}")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// Magic bytes do not match the expected format
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Declared size smaller than its header, or a depth limit exceeded
    #[error("Malformed structure: {0}")]
    MalformedStructure(String),

    /// Recognized type whose layout is not decoded
    #[error("Unsupported variant: {0}")]
    UnsupportedVariant(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// No parser for the detected or requested container
    #[error("Unsupported container format: {0}")]
    UnsupportedContainer(String),

    /// Codec parameter decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ProbeError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedStructure(msg.into())
    }

    pub fn invalid_signature(msg: impl Into<String>) -> Self {
        Self::InvalidSignature(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedVariant(msg.into())
    }

    /// Whether the walk stopped only because the input ended early.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}
