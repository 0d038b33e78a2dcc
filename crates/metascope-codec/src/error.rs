//! Error types for metascope-codec

/// Result type for codec decoding.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Failures while reading a bitstream bit by bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BitstreamError {
    /// The slice ended in the middle of a read.
    #[error("bitstream exhausted at bit {position}")]
    Exhausted { position: usize },

    /// An Exp-Golomb prefix longer than the decoder accepts.
    #[error("Exp-Golomb prefix of {leading_zeros} zero bits exceeds limit")]
    ExpGolombOverflow { leading_zeros: u32 },

    /// More bits requested in one read than fit the return type.
    #[error("cannot read {0} bits at once")]
    TooManyBits(u32),
}

/// Errors returned by the codec parameter decoders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Fewer bytes than the fixed part of the structure requires.
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// The NAL/OBU header does not describe the structure asked for.
    #[error("unexpected unit type: {0}")]
    UnexpectedUnit(String),

    /// Bit-level read failure that could not be recovered locally.
    #[error(transparent)]
    Bitstream(#[from] BitstreamError),
}

impl CodecError {
    pub(crate) fn truncated(what: &'static str, needed: usize, available: usize) -> Self {
        Self::Truncated {
            what,
            needed,
            available,
        }
    }
}
