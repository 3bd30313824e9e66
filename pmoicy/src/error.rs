//! Error types for the ICY demultiplexer

/// Result type alias for ICY operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding ICY metadata blocks
///
/// None of these are fatal for the audio path: the splicer logs them,
/// drops the offending block and keeps forwarding audio.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The block does not carry a `StreamTitle='...'` field
    #[error("Metadata block skipped, no StreamTitle field: {raw:?}")]
    MetadataDecodeSkipped { raw: String },
}

impl Error {
    /// Create a skipped-block error from the raw block text
    pub fn skipped(raw: impl Into<String>) -> Self {
        Self::MetadataDecodeSkipped { raw: raw.into() }
    }
}
