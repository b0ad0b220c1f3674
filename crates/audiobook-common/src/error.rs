//! Error types for value parsing.

/// Errors produced when parsing the shared value types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A bitrate string could not be parsed.
    #[error("Invalid bitrate: {0}")]
    InvalidBitrate(String),

    /// A sample rate string could not be parsed.
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(String),

    /// Unknown channel mode name.
    #[error("Invalid channel mode: {0} (expected mono or stereo)")]
    InvalidChannelMode(String),

    /// Unknown bitrate control mode name.
    #[error("Invalid bitrate control: {0} (expected abr or cbr)")]
    InvalidBitrateControl(String),
}

impl Error {
    /// Create a new InvalidBitrate error.
    pub fn invalid_bitrate<S: Into<String>>(input: S) -> Self {
        Self::InvalidBitrate(input.into())
    }

    /// Create a new InvalidSampleRate error.
    pub fn invalid_sample_rate<S: Into<String>>(input: S) -> Self {
        Self::InvalidSampleRate(input.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
