/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the whole pipeline.
///
/// `Config` failures are raised before any rendering starts; `Asset` failures
/// are recovered locally where a fallback is safe; the remaining variants
/// surface external-process and media failures to the caller unchanged.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("external process '{command}' timed out after {timeout_secs}s")]
    ProcessTimeout { command: String, timeout_secs: u64 },

    #[error("unreadable media '{path}': {detail}")]
    UnreadableMedia { path: String, detail: String },

    #[error("unsupported tempo factor {factor} (supported range {min}..{max})")]
    UnsupportedTempoFactor { factor: f64, min: f64, max: f64 },

    #[error("missing frame index {index} in sequence '{pattern}'")]
    MissingFrame { index: u64, pattern: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::SynthesisUnavailable(msg.into())
    }

    pub fn unreadable(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnreadableMedia {
            path: path.into(),
            detail: detail.into(),
        }
    }
}
