use thiserror::Error;

/// All errors produced by scriva-core.
#[derive(Debug, Error)]
pub enum ScrivaError {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("segment index {index} out of range for document of length {len}")]
    SegmentOutOfRange { index: usize, len: usize },

    #[error("unknown word id: {0}")]
    UnknownWord(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ScrivaError>;
