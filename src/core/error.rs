// Copyright @yucwang 2026

use thiserror::Error;

/// Errors raised while loading, uploading or rendering a volume.
#[derive(Error, Debug)]
pub enum VolumeError {
    /// A required header field is missing, unparsable or out of range.
    #[error("malformed header field '{field}': {reason}")]
    MalformedHeader { field: String, reason: String },

    /// Byte counts disagree (header vs. payload, buffer vs. texture).
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("unsupported element type: {0}")]
    UnsupportedElementType(String),

    /// The payload stream ended before the promised number of bytes.
    #[error("truncated payload: expected {expected} bytes, read {read}")]
    TruncatedPayload { expected: u64, read: u64 },

    /// The device could not allocate a resource.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// An illumination build was superseded before it completed.
    #[error("illumination build cancelled")]
    BuildCancelled,

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid texture handle {0}")]
    InvalidHandle(u64),

    #[error("settings parse error: {0}")]
    Settings(String),

    #[error("missing settings field: {0}")]
    MissingField(&'static str),

    #[error("image output error: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VolumeError {
    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        VolumeError::MalformedHeader { field: field.to_string(), reason: reason.into() }
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        VolumeError::InvalidParameter { name, reason: reason.into() }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, VolumeError::BuildCancelled)
    }
}

pub type Result<T> = std::result::Result<T, VolumeError>;
