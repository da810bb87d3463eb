//! Error types for archive builds and reads.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T, E = PclError> = std::result::Result<T, E>;

/// Errors raised while building or reading a pclvid archive.
///
/// Only [`PclError::InvalidTimestamp`] is recoverable: the sequencer reports
/// it for a skipped packet and carries on. Everything else aborts the
/// enclosing build or read.
#[derive(Debug, thiserror::Error)]
pub enum PclError {
    /// Caller-supplied staging directory already holds files
    #[error("staging directory is not empty: {0}")]
    WorkspaceNotEmpty(PathBuf),

    /// Packet carried the invalid sentinel timestamp
    #[error("packet {index} has an invalid timestamp")]
    InvalidTimestamp { index: usize },

    /// Every packet of the source was skipped
    #[error("packet source produced zero packets with a valid timestamp")]
    ZeroValidPackets,

    /// Byte planes do not match the declared element layout
    #[error("corrupt channel layout: {0}")]
    CorruptLayout(String),

    /// External encoder failed or produced nothing
    #[error("failed to encode {stream}: {reason}")]
    EncodeFailure { stream: String, reason: String },

    /// External decoder failed or produced a malformed stream
    #[error("failed to decode {stream}: {reason}")]
    DecodeFailure { stream: String, reason: String },

    /// Channel streams or packets disagree on frame counts
    #[error("inconsistent frame sequence: {0}")]
    ConsistencyError(String),

    /// Typed view requested with the wrong element type
    #[error("element type mismatch (expected {expected}, found {found})")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("unsupported format version {found} (max supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("archive entry not found: {0}")]
    MissingEntry(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PclError {
    /// Build an [`PclError::EncodeFailure`] for a stream.
    pub fn encode(stream: impl Into<String>, reason: impl ToString) -> Self {
        Self::EncodeFailure {
            stream: stream.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a [`PclError::DecodeFailure`] for a stream.
    pub fn decode(stream: impl Into<String>, reason: impl ToString) -> Self {
        Self::DecodeFailure {
            stream: stream.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PclError::WorkspaceNotEmpty(PathBuf::from("/tmp/stage"));
        assert!(err.to_string().contains("/tmp/stage"));

        let err = PclError::encode("range_ch0.mp4", "exit status 1");
        assert_eq!(err.to_string(), "failed to encode range_ch0.mp4: exit status 1");

        let err = PclError::UnsupportedVersion {
            found: 7,
            supported: 1,
        };
        assert!(err.to_string().contains("max supported: 1"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PclError = io.into();
        assert!(matches!(err, PclError::Io(_)));
    }
}
