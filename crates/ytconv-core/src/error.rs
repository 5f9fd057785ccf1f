//! Error types for Ytconv core operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobId;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Ytconv core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Metadata probe failed (network or site extractor error).
    #[error("Failed to fetch media info: {0}")]
    Probe(String),

    /// Download or transcode failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// Download was cancelled by the user.
    ///
    /// Raised from the progress callback so the extraction client stops at
    /// its next checkpoint. Never shown as a failure.
    #[error("Download cancelled by user")]
    Cancelled,

    /// A required external binary could not be found.
    #[error("Required tool not found: {tool}")]
    ToolMissing {
        /// Name of the missing binary (e.g. `ffmpeg`).
        tool: String,
    },

    /// Quality label does not fit the requested format.
    #[error("Invalid quality '{label}' for {format}")]
    InvalidQuality {
        /// The rejected label.
        label: String,
        /// The format it was requested for.
        format: String,
    },

    /// User input could not be interpreted.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File system operation failed.
    #[error("File system error at {path}: {message}")]
    FileSystem {
        /// Path where the error occurred.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No tracked job has this id.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The controller has been shut down.
    #[error("Download queue has been shut down")]
    ControllerStopped,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error is the cooperative cancellation signal rather than
    /// a genuine failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Shorthand for a missing external tool.
    pub fn tool_missing(tool: impl Into<String>) -> Self {
        Self::ToolMissing { tool: tool.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Probe("HTTP Error 404".to_string());
        assert_eq!(err.to_string(), "Failed to fetch media info: HTTP Error 404");
    }

    #[test]
    fn test_cancellation_is_distinguished() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(!Error::Download("cancelled by user".to_string()).is_cancellation());
        assert!(!Error::tool_missing("ffmpeg").is_cancellation());
    }

    #[test]
    fn test_tool_missing_display() {
        let err = Error::tool_missing("ffmpeg");
        assert_eq!(err.to_string(), "Required tool not found: ffmpeg");
    }

    #[test]
    fn test_file_system_error_display() {
        let err = Error::FileSystem {
            path: PathBuf::from("/test/path"),
            message: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/test/path"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
