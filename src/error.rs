//! Error types for wordpress-hunter

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during scanner setup and reporting
///
/// Per-target scan failures are not represented here; they are captured
/// into the target's [`ScanResult`](crate::ScanResult) so one bad target
/// never aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid URL provided
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to create HTTP client
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    /// Failed to read the target list file
    #[error("failed to read target file '{path}': {source}")]
    TargetFile {
        /// Path of the target list file
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Target list file contained no targets
    #[error("no targets found in '{0}'")]
    NoTargets(String),

    /// Unsupported report file extension
    #[error("unsupported report extension '{0}' (valid: .txt, .csv, .json)")]
    InvalidReportFormat(String),

    /// Output operation failed
    #[error("output failed: {0}")]
    OutputFailed(#[source] std::io::Error),

    /// JSON serialization failed
    #[error("JSON serialization failed")]
    SerializationFailed(#[from] serde_json::Error),
}
