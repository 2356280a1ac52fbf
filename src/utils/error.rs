//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use thiserror::Error;

/// Errors that can occur while turning trace lines into records
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed trace record: \"{0}\"")]
    MalformedRecord(String),

    #[error("Unsupported trace format: {0}")]
    UnsupportedFormat(String),
}

/// Errors that can occur while reading bytes from a trace source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read trace: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid range response: {0}")]
    InvalidResponse(String),
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),

    #[error("Cannot resolve chunk reference: {0}")]
    UnresolvedChunk(String),
}

/// Errors that stop a tree build
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Unexpected first record type: {0}")]
    UnexpectedFirstRecord(String),

    #[error("Unbalanced {kind} record at time index {time_index}")]
    UnbalancedRecord { kind: String, time_index: f64 },

    #[error("Tree build interrupted")]
    Interrupted,
}

impl BuildError {
    /// Cancellation is not a failure for callers that requested it
    pub fn is_interrupted(&self) -> bool {
        matches!(self, BuildError::Interrupted)
    }
}
