//! Error types module
//!
//! `PipelineError` is the user-facing error taxonomy of the ingestion pipeline and
//! the content library. Component crates keep their own narrow error enums and
//! convert into this one at the point where a failure is recorded on a tracked
//! file or surfaced as a banner.

use std::io;

use crate::models::UploadState;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like network hiccups
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented to the user.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "TRANSFER_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation may succeed
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the user
    fn suggested_action(&self) -> Option<&'static str>;

    /// Human-readable reason shown next to the failed file or in the banner
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Parse failed: {0}")]
    Parse(String),

    #[error("Remote rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Normalization failed: {0}")]
    Normalization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: UploadState, to: UploadState },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Normalization(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, suggested_action, log_level).
fn pipeline_error_static_metadata(
    err: &PipelineError,
) -> (&'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        PipelineError::Validation(_) => (
            "VALIDATION_ERROR",
            false,
            Some("Choose a supported file type under the size limit"),
            LogLevel::Debug,
        ),
        PipelineError::Transfer(_) => (
            "TRANSFER_ERROR",
            true,
            Some("Check your connection and upload the file again"),
            LogLevel::Warn,
        ),
        PipelineError::Cancelled => ("CANCELLED", true, None, LogLevel::Debug),
        PipelineError::Parse(_) => (
            "PARSE_ERROR",
            false,
            Some("Export the mail archive again and retry"),
            LogLevel::Error,
        ),
        PipelineError::RemoteRejected { .. } => (
            "REMOTE_REJECTED",
            false,
            Some("Contact support if this error persists"),
            LogLevel::Warn,
        ),
        PipelineError::Fetch(_) => (
            "FETCH_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Warn,
        ),
        PipelineError::Normalization(_) => (
            "NORMALIZATION_ERROR",
            false,
            Some("Contact support if this error persists"),
            LogLevel::Error,
        ),
        PipelineError::Configuration(_) => (
            "CONFIGURATION_ERROR",
            false,
            Some("Check environment variables"),
            LogLevel::Error,
        ),
        PipelineError::InvalidTransition { .. } => {
            ("INVALID_STATE_TRANSITION", false, None, LogLevel::Error)
        }
        PipelineError::Internal(_) => (
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
    }
}

impl PipelineError {
    /// Get the error type name for detailed error output
    pub fn error_type(&self) -> &str {
        match self {
            PipelineError::Validation(_) => "Validation",
            PipelineError::Transfer(_) => "Transfer",
            PipelineError::Cancelled => "Cancelled",
            PipelineError::Parse(_) => "Parse",
            PipelineError::RemoteRejected { .. } => "RemoteRejected",
            PipelineError::Fetch(_) => "Fetch",
            PipelineError::Normalization(_) => "Normalization",
            PipelineError::Configuration(_) => "Configuration",
            PipelineError::InvalidTransition { .. } => "InvalidTransition",
            PipelineError::Internal(_) => "Internal",
        }
    }
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        pipeline_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        pipeline_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        pipeline_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        pipeline_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            PipelineError::Validation(ref msg) => msg.clone(),
            PipelineError::Transfer(ref msg) => format!("upload failed: {}", msg),
            PipelineError::Cancelled => "cancelled".to_string(),
            PipelineError::Parse(ref msg) => format!("mail archive could not be read: {}", msg),
            PipelineError::RemoteRejected { status, message } => {
                format!("rejected by server ({}): {}", status, message)
            }
            PipelineError::Fetch(ref msg) => format!("could not load content: {}", msg),
            PipelineError::Normalization(ref msg) => {
                format!("received content in an unknown format: {}", msg)
            }
            PipelineError::Configuration(ref msg) => msg.clone(),
            PipelineError::InvalidTransition { .. } => "Internal error".to_string(),
            PipelineError::Internal(_) => "Internal error".to_string(),
        }
    }
}
