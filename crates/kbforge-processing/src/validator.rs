use std::path::Path;

use kbforge_core::constants::{MBOX_CONTENT_TYPE, MBOX_EXTENSION, MIB};
use kbforge_core::models::{CandidateFile, SourceKind};
use kbforge_core::{IngestConfig, PipelineError};

/// Reasons a candidate file is refused before any transfer starts.
///
/// The display text is what the user sees next to the failed file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("exceeds {limit_mb} MB")]
    FileTooLarge { size: u64, limit_mb: u64 },

    #[error("unsupported type")]
    UnsupportedType { content_type: String },

    #[error("file is empty")]
    EmptyFile,
}

impl From<ValidationError> for PipelineError {
    fn from(err: ValidationError) -> Self {
        PipelineError::Validation(err.to_string())
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid { kind: SourceKind },
    Invalid { reason: ValidationError },
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid { .. })
    }
}

/// Source file validator
///
/// Mail archives bypass every other rule: they are accepted whatever their size
/// or declared type, since the parser streams them with bounded memory.
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_file_size: u64,
    allowed_content_types: Vec<String>,
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

impl FileValidator {
    pub fn new(max_file_size: u64, allowed_content_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_content_types: allowed_content_types
                .into_iter()
                .map(|ct| ct.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.max_upload_size_bytes,
            config.allowed_content_types.clone(),
        )
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Run all rules against a candidate, in order.
    pub fn validate(&self, candidate: &CandidateFile) -> Validity {
        if is_mbox(&candidate.name, &candidate.content_type) {
            return Validity::Valid {
                kind: SourceKind::Mbox,
            };
        }

        let checks = self
            .validate_content_type(&candidate.content_type)
            .and_then(|_| self.validate_file_size(candidate.size));

        match checks {
            Ok(()) => Validity::Valid {
                kind: classify(&candidate.content_type),
            },
            Err(reason) => Validity::Invalid { reason },
        }
    }

    /// Validate declared MIME type against the allow-list
    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        let essence = essence(content_type);

        if !self.allowed_content_types.iter().any(|ct| *ct == essence) {
            return Err(ValidationError::UnsupportedType {
                content_type: content_type.to_string(),
            });
        }

        Ok(())
    }

    /// Validate file size
    pub fn validate_file_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                limit_mb: self.max_file_size / MIB,
            });
        }

        Ok(())
    }
}

/// Whether a file is a mail archive, by name or declared type.
pub fn is_mbox(filename: &str, content_type: &str) -> bool {
    if essence(content_type) == MBOX_CONTENT_TYPE {
        return true;
    }

    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    // `Path::extension` is `None` for a dotfile named ".mbox".
    let base = base.to_ascii_lowercase();
    base == MBOX_EXTENSION || base.ends_with(&format!(".{}", MBOX_EXTENSION))
}

/// MIME type without parameters, lowercased ("Text/Plain; charset=utf-8" -> "text/plain").
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

fn classify(content_type: &str) -> SourceKind {
    let essence = essence(content_type);
    match essence.split('/').next().unwrap_or("") {
        "video" => SourceKind::Video,
        "image" => SourceKind::Image,
        "audio" => SourceKind::Audio,
        "text" => SourceKind::Text,
        _ => SourceKind::Document,
    }
}
