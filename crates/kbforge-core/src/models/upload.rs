use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use super::mail::ParseStats;

/// Session-scoped identity of a tracked file.
pub type FileId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    Uploading,
    /// Mail archives only: the upload finished and sent messages are being extracted.
    Parsing,
    Completed,
    Failed,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Completed | UploadState::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, UploadState::Uploading | UploadState::Parsing)
    }

    /// Transitions only move forward; a failed or completed file is never resurrected.
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Pending, Failed)
                | (Uploading, Parsing)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Parsing, Completed)
                | (Parsing, Failed)
        )
    }
}

impl Display for UploadState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadState::Pending => write!(f, "pending"),
            UploadState::Uploading => write!(f, "uploading"),
            UploadState::Parsing => write!(f, "parsing"),
            UploadState::Completed => write!(f, "completed"),
            UploadState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for UploadState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadState::Pending),
            "uploading" => Ok(UploadState::Uploading),
            "parsing" => Ok(UploadState::Parsing),
            "completed" => Ok(UploadState::Completed),
            "failed" => Ok(UploadState::Failed),
            _ => Err(anyhow::anyhow!("Invalid upload state: {}", s)),
        }
    }
}

/// What kind of source an accepted file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Document,
    Video,
    Image,
    Audio,
    Text,
    Mbox,
}

impl SourceKind {
    pub fn is_mbox(&self) -> bool {
        matches!(self, SourceKind::Mbox)
    }
}

/// Segment of the progress bar a file is currently in.
///
/// Non-MBOX files only ever use `Reading`, which then spans the full 0-100 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Reading,
    Parsing,
    ServerProcessing,
}

impl ProgressPhase {
    /// Percentage range occupied by this phase for a mail archive.
    pub fn mbox_range(&self) -> (u8, u8) {
        match self {
            ProgressPhase::Reading => (0, 30),
            ProgressPhase::Parsing => (30, 70),
            ProgressPhase::ServerProcessing => (70, 100),
        }
    }

    /// Server-side work has no observable granularity; render a spinner, not a number.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, ProgressPhase::ServerProcessing)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProgressPhase::Reading => "reading",
            ProgressPhase::Parsing => "parsing",
            ProgressPhase::ServerProcessing => "server-side processing",
        }
    }
}

/// Where the bytes of a tracked file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A file offered for upload, before validation.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub source: FileSource,
}

impl CandidateFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }
}

/// Lifecycle record of one file in an upload batch.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedFile {
    pub id: FileId,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    /// `None` for files rejected at validation.
    pub kind: Option<SourceKind>,
    pub state: UploadState,
    pub progress: u8,
    pub phase: Option<ProgressPhase>,
    pub error: Option<String>,
    /// Identifier assigned by the remote service once the transfer succeeded.
    pub remote_id: Option<String>,
    pub mail_stats: Option<ParseStats>,
    pub added_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub source: FileSource,
}

impl TrackedFile {
    pub fn pending(candidate: CandidateFile, kind: SourceKind) -> Self {
        Self::new(candidate, Some(kind), UploadState::Pending, None)
    }

    pub fn rejected(candidate: CandidateFile, reason: String) -> Self {
        Self::new(candidate, None, UploadState::Failed, Some(reason))
    }

    fn new(
        candidate: CandidateFile,
        kind: Option<SourceKind>,
        state: UploadState,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: candidate.name,
            content_type: candidate.content_type,
            size: candidate.size,
            kind,
            state,
            progress: 0,
            phase: None,
            error,
            remote_id: None,
            mail_stats: None,
            added_at: Utc::now(),
            source: candidate.source,
        }
    }

    pub fn is_mbox(&self) -> bool {
        self.kind.map(|k| k.is_mbox()).unwrap_or(false)
    }

    /// Whether the file passed validation (regardless of what happened afterwards).
    pub fn was_accepted(&self) -> bool {
        self.kind.is_some()
    }

    pub fn is_indeterminate(&self) -> bool {
        self.state.is_in_flight() && self.phase.map(|p| p.is_indeterminate()).unwrap_or(false)
    }
}
