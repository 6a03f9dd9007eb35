use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kbforge_core::models::{FileSource, MailMessage, TrackedFile};
use kbforge_core::PipelineError;

/// Knowledge base a batch is uploaded into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDestination {
    pub knowledge_base_id: String,
}

impl UploadDestination {
    pub fn new(knowledge_base_id: impl Into<String>) -> Self {
        Self {
            knowledge_base_id: knowledge_base_id.into(),
        }
    }
}

/// Proof that the remote service holds a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Identifier of the stored source, used for follow-up requests.
    pub remote_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.bytes_sent as f64 / self.total_bytes as f64
    }
}

pub type ProgressSender = mpsc::UnboundedSender<TransferProgress>;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{0}")]
    Network(String),

    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("could not read file: {0}")]
    Io(#[from] io::Error),
}

impl From<TransferError> for PipelineError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Network(msg) => PipelineError::Transfer(msg),
            TransferError::Rejected { status, message } => {
                PipelineError::RemoteRejected { status, message }
            }
            TransferError::Cancelled => PipelineError::Cancelled,
            err @ TransferError::Io(_) => PipelineError::Transfer(err.to_string()),
        }
    }
}

/// Remote side of the ingestion pipeline.
///
/// Implementations must watch `cancel` and abandon the remote session when it fires.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(
        &self,
        destination: &UploadDestination,
        file: &TrackedFile,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<UploadReceipt, TransferError>;

    /// Send one batch of extracted sent messages for an uploaded archive.
    async fn submit_messages(
        &self,
        receipt: &UploadReceipt,
        batch: &[MailMessage],
    ) -> Result<(), TransferError>;

    /// Ask the service to index everything submitted for `receipt`.
    async fn finish_processing(&self, receipt: &UploadReceipt) -> Result<(), TransferError>;
}

/// Open the bytes of a tracked file for reading.
pub async fn open_source(source: &FileSource) -> io::Result<Box<dyn AsyncRead + Unpin + Send>> {
    match source {
        FileSource::Path(path) => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(file))
        }
        FileSource::Memory(bytes) => Ok(Box::new(io::Cursor::new(bytes.clone()))),
    }
}
