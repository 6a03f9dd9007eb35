//! Domain methods and pipeline seams backed by the HTTP client.
//!
//! Files are uploaded in a chunked session:
//! `POST /knowledge-bases/{kb}/uploads` opens it, each chunk is a
//! `PUT /uploads/{id}/chunks/{index}`, and `POST /uploads/{id}/complete`
//! returns the stored source. A cancelled session is abandoned with
//! `DELETE /uploads/{id}`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio_util::sync::CancellationToken;

use kbforge_core::models::{ContentType, Cursor, MailMessage, TrackedFile, Verdict};
use kbforge_library::{FeedbackSink, KitFetcher, KitPage};
use kbforge_processing::mbox::{ChunkSource, ReaderSource};
use kbforge_processing::upload::{
    open_source, ProgressSender, TransferError, TransferProgress, UploadDestination,
    UploadReceipt, UploadTransport,
};

use crate::{ApiClient, ApiStatusError};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUploadRequest {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub chunk_size: u64,
    pub mail_archive: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadSession {
    pub upload_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletedUpload {
    pub source_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub verdict: Verdict,
}

#[derive(Serialize)]
struct MessageBatch<'a> {
    messages: &'a [MailMessage],
}

/// Map an HTTP-level failure onto the transport taxonomy.
fn transfer_error(err: anyhow::Error) -> TransferError {
    match err.downcast_ref::<ApiStatusError>() {
        Some(status) => TransferError::Rejected {
            status: status.status,
            message: status.body.clone(),
        },
        None => TransferError::Network(format!("{:#}", err)),
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T, TransferError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = fut => result.map_err(transfer_error),
    }
}

impl ApiClient {
    /// List content kits after `cursor`, optionally restricted to one content type.
    pub async fn list_kits(
        &self,
        cursor: Option<&Cursor>,
        content_type: Option<ContentType>,
        limit: u32,
    ) -> Result<KitPage> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }
        if let Some(content_type) = content_type {
            query.push(("type", content_type.kit_type().to_string()));
        }
        self.get("/kits", &query)
            .await
            .context("Failed to list content kits")
    }

    /// Record a good/bad verdict for one generated item.
    pub async fn submit_feedback(&self, content_id: &str, verdict: Verdict) -> Result<()> {
        let path = format!("/content/{}/feedback", urlencoding::encode(content_id));
        self.post_json_unit(&path, &FeedbackRequest { verdict })
            .await
            .with_context(|| format!("Failed to send feedback for {}", content_id))
    }

    async fn send_chunks(
        &self,
        session: &UploadSession,
        file: &TrackedFile,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, TransferError> {
        let reader = open_source(&file.source).await?;
        let mut source = ReaderSource::new(reader, self.upload_chunk_size());
        let upload_id = urlencoding::encode(&session.upload_id).into_owned();

        let mut index: u64 = 0;
        let mut sent: u64 = 0;
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                chunk = source.next_chunk() => chunk?,
            };
            let Some(chunk) = chunk else { break };
            let len = chunk.len() as u64;

            cancellable(
                cancel,
                self.put_bytes(&format!("/uploads/{}/chunks/{}", upload_id, index), chunk),
            )
            .await?;

            index += 1;
            sent += len;
            let _ = progress.send(TransferProgress {
                bytes_sent: sent,
                total_bytes: file.size.max(sent),
            });
        }

        let completed: CompletedUpload = cancellable(
            cancel,
            self.post_json(
                &format!("/uploads/{}/complete", upload_id),
                &serde_json::json!({ "chunks": index }),
            ),
        )
        .await?;

        tracing::debug!(
            file_id = %file.id,
            chunks = index,
            bytes = sent,
            source_id = %completed.source_id,
            "Upload session completed"
        );
        Ok(UploadReceipt {
            remote_id: completed.source_id,
        })
    }
}

#[async_trait]
impl UploadTransport for ApiClient {
    async fn upload(
        &self,
        destination: &UploadDestination,
        file: &TrackedFile,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<UploadReceipt, TransferError> {
        let request = CreateUploadRequest {
            filename: file.name.clone(),
            content_type: file.content_type.clone(),
            size: file.size,
            chunk_size: self.upload_chunk_size() as u64,
            mail_archive: file.is_mbox(),
        };
        let path = format!(
            "/knowledge-bases/{}/uploads",
            urlencoding::encode(&destination.knowledge_base_id)
        );
        let session: UploadSession = cancellable(&cancel, self.post_json(&path, &request)).await?;

        match self.send_chunks(&session, file, &progress, &cancel).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                let abort = format!("/uploads/{}", urlencoding::encode(&session.upload_id));
                if let Err(abort_err) = self.delete(&abort).await {
                    tracing::warn!(
                        upload_id = %session.upload_id,
                        error = %abort_err,
                        "Failed to abandon upload session"
                    );
                }
                Err(e)
            }
        }
    }

    async fn submit_messages(
        &self,
        receipt: &UploadReceipt,
        batch: &[MailMessage],
    ) -> Result<(), TransferError> {
        let path = format!("/sources/{}/messages", urlencoding::encode(&receipt.remote_id));
        self.post_json_unit(&path, &MessageBatch { messages: batch })
            .await
            .map_err(transfer_error)
    }

    async fn finish_processing(&self, receipt: &UploadReceipt) -> Result<(), TransferError> {
        let path = format!("/sources/{}/process", urlencoding::encode(&receipt.remote_id));
        self.post_json_unit(&path, &serde_json::json!({}))
            .await
            .map_err(transfer_error)
    }
}

#[async_trait]
impl KitFetcher for ApiClient {
    async fn fetch_kits(
        &self,
        cursor: Option<&Cursor>,
        content_type: Option<ContentType>,
        limit: u32,
    ) -> Result<KitPage> {
        self.list_kits(cursor, content_type, limit).await
    }
}

#[async_trait]
impl FeedbackSink for ApiClient {
    async fn send_feedback(&self, content_id: &str, verdict: Verdict) -> Result<()> {
        self.submit_feedback(content_id, verdict).await
    }
}
