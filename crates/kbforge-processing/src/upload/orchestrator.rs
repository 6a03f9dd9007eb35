use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kbforge_core::models::{
    CandidateFile, FileId, MailMessage, ParseStats, ProgressPhase, TrackedFile, UploadState,
};
use kbforge_core::{ErrorMetadata, IngestConfig, LogLevel, PipelineError};

use super::progress::{advance, overall_percent};
use super::traits::{open_source, UploadDestination, UploadReceipt, UploadTransport};
use crate::mbox::{MboxStreamParser, MessageExtractor, ReaderSource};
use crate::validator::{FileValidator, Validity};

/// How long a cancelled transport gets to abandon its remote session.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Observable changes of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    StateChanged {
        id: FileId,
        from: UploadState,
        to: UploadState,
    },
    Progress {
        id: FileId,
        percent: u8,
        phase: ProgressPhase,
        /// Render a spinner instead of a percentage.
        indeterminate: bool,
    },
    Completed {
        id: FileId,
        name: String,
        remote_id: Option<String>,
        mail_stats: Option<ParseStats>,
    },
    Failed {
        id: FileId,
        name: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoveError {
    #[error("file {0} is being processed and cannot be removed")]
    InFlight(FileId),

    #[error("file {0} not found")]
    NotFound(FileId),
}

/// Cancels one file, or a whole batch, from outside the running orchestrator.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub id: FileId,
    pub name: String,
    pub reason: String,
}

/// Outcome of one [`UploadOrchestrator::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub completed: Vec<FileId>,
    pub failed: Vec<FailedFile>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct MailSettings {
    extractor: MessageExtractor,
    read_chunk_bytes: usize,
    max_message_bytes: usize,
    submit_batch_size: usize,
}

/// Drives a batch of files through validation, transfer and, for mail
/// archives, extraction of sent messages.
///
/// Files are processed one at a time in the order they were added. A failure
/// is recorded on the file and never stops the rest of the batch.
pub struct UploadOrchestrator {
    transport: Arc<dyn UploadTransport>,
    destination: UploadDestination,
    validator: FileValidator,
    mail: MailSettings,
    files: Vec<TrackedFile>,
    tokens: HashMap<FileId, CancellationToken>,
    batch_token: CancellationToken,
    events: Option<mpsc::UnboundedSender<UploadEvent>>,
}

impl UploadOrchestrator {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        destination: UploadDestination,
        config: &IngestConfig,
    ) -> Self {
        Self {
            transport,
            destination,
            validator: FileValidator::from_config(config),
            mail: MailSettings {
                extractor: MessageExtractor::new(&config.mbox_self_addresses),
                read_chunk_bytes: config.mbox_read_chunk_bytes,
                max_message_bytes: config.mbox_max_message_bytes,
                submit_batch_size: config.mbox_submit_batch_size.max(1),
            },
            files: Vec::new(),
            tokens: HashMap::new(),
            batch_token: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<UploadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn destination(&self) -> &UploadDestination {
        &self.destination
    }

    /// Validate and track candidates. Rejected files stay visible as `Failed`.
    pub fn add(&mut self, candidates: impl IntoIterator<Item = CandidateFile>) -> Vec<FileId> {
        let mut ids = Vec::new();
        for candidate in candidates {
            let file = match self.validator.validate(&candidate) {
                Validity::Valid { kind } => TrackedFile::pending(candidate, kind),
                Validity::Invalid { reason } => {
                    tracing::debug!(
                        file_name = %candidate.name,
                        content_type = %candidate.content_type,
                        size = candidate.size,
                        reason = %reason,
                        "Rejected file"
                    );
                    TrackedFile::rejected(candidate, reason.to_string())
                }
            };

            let id = file.id;
            if file.state == UploadState::Failed {
                self.emit(UploadEvent::Failed {
                    id,
                    name: file.name.clone(),
                    reason: file.error.clone().unwrap_or_default(),
                });
            } else {
                self.tokens.insert(id, self.batch_token.child_token());
            }
            self.files.push(file);
            ids.push(id);
        }
        ids
    }

    pub fn files(&self) -> &[TrackedFile] {
        &self.files
    }

    pub fn get(&self, id: FileId) -> Option<&TrackedFile> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Combined size of every tracked file that passed validation.
    pub fn total_size(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.was_accepted())
            .map(|f| f.size)
            .sum()
    }

    pub fn can_remove(&self, id: FileId) -> bool {
        self.get(id).map(|f| !f.state.is_in_flight()).unwrap_or(false)
    }

    pub fn remove(&mut self, id: FileId) -> Result<TrackedFile, RemoveError> {
        let index = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or(RemoveError::NotFound(id))?;

        if self.files[index].state.is_in_flight() {
            return Err(RemoveError::InFlight(id));
        }

        self.tokens.remove(&id);
        Ok(self.files.remove(index))
    }

    /// Remove every file that is not in flight; returns how many were removed.
    ///
    /// A fired batch cancellation is reset, so files added afterwards can run.
    pub fn clear(&mut self) -> usize {
        if self.batch_token.is_cancelled() {
            self.batch_token = CancellationToken::new();
        }
        let before = self.files.len();
        let tokens = &mut self.tokens;
        self.files.retain(|f| {
            let keep = f.state.is_in_flight();
            if !keep {
                tokens.remove(&f.id);
            }
            keep
        });
        before - self.files.len()
    }

    pub fn cancel_handle(&self, id: FileId) -> Option<CancelHandle> {
        self.tokens.get(&id).map(|token| CancelHandle {
            token: token.clone(),
        })
    }

    /// Handle that cancels every file of this batch, including ones added later.
    ///
    /// Once fired, newly added files fail as cancelled until [`Self::clear`] is called.
    pub fn batch_cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.batch_token.clone(),
        }
    }

    /// Cancel a file. Pending files fail at once; terminal files are left alone.
    pub fn cancel(&mut self, id: FileId) -> bool {
        let Some(state) = self.get(id).map(|f| f.state) else {
            return false;
        };
        if state.is_terminal() {
            return false;
        }

        if let Some(token) = self.tokens.get(&id) {
            token.cancel();
        }
        if state == UploadState::Pending {
            self.fail(id, &PipelineError::Cancelled);
        }
        true
    }

    /// Process every pending file, sequentially.
    #[tracing::instrument(skip(self), fields(knowledge_base = %self.destination.knowledge_base_id))]
    pub async fn run(&mut self) -> BatchSummary {
        let mut summary = BatchSummary::default();

        loop {
            summary.failed.extend(self.fail_cancelled_pending());

            let Some(id) = self
                .files
                .iter()
                .find(|f| f.state == UploadState::Pending)
                .map(|f| f.id)
            else {
                break;
            };

            match self.process_file(id).await {
                Ok(()) => summary.completed.push(id),
                Err(err) => {
                    let reason = self.fail(id, &err);
                    let name = self.get(id).map(|f| f.name.clone()).unwrap_or_default();
                    summary.failed.push(FailedFile { id, name, reason });
                }
            }
        }

        tracing::info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            "Upload batch finished"
        );
        summary
    }

    #[tracing::instrument(skip(self), fields(file_id = %id))]
    async fn process_file(&mut self, id: FileId) -> Result<(), PipelineError> {
        let file = self
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::Internal(format!("file {} disappeared", id)))?;
        let token = self
            .tokens
            .get(&id)
            .cloned()
            .unwrap_or_else(|| self.batch_token.child_token());

        if file.is_mbox() && !self.mail.extractor.has_identities() {
            return Err(PipelineError::Configuration(
                "no sender address configured for mail archives (set MBOX_SELF_ADDRESSES)"
                    .to_string(),
            ));
        }

        tracing::info!(file_name = %file.name, size = file.size, "Uploading file");
        self.transition(id, UploadState::Uploading)?;
        self.report_progress(id, ProgressPhase::Reading, 0.0);

        let receipt = self.transfer(&file, &token).await?;
        if let Some(f) = self.file_mut(id) {
            f.remote_id = Some(receipt.remote_id.clone());
        }
        self.report_progress(id, ProgressPhase::Reading, 1.0);

        if !file.is_mbox() {
            return self.complete(id, None);
        }

        self.transition(id, UploadState::Parsing)?;
        self.report_progress(id, ProgressPhase::Parsing, 0.0);
        let stats = self.extract_mail(&file, &receipt, &token).await?;
        if let Some(f) = self.file_mut(id) {
            f.mail_stats = Some(stats);
        }
        self.report_progress(id, ProgressPhase::Parsing, 1.0);

        tracing::info!(
            emitted = stats.emitted,
            skipped_foreign = stats.skipped_foreign,
            skipped_malformed = stats.skipped_malformed,
            skipped_empty = stats.skipped_empty,
            "Mail archive parsed"
        );

        self.report_progress(id, ProgressPhase::ServerProcessing, 0.0);
        let transport = Arc::clone(&self.transport);
        tokio::select! {
            result = transport.finish_processing(&receipt) => result?,
            _ = token.cancelled() => return Err(PipelineError::Cancelled),
        }

        self.complete(id, Some(stats))
    }

    async fn transfer(
        &mut self,
        file: &TrackedFile,
        token: &CancellationToken,
    ) -> Result<UploadReceipt, PipelineError> {
        let transport = Arc::clone(&self.transport);
        let destination = self.destination.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let upload = transport.upload(&destination, file, tx, token.clone());
        tokio::pin!(upload);

        loop {
            tokio::select! {
                result = &mut upload => return result.map_err(PipelineError::from),
                Some(progress) = rx.recv() => {
                    self.report_progress(file.id, ProgressPhase::Reading, progress.fraction());
                }
                _ = token.cancelled() => {
                    if tokio::time::timeout(CANCEL_GRACE, &mut upload).await.is_err() {
                        tracing::warn!(file_id = %file.id, "Transport did not stop after cancellation");
                    }
                    return Err(PipelineError::Cancelled);
                }
            }
        }
    }

    async fn extract_mail(
        &mut self,
        file: &TrackedFile,
        receipt: &UploadReceipt,
        token: &CancellationToken,
    ) -> Result<ParseStats, PipelineError> {
        let reader = open_source(&file.source)
            .await
            .map_err(|e| PipelineError::Parse(e.to_string()))?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut parser = MboxStreamParser::new(
            ReaderSource::new(reader, self.mail.read_chunk_bytes),
            self.mail.extractor.clone(),
            self.mail.max_message_bytes,
        )
        .with_total_len(file.size)
        .with_progress(tx);

        let transport = Arc::clone(&self.transport);
        let batch_size = self.mail.submit_batch_size;
        let work = async move {
            let mut batch: Vec<MailMessage> = Vec::with_capacity(batch_size);
            while let Some(message) = parser.next_message().await? {
                batch.push(message);
                if batch.len() >= batch_size {
                    transport.submit_messages(receipt, &batch).await?;
                    batch.clear();
                }
            }
            if !batch.is_empty() {
                transport.submit_messages(receipt, &batch).await?;
            }
            Ok::<_, PipelineError>(parser.stats())
        };
        tokio::pin!(work);

        loop {
            tokio::select! {
                result = &mut work => return result,
                Some(fraction) = rx.recv() => {
                    self.report_progress(file.id, ProgressPhase::Parsing, fraction);
                }
                _ = token.cancelled() => return Err(PipelineError::Cancelled),
            }
        }
    }

    fn file_mut(&mut self, id: FileId) -> Option<&mut TrackedFile> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn transition(&mut self, id: FileId, to: UploadState) -> Result<(), PipelineError> {
        let file = self
            .file_mut(id)
            .ok_or_else(|| PipelineError::Internal(format!("file {} disappeared", id)))?;
        let from = file.state;
        if !from.can_transition_to(to) {
            return Err(PipelineError::InvalidTransition { from, to });
        }
        file.state = to;
        self.emit(UploadEvent::StateChanged { id, from, to });
        Ok(())
    }

    fn report_progress(&mut self, id: FileId, phase: ProgressPhase, fraction: f64) {
        let Some(file) = self.file_mut(id) else {
            return;
        };
        let percent = overall_percent(file.is_mbox(), phase, fraction);
        let next = advance(file.progress, percent);
        if next == file.progress && file.phase == Some(phase) {
            return;
        }
        file.progress = next;
        file.phase = Some(phase);
        let indeterminate = file.is_indeterminate();
        self.emit(UploadEvent::Progress {
            id,
            percent: next,
            phase,
            indeterminate,
        });
    }

    fn complete(&mut self, id: FileId, mail_stats: Option<ParseStats>) -> Result<(), PipelineError> {
        // Mail archives leave the bar at the server-processing spinner.
        if let Some((progress, phase)) = self.get(id).map(|f| (f.progress, f.phase)) {
            if progress < 100 {
                if let Some(f) = self.file_mut(id) {
                    f.progress = 100;
                }
                self.emit(UploadEvent::Progress {
                    id,
                    percent: 100,
                    phase: phase.unwrap_or(ProgressPhase::Reading),
                    indeterminate: false,
                });
            }
        }

        self.transition(id, UploadState::Completed)?;
        let Some(file) = self.file_mut(id) else {
            return Ok(());
        };
        let event = UploadEvent::Completed {
            id,
            name: file.name.clone(),
            remote_id: file.remote_id.clone(),
            mail_stats,
        };
        tracing::info!(file_id = %id, file_name = %file.name, "Upload completed");
        self.emit(event);
        Ok(())
    }

    /// Record a failure on the file; returns the reason shown to the user.
    fn fail(&mut self, id: FileId, err: &PipelineError) -> String {
        let reason = err.client_message();
        match err.log_level() {
            LogLevel::Debug => tracing::debug!(file_id = %id, error = %err, "File failed"),
            LogLevel::Warn => tracing::warn!(file_id = %id, error = %err, "File failed"),
            LogLevel::Error => tracing::error!(file_id = %id, error = %err, "File failed"),
        }

        let Some(file) = self.file_mut(id) else {
            return reason;
        };
        let from = file.state;
        if !from.can_transition_to(UploadState::Failed) {
            return reason;
        }
        file.state = UploadState::Failed;
        file.error = Some(reason.clone());
        let name = file.name.clone();

        self.emit(UploadEvent::StateChanged {
            id,
            from,
            to: UploadState::Failed,
        });
        self.emit(UploadEvent::Failed {
            id,
            name,
            reason: reason.clone(),
        });
        reason
    }

    fn fail_cancelled_pending(&mut self) -> Vec<FailedFile> {
        let cancelled: Vec<(FileId, String)> = self
            .files
            .iter()
            .filter(|f| f.state == UploadState::Pending)
            .filter(|f| {
                self.tokens
                    .get(&f.id)
                    .map(|t| t.is_cancelled())
                    .unwrap_or(false)
            })
            .map(|f| (f.id, f.name.clone()))
            .collect();

        cancelled
            .into_iter()
            .map(|(id, name)| {
                let reason = self.fail(id, &PipelineError::Cancelled);
                FailedFile { id, name, reason }
            })
            .collect()
    }
}
