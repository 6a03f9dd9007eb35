//! Streaming extraction of sent mail from mbox archives.
//!
//! Bytes are pulled from a [`ChunkSource`], split into messages by
//! [`MboxDecoder`] and classified by [`MessageExtractor`]. Memory use is bounded
//! by the read chunk size plus the per-message ceiling, whatever the archive size.

mod decoder;
mod extract;
mod source;

pub use decoder::{DecoderState, Frame, MboxDecoder};
pub use extract::{Extracted, MessageExtractor};
pub use source::{ChunkSource, ReaderSource, SliceSource};

use futures::Stream;
use std::collections::VecDeque;
use tokio::sync::mpsc;

use kbforge_core::models::{MailMessage, ParseStats};
use kbforge_core::{IngestConfig, PipelineError};

/// Fatal parser errors. Problems with individual messages are counted in
/// [`ParseStats`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read archive: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        PipelineError::Parse(err.to_string())
    }
}

pub struct MboxStreamParser<S> {
    source: S,
    decoder: MboxDecoder,
    extractor: MessageExtractor,
    pending: VecDeque<Frame>,
    stats: ParseStats,
    total_len: Option<u64>,
    progress_tx: Option<mpsc::UnboundedSender<f64>>,
    eof: bool,
}

impl<S: ChunkSource> MboxStreamParser<S> {
    pub fn new(source: S, extractor: MessageExtractor, max_message_bytes: usize) -> Self {
        let total_len = source.total_len();
        Self {
            source,
            decoder: MboxDecoder::new(max_message_bytes),
            extractor,
            pending: VecDeque::new(),
            stats: ParseStats::default(),
            total_len,
            progress_tx: None,
            eof: false,
        }
    }

    pub fn from_config(source: S, config: &IngestConfig) -> Self {
        Self::new(
            source,
            MessageExtractor::new(&config.mbox_self_addresses),
            config.mbox_max_message_bytes,
        )
    }

    /// Override the length used to compute progress (e.g. the declared file size).
    pub fn with_total_len(mut self, total_len: u64) -> Self {
        self.total_len = Some(total_len);
        self
    }

    /// Push the progress fraction on this channel after every chunk read.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<f64>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Fraction of the archive consumed so far, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        if self.eof {
            return 1.0;
        }
        match self.total_len {
            Some(total) if total > 0 => {
                (self.stats.bytes_consumed as f64 / total as f64).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    /// Next sent message, or `None` once the archive is exhausted.
    pub async fn next_message(&mut self) -> Result<Option<MailMessage>, ParseError> {
        loop {
            while let Some(frame) = self.pending.pop_front() {
                if let Some(message) = self.classify(frame) {
                    return Ok(Some(message));
                }
            }

            if self.eof {
                return Ok(None);
            }

            let mut frames = Vec::new();
            match self.source.next_chunk().await? {
                Some(chunk) => {
                    self.stats.bytes_consumed += chunk.len() as u64;
                    self.decoder.feed(&chunk, &mut frames);
                }
                None => {
                    self.decoder.finish(&mut frames);
                    self.eof = true;
                    tracing::debug!(
                        bytes = self.stats.bytes_consumed,
                        preamble_bytes = self.decoder.preamble_bytes(),
                        "Reached end of mail archive"
                    );
                }
            }
            self.pending.extend(frames);

            if let Some(tx) = &self.progress_tx {
                let _ = tx.send(self.progress());
            }
        }
    }

    /// Single-pass stream of sent messages; ends after the first fatal error.
    pub fn into_stream(self) -> impl Stream<Item = Result<MailMessage, ParseError>> + Send
    where
        S: 'static,
    {
        futures::stream::unfold(Some(self), |state| async move {
            let mut parser = state?;
            match parser.next_message().await {
                Ok(Some(message)) => Some((Ok(message), Some(parser))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn classify(&mut self, frame: Frame) -> Option<MailMessage> {
        match frame {
            Frame::Oversized { offset, length } => {
                tracing::warn!(offset, length, "Skipping oversized message");
                self.stats.skipped_malformed += 1;
                None
            }
            Frame::Message { offset, raw } => match self.extractor.extract(&raw, offset) {
                Extracted::Sent(message) => {
                    self.stats.emitted += 1;
                    Some(message)
                }
                Extracted::Foreign => {
                    self.stats.skipped_foreign += 1;
                    None
                }
                Extracted::Empty => {
                    self.stats.skipped_empty += 1;
                    None
                }
                Extracted::Malformed(reason) => {
                    tracing::debug!(offset, reason, "Skipping malformed message");
                    self.stats.skipped_malformed += 1;
                    None
                }
            },
        }
    }
}
