//! Ingestion pipeline for kbforge.
//!
//! - [`validator`]: accept or reject candidate files before any transfer.
//! - [`upload`]: drive a batch of files through transfer and mail extraction.
//! - [`mbox`]: stream sent messages out of a mail archive with bounded memory.
//! - [`normalizer`]: flatten generated content kits into display items.

pub mod mbox;
pub mod normalizer;
pub mod upload;
pub mod validator;

pub use mbox::{MboxStreamParser, ParseError};
pub use normalizer::{normalize_item, normalize_kit, NormalizeError};
pub use upload::{
    BatchSummary, CancelHandle, RemoveError, TransferError, UploadDestination, UploadEvent,
    UploadOrchestrator, UploadReceipt, UploadTransport,
};
pub use validator::{FileValidator, ValidationError, Validity};
