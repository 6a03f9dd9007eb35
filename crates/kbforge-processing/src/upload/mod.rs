//! Upload orchestration: validate -> transfer -> (mail archives) parse and submit.

mod orchestrator;
mod progress;
mod traits;

pub use orchestrator::{
    BatchSummary, CancelHandle, FailedFile, RemoveError, UploadEvent, UploadOrchestrator,
};
pub use progress::{advance, overall_percent};
pub use traits::{
    open_source, ProgressSender, TransferError, TransferProgress, UploadDestination,
    UploadReceipt, UploadTransport,
};
