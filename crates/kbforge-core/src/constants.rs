//! Shared limits and well-known values.

/// One mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Size ceiling for every non-MBOX upload.
pub const MAX_UPLOAD_SIZE_MB: u64 = 500;

/// Declared MIME type for mail archives.
pub const MBOX_CONTENT_TYPE: &str = "application/mbox";

/// Extension (without the dot) that marks a mail archive.
pub const MBOX_EXTENSION: &str = "mbox";

/// MIME types accepted for non-MBOX uploads.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "video/mp4",
    "video/quicktime",
    "text/plain",
    "image/jpeg",
    "image/png",
    "audio/wav",
    "audio/wave",
    "audio/x-wav",
    "audio/mpeg",
    "audio/mp3",
];

pub const UPLOAD_CHUNK_SIZE_MB: u64 = 8;

/// MBOX archives are read in chunks of this size so peak memory does not
/// depend on archive size.
pub const MBOX_READ_CHUNK_MB: u64 = 32;

/// Messages larger than this are dropped while streaming.
pub const MBOX_MAX_MESSAGE_MB: u64 = 64;

pub const MBOX_SUBMIT_BATCH_SIZE: usize = 250;

pub const LIBRARY_PAGE_SIZE: u32 = 24;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";

pub const DEFAULT_API_VERSION: &str = "v1";
