use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sent message extracted from a mail archive.
///
/// Only the plain-text body is kept; attachments and other non-text parts are
/// never decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Always `true` for emitted records: received mail is dropped by the parser.
    pub from_self: bool,
    pub sender: String,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub body: String,
    /// Byte offset of the `From ` separator line inside the archive.
    pub offset: u64,
    /// Total byte length of the message, separator line included.
    pub length: u64,
}

/// Counters collected while streaming a mail archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub emitted: u64,
    /// Messages whose sender is not the account owner.
    pub skipped_foreign: u64,
    /// Unterminated, undecodable or oversized messages.
    pub skipped_malformed: u64,
    /// Sent messages without any text part.
    pub skipped_empty: u64,
    pub bytes_consumed: u64,
}

impl ParseStats {
    pub fn total_seen(&self) -> u64 {
        self.emitted + self.skipped_foreign + self.skipped_malformed + self.skipped_empty
    }
}
