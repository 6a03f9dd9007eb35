use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use std::collections::HashSet;

use kbforge_core::models::MailMessage;

/// Classification of one raw archive message.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Sent(MailMessage),
    /// Sender is not one of the configured identities.
    Foreign,
    /// Sent by the owner but carries no text part.
    Empty,
    Malformed(&'static str),
}

/// Turns raw archive messages into [`MailMessage`] records, keeping only mail
/// sent from one of the owner's addresses.
#[derive(Debug, Clone)]
pub struct MessageExtractor {
    identities: HashSet<String>,
}

impl MessageExtractor {
    pub fn new<I, S>(self_addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            identities: self_addresses
                .into_iter()
                .map(|a| a.as_ref().trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn has_identities(&self) -> bool {
        !self.identities.is_empty()
    }

    pub fn is_self(&self, address: &str) -> bool {
        self.identities.contains(&address.trim().to_lowercase())
    }

    /// Classify one raw message. `raw` starts with its `From ` separator line.
    pub fn extract(&self, raw: &[u8], offset: u64) -> Extracted {
        let Some(nl) = memchr::memchr(b'\n', raw) else {
            return Extracted::Malformed("missing header section");
        };
        let mut content = &raw[nl + 1..];

        // The blank line that precedes the next separator belongs to the archive format.
        if content.ends_with(b"\r\n\r\n") {
            content = &content[..content.len() - 2];
        } else if content.ends_with(b"\n\n") {
            content = &content[..content.len() - 1];
        }

        match header_end(content) {
            None => return Extracted::Malformed("missing header/body separator"),
            Some(0) => return Extracted::Malformed("missing headers"),
            Some(_) => {}
        }

        let content = unescape_from_lines(content);
        let Some(message) = MessageParser::default().parse(content.as_ref()) else {
            return Extracted::Malformed("unparseable headers");
        };

        let Some(sender) = message
            .from()
            .and_then(|from| from.first())
            .and_then(|addr| addr.address())
            .map(|a| a.to_string())
        else {
            return Extracted::Malformed("missing From address");
        };

        if !self.is_self(&sender) {
            return Extracted::Foreign;
        }

        let body = match message.body_text(0) {
            Some(text) if !text.trim().is_empty() => text.trim_end().to_string(),
            _ => return Extracted::Empty,
        };

        let date = message
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0));

        Extracted::Sent(MailMessage {
            from_self: true,
            sender: sender.to_lowercase(),
            subject: message.subject().map(|s| s.to_string()),
            date,
            body,
            offset,
            length: raw.len() as u64,
        })
    }
}

/// Position of the blank line that ends the header block, if any.
fn header_end(content: &[u8]) -> Option<usize> {
    if content.starts_with(b"\n") || content.starts_with(b"\r\n") {
        return Some(0);
    }
    let lf = memchr::memmem::find(content, b"\n\n");
    let crlf = memchr::memmem::find(content, b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(a.min(b) + 1),
        (Some(a), None) => Some(a + 1),
        (None, Some(b)) => Some(b + 2),
        (None, None) => None,
    }
}

/// Undo mboxrd quoting: `>From ` becomes `From `, `>>From ` becomes `>From `.
fn unescape_from_lines(content: &[u8]) -> std::borrow::Cow<'_, [u8]> {
    if memchr::memmem::find(content, b">From ").is_none() {
        return std::borrow::Cow::Borrowed(content);
    }

    let mut out = Vec::with_capacity(content.len());
    for line in content.split_inclusive(|b| *b == b'\n') {
        let quotes = line.iter().take_while(|b| **b == b'>').count();
        if quotes > 0 && line[quotes..].starts_with(b"From ") {
            out.extend_from_slice(&line[1..]);
        } else {
            out.extend_from_slice(line);
        }
    }
    std::borrow::Cow::Owned(out)
}
