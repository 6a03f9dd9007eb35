//! Shared fixtures for kbforge-processing integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use kbforge_core::models::{MailMessage, TrackedFile};
use kbforge_processing::upload::{
    ProgressSender, TransferError, TransferProgress, UploadDestination, UploadReceipt,
    UploadTransport,
};

pub const OWNER: &str = "owner@example.com";

/// One archive message in mboxrd form.
pub fn mbox_message(from: &str, subject: &str, body: &str) -> String {
    format!(
        "From {from} Thu Mar  5 09:15:00 2026\n\
From: Someone <{from}>\n\
To: team@example.com\n\
Subject: {subject}\n\
Date: Thu, 5 Mar 2026 09:15:00 +0000\n\
\n\
{body}\n\
\n"
    )
}

/// A sent message carrying a base64 attachment.
pub fn mbox_message_with_attachment(subject: &str) -> String {
    format!(
        "From {OWNER} Thu Mar  5 10:00:00 2026\n\
From: {OWNER}\n\
Subject: {subject}\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=\"b1\"\n\
\n\
--b1\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
Numbers for {subject} attached.\n\
--b1\n\
Content-Type: application/pdf\n\
Content-Disposition: attachment; filename=\"numbers.pdf\"\n\
Content-Transfer-Encoding: base64\n\
\n\
QVRUQUNITUVOVF9QQVlMT0FE\n\
--b1--\n\
\n"
    )
}

/// Archive with `sent` messages from the owner interleaved with `received` ones.
pub fn mixed_archive(sent: usize, received: usize) -> String {
    let mut out = String::new();
    let total = sent + received;
    let (mut s, mut r) = (0, 0);
    for i in 0..total {
        if (i % 3 == 2 && r < received) || s == sent {
            out.push_str(&mbox_message(
                "colleague@example.com",
                &format!("received {r}"),
                "Hi,\n>From the desk of a colleague: please review.",
            ));
            r += 1;
        } else {
            out.push_str(&mbox_message(
                OWNER,
                &format!("sent {s}"),
                &format!("Draft number {s}.\n>From here on, quoted text."),
            ));
            s += 1;
        }
    }
    out
}

/// Transport that records every call and fails the files named in `fail`.
#[derive(Default)]
pub struct RecordingTransport {
    pub fail: HashSet<String>,
    pub uploads: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<MailMessage>>,
    pub finished: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn failing(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl UploadTransport for RecordingTransport {
    async fn upload(
        &self,
        _destination: &UploadDestination,
        file: &TrackedFile,
        progress: ProgressSender,
        _cancel: CancellationToken,
    ) -> Result<UploadReceipt, TransferError> {
        self.uploads.lock().unwrap().push(file.name.clone());
        let _ = progress.send(TransferProgress {
            bytes_sent: file.size,
            total_bytes: file.size,
        });
        if self.fail.contains(&file.name) {
            return Err(TransferError::Network("connection reset".to_string()));
        }
        Ok(UploadReceipt {
            remote_id: format!("src-{}", file.name),
        })
    }

    async fn submit_messages(
        &self,
        _receipt: &UploadReceipt,
        batch: &[MailMessage],
    ) -> Result<(), TransferError> {
        self.messages.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }

    async fn finish_processing(&self, receipt: &UploadReceipt) -> Result<(), TransferError> {
        self.finished.lock().unwrap().push(receipt.remote_id.clone());
        Ok(())
    }
}
