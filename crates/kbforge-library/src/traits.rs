use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kbforge_core::models::{ContentKit, ContentType, Cursor, Verdict};

/// One page of kits as returned by the remote service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KitPage {
    #[serde(default)]
    pub kits: Vec<ContentKit>,
    /// Absent once the collection is exhausted.
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
    #[serde(default)]
    pub total_hint: Option<u64>,
}

/// Source of content kits, paginated by opaque cursor.
#[async_trait]
pub trait KitFetcher: Send + Sync {
    /// Fetch the page after `cursor` (the first page when `None`), optionally
    /// restricted to one content type.
    async fn fetch_kits(
        &self,
        cursor: Option<&Cursor>,
        content_type: Option<ContentType>,
        limit: u32,
    ) -> anyhow::Result<KitPage>;
}

/// Receiver of good/bad feedback on generated items.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn send_feedback(&self, content_id: &str, verdict: Verdict) -> anyhow::Result<()>;
}
