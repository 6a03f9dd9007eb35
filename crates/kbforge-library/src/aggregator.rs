use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use kbforge_core::models::{
    Cursor, GroupBy, LibraryFilter, LibraryPage, NormalizedContentItem, SortOrder, Verdict,
};
use kbforge_core::PipelineError;
use kbforge_processing::normalizer::{normalize_kit, NormalizeError};

use crate::traits::{FeedbackSink, KitFetcher};
use crate::view::{derive_groups, LibraryView};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationFetchError {
    #[error("failed to load content: {0}")]
    Fetch(String),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl From<AggregationFetchError> for PipelineError {
    fn from(err: AggregationFetchError) -> Self {
        match err {
            AggregationFetchError::Fetch(msg) => PipelineError::Fetch(msg),
            AggregationFetchError::Normalize(e) => e.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page arrived; `added` excludes duplicates of already loaded items.
    Loaded { added: usize },
    /// Another fetch of the same generation is still running.
    Suppressed,
    /// The server has no further pages.
    Exhausted,
    /// The collection was reset while this fetch ran; its page was dropped.
    Stale,
}

#[derive(Default)]
struct LibraryState {
    /// Bumped whenever server-side parameters change; older responses are dropped.
    generation: u64,
    in_flight: Option<u64>,
    next_sequence: u64,
    pages: BTreeMap<u64, LibraryPage>,
    seen: HashSet<String>,
    cursor: Option<Cursor>,
    exhausted: bool,
    total_hint: Option<u64>,
    filter: LibraryFilter,
    sort: SortOrder,
    group_by: GroupBy,
    selection: BTreeSet<String>,
    last_error: Option<String>,
}

impl LibraryState {
    fn reset(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.pages.clear();
        self.seen.clear();
        self.cursor = None;
        self.exhausted = false;
        self.total_hint = None;
    }

    fn items(&self) -> impl Iterator<Item = &NormalizedContentItem> {
        self.pages.values().flat_map(|p| p.items.iter())
    }

    fn is_visible(&self, id: &str) -> bool {
        self.items().any(|i| i.id == id && self.filter.matches(i))
    }
}

/// Aggregates server pages into one ordered, de-duplicated collection.
///
/// The content type filter is applied by the server: changing it restarts
/// pagination. Platform filter, sort order and grouping are applied locally
/// and never trigger a fetch.
pub struct ContentLibrary {
    fetcher: Arc<dyn KitFetcher>,
    feedback: Arc<dyn FeedbackSink>,
    page_size: u32,
    state: Mutex<LibraryState>,
}

impl ContentLibrary {
    pub fn new(fetcher: Arc<dyn KitFetcher>, feedback: Arc<dyn FeedbackSink>, page_size: u32) -> Self {
        Self {
            fetcher,
            feedback,
            page_size: page_size.max(1),
            state: Mutex::new(LibraryState::default()),
        }
    }

    /// Fetch the next page. At most one fetch per generation runs at a time;
    /// overlapping calls return [`LoadOutcome::Suppressed`] instead of queueing.
    pub async fn load_more(&self) -> Result<LoadOutcome, AggregationFetchError> {
        let (generation, sequence, cursor, content_type) = {
            let mut state = self.state.lock().await;
            if state.exhausted {
                return Ok(LoadOutcome::Exhausted);
            }
            if state.in_flight == Some(state.generation) {
                return Ok(LoadOutcome::Suppressed);
            }
            state.in_flight = Some(state.generation);
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            (
                state.generation,
                sequence,
                state.cursor.clone(),
                state.filter.content_type,
            )
        };

        tracing::debug!(generation, sequence, cursor = ?cursor, "Fetching library page");
        let result = self
            .fetcher
            .fetch_kits(cursor.as_ref(), content_type, self.page_size)
            .await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(generation, "Dropping page from a previous generation");
            return Ok(LoadOutcome::Stale);
        }
        state.in_flight = None;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::warn!(error = %message, "Library fetch failed");
                state.last_error = Some(message.clone());
                return Err(AggregationFetchError::Fetch(message));
            }
        };

        // A bad kit is reported only after the rest of its page lands and the cursor advances.
        let mut items = Vec::new();
        let mut first_error = None;
        for kit in &page.kits {
            match normalize_kit(kit) {
                Ok(normalized) => items.extend(normalized),
                Err(e) => {
                    tracing::error!(kit_id = %kit.id, error = %e, "Could not normalize kit");
                    first_error.get_or_insert(e);
                }
            }
        }

        let before = items.len();
        let seen = &mut state.seen;
        items.retain(|item| seen.insert(item.id.clone()));
        if items.len() < before {
            tracing::debug!(dropped = before - items.len(), "Dropped duplicate items");
        }
        let added = items.len();

        state.exhausted = page.next_cursor.is_none();
        state.cursor = page.next_cursor.clone();
        if page.total_hint.is_some() {
            state.total_hint = page.total_hint;
        }
        state.pages.insert(
            sequence,
            LibraryPage {
                sequence,
                items,
                next_cursor: page.next_cursor,
                total_hint: page.total_hint,
            },
        );

        if let Some(e) = first_error {
            state.last_error = Some(e.to_string());
            return Err(e.into());
        }
        Ok(LoadOutcome::Loaded { added })
    }

    /// Drop everything loaded and fetch the first page again.
    pub async fn refresh(&self) -> Result<LoadOutcome, AggregationFetchError> {
        self.state.lock().await.reset();
        self.load_more().await
    }

    /// Apply a filter. A changed content type restarts pagination from the first page.
    pub async fn set_filter(&self, filter: LibraryFilter) -> Result<(), AggregationFetchError> {
        let refetch = {
            let mut state = self.state.lock().await;
            let refetch = state.filter.content_type != filter.content_type;
            state.filter = filter;
            if refetch {
                state.reset();
            }
            refetch
        };

        if refetch {
            self.load_more().await?;
        }
        Ok(())
    }

    pub async fn set_sort(&self, sort: SortOrder) {
        self.state.lock().await.sort = sort;
    }

    pub async fn set_group_by(&self, group_by: GroupBy) {
        self.state.lock().await.group_by = group_by;
    }

    pub async fn filter(&self) -> LibraryFilter {
        self.state.lock().await.filter
    }

    pub async fn is_exhausted(&self) -> bool {
        self.state.lock().await.exhausted
    }

    /// Every loaded item in server order, ignoring filter, sort and grouping.
    pub async fn items(&self) -> Vec<NormalizedContentItem> {
        self.state.lock().await.items().cloned().collect()
    }

    pub async fn view(&self, now: DateTime<Utc>) -> LibraryView {
        let state = self.state.lock().await;
        let groups = derive_groups(state.items(), &state.filter, state.sort, state.group_by, now);
        let visible = groups.iter().map(|g| g.items.len()).sum();
        LibraryView {
            groups,
            loaded: state.items().count(),
            visible,
            total_hint: state.total_hint,
            exhausted: state.exhausted,
            loading: state.in_flight == Some(state.generation),
            error: state.last_error.clone(),
            selected: state.selection.iter().cloned().collect(),
        }
    }

    /// Toggle selection of a visible item; returns whether it is now selected.
    /// Ids that are not in the current view are ignored.
    pub async fn toggle_selection(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        if !state.is_visible(id) {
            return false;
        }
        if !state.selection.remove(id) {
            state.selection.insert(id.to_string());
            return true;
        }
        false
    }

    pub async fn clear_selection(&self) {
        self.state.lock().await.selection.clear();
    }

    pub async fn selected(&self) -> Vec<String> {
        self.state.lock().await.selection.iter().cloned().collect()
    }

    /// Drop an item from the loaded pages (and from the selection).
    pub async fn remove_item(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        state.selection.remove(id);
        let mut removed = false;
        for page in state.pages.values_mut() {
            let before = page.items.len();
            page.items.retain(|i| i.id != id);
            removed |= page.items.len() != before;
        }
        removed
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    pub async fn dismiss_error(&self) {
        self.state.lock().await.last_error = None;
    }

    /// Forward feedback; failures are logged and otherwise ignored.
    pub async fn send_feedback(&self, content_id: &str, verdict: Verdict) {
        if let Err(e) = self.feedback.send_feedback(content_id, verdict).await {
            tracing::warn!(content_id, verdict = ?verdict, error = %e, "Failed to send feedback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::KitPage;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use kbforge_core::models::{ContentKit, ContentType, Platform};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn kit(id: &str, kit_type: &str, items: &[(&str, &str, i64)]) -> ContentKit {
        ContentKit {
            id: id.to_string(),
            created_at: t0(),
            kit_type: kit_type.to_string(),
            items: items
                .iter()
                .map(|(item_id, platform, minutes)| {
                    json!({
                        "id": item_id,
                        "platform": platform,
                        "content": format!("text {}", item_id),
                        "title": format!("title {}", item_id),
                        "created_at": (t0() + Duration::minutes(*minutes)).to_rfc3339(),
                    })
                })
                .collect(),
        }
    }

    /// Serves pages keyed by cursor; the first page has cursor `None`.
    #[derive(Default)]
    struct MockFetcher {
        pages: HashMap<Option<String>, KitPage>,
        calls: AtomicUsize,
        requested_types: StdMutex<Vec<Option<ContentType>>>,
        fail: std::sync::atomic::AtomicBool,
        gate: Option<Arc<Notify>>,
    }

    impl MockFetcher {
        fn with_pages(pages: Vec<(Option<&str>, Vec<ContentKit>, Option<&str>)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(cursor, kits, next)| {
                        (
                            cursor.map(String::from),
                            KitPage {
                                kits,
                                next_cursor: next.map(|c| Cursor(c.to_string())),
                                total_hint: Some(6),
                            },
                        )
                    })
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl KitFetcher for MockFetcher {
        async fn fetch_kits(
            &self,
            cursor: Option<&Cursor>,
            content_type: Option<ContentType>,
            _limit: u32,
        ) -> anyhow::Result<KitPage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested_types.lock().unwrap().push(content_type);
            match (&self.gate, call) {
                (Some(gate), 0) => gate.notified().await,
                _ => tokio::task::yield_now().await,
            }
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("service unavailable");
            }
            self.pages
                .get(&cursor.map(|c| c.0.clone()))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown cursor"))
        }
    }

    #[derive(Default)]
    struct MockFeedback {
        fail: bool,
        sent: StdMutex<Vec<(String, Verdict)>>,
    }

    #[async_trait]
    impl FeedbackSink for MockFeedback {
        async fn send_feedback(&self, content_id: &str, verdict: Verdict) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("feedback endpoint down");
            }
            self.sent.lock().unwrap().push((content_id.to_string(), verdict));
            Ok(())
        }
    }

    fn two_page_fetcher() -> MockFetcher {
        MockFetcher::with_pages(vec![
            (
                None,
                vec![kit("k1", "written", &[("a", "linkedin", 5), ("b", "x", 1)])],
                Some("p2"),
            ),
            (
                Some("p2"),
                vec![
                    kit("k2", "written", &[("c", "other", 3), ("a", "linkedin", 5)]),
                    kit("k3", "videos", &[("d", "tiktok", 9)]),
                ],
                None,
            ),
        ])
    }

    fn library(fetcher: MockFetcher) -> (ContentLibrary, Arc<MockFetcher>) {
        let fetcher = Arc::new(fetcher);
        let lib = ContentLibrary::new(fetcher.clone(), Arc::new(MockFeedback::default()), 24);
        (lib, fetcher)
    }

    fn ids(items: &[NormalizedContentItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_pages_concatenate_in_server_order_without_duplicates() {
        let (lib, _) = library(two_page_fetcher());
        assert_eq!(lib.load_more().await.unwrap(), LoadOutcome::Loaded { added: 2 });
        assert_eq!(lib.load_more().await.unwrap(), LoadOutcome::Loaded { added: 2 });
        assert_eq!(lib.load_more().await.unwrap(), LoadOutcome::Exhausted);

        let paged = lib.items().await;
        assert_eq!(ids(&paged), vec!["a", "b", "c", "d"]);

        // Same collection served as a single page.
        let (single, _) = library(MockFetcher::with_pages(vec![(
            None,
            vec![
                kit("k1", "written", &[("a", "linkedin", 5), ("b", "x", 1)]),
                kit("k2", "written", &[("c", "other", 3)]),
                kit("k3", "videos", &[("d", "tiktok", 9)]),
            ],
            None,
        )]));
        single.load_more().await.unwrap();
        assert_eq!(single.items().await, paged);
    }

    #[tokio::test]
    async fn test_rapid_load_more_fetches_once() {
        let (lib, fetcher) = library(two_page_fetcher());
        let (first, second) = tokio::join!(lib.load_more(), lib.load_more());

        assert_eq!(first.unwrap(), LoadOutcome::Loaded { added: 2 });
        assert_eq!(second.unwrap(), LoadOutcome::Suppressed);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sort_changes_order_not_membership() {
        let (lib, fetcher) = library(two_page_fetcher());
        lib.load_more().await.unwrap();
        lib.load_more().await.unwrap();
        let now = t0() + Duration::hours(1);

        let newest: Vec<String> = lib.view(now).await.items().map(|i| i.id.clone()).collect();
        lib.set_sort(SortOrder::OldestFirst).await;
        let oldest: Vec<String> = lib.view(now).await.items().map(|i| i.id.clone()).collect();

        assert_eq!(newest, vec!["d", "a", "c", "b"]);
        assert_eq!(oldest, vec!["b", "c", "a", "d"]);
        let mut a = newest.clone();
        let mut b = oldest.clone();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2, "sorting must not fetch");
    }

    #[tokio::test]
    async fn test_platform_filter_is_local_and_content_type_is_remote() {
        let (lib, fetcher) = library(two_page_fetcher());
        lib.load_more().await.unwrap();

        lib.set_filter(LibraryFilter {
            platform: Some(Platform::X),
            content_type: None,
        })
        .await
        .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        let view = lib.view(t0()).await;
        assert_eq!(view.visible, 1);
        assert_eq!(view.loaded, 2);

        lib.set_filter(LibraryFilter {
            platform: Some(Platform::X),
            content_type: Some(ContentType::Written),
        })
        .await
        .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *fetcher.requested_types.lock().unwrap(),
            vec![None, Some(ContentType::Written)]
        );
        // Restarted from the first page.
        assert_eq!(ids(&lib.items().await), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_response_from_previous_generation_is_dropped() {
        let gate = Arc::new(Notify::new());
        let mut fetcher = two_page_fetcher();
        fetcher.gate = Some(gate.clone());
        let fetcher = Arc::new(fetcher);
        let lib = Arc::new(ContentLibrary::new(
            fetcher.clone(),
            Arc::new(MockFeedback::default()),
            24,
        ));

        let pending = tokio::spawn({
            let lib = lib.clone();
            async move { lib.load_more().await }
        });
        while fetcher.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        lib.set_filter(LibraryFilter {
            content_type: Some(ContentType::Written),
            platform: None,
        })
        .await
        .unwrap();
        gate.notify_one();

        assert_eq!(pending.await.unwrap().unwrap(), LoadOutcome::Stale);
        assert_eq!(ids(&lib.items().await), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_loaded_pages() {
        let (lib, fetcher) = library(two_page_fetcher());
        lib.load_more().await.unwrap();

        fetcher.fail.store(true, Ordering::SeqCst);
        let err = lib.load_more().await.unwrap_err();
        assert!(matches!(err, AggregationFetchError::Fetch(ref m) if m.contains("service unavailable")));
        assert_eq!(lib.items().await.len(), 2);
        assert!(lib.view(t0()).await.error.is_some());

        lib.dismiss_error().await;
        assert!(lib.last_error().await.is_none());

        // Retry resumes from the same cursor.
        fetcher.fail.store(false, Ordering::SeqCst);
        assert_eq!(lib.load_more().await.unwrap(), LoadOutcome::Loaded { added: 2 });
    }

    #[tokio::test]
    async fn test_unknown_kit_type_surfaces_as_error() {
        let (lib, _) = library(MockFetcher::with_pages(vec![(
            None,
            vec![kit("k9", "podcasts", &[("p", "x", 0)])],
            None,
        )]));
        let err = lib.load_more().await.unwrap_err();
        assert_eq!(
            err,
            AggregationFetchError::Normalize(NormalizeError::UnknownKitType("podcasts".to_string()))
        );
        assert!(lib.items().await.is_empty());
        assert!(lib.last_error().await.is_some());
    }

    #[tokio::test]
    async fn test_bad_kit_keeps_page_and_later_pages_reachable() {
        let (lib, _) = library(MockFetcher::with_pages(vec![
            (
                None,
                vec![
                    kit("k1", "written", &[("a", "linkedin", 5)]),
                    kit("k9", "podcasts", &[("p", "x", 0)]),
                    kit("k2", "videos", &[("b", "tiktok", 1)]),
                ],
                Some("p2"),
            ),
            (Some("p2"), vec![kit("k3", "written", &[("c", "x", 2)])], None),
        ]));

        assert!(matches!(
            lib.load_more().await,
            Err(AggregationFetchError::Normalize(_))
        ));
        assert_eq!(ids(&lib.items().await), vec!["a", "b"]);

        assert_eq!(lib.load_more().await.unwrap(), LoadOutcome::Loaded { added: 1 });
        assert_eq!(ids(&lib.items().await), vec!["a", "b", "c"]);
        assert!(lib.is_exhausted().await);
    }

    #[tokio::test]
    async fn test_selection_survives_view_changes_and_removal_drops_it() {
        let (lib, _) = library(two_page_fetcher());
        lib.load_more().await.unwrap();

        assert!(lib.toggle_selection("a").await);
        assert!(!lib.toggle_selection("zzz").await, "unknown ids are ignored");
        assert!(lib.toggle_selection("b").await);
        assert!(!lib.toggle_selection("b").await);

        lib.set_sort(SortOrder::OldestFirst).await;
        lib.set_group_by(GroupBy::Platform).await;
        lib.set_filter(LibraryFilter {
            platform: Some(Platform::X),
            content_type: None,
        })
        .await
        .unwrap();
        assert_eq!(lib.selected().await, vec!["a"]);
        assert!(!lib.toggle_selection("a").await, "hidden items cannot be toggled");
        assert_eq!(lib.selected().await, vec!["a"]);

        lib.set_filter(LibraryFilter::default()).await.unwrap();
        assert!(lib.remove_item("a").await);
        assert!(lib.selected().await.is_empty());
        assert_eq!(ids(&lib.items().await), vec!["b"]);
    }

    #[tokio::test]
    async fn test_feedback_failures_are_swallowed() {
        let feedback = Arc::new(MockFeedback {
            fail: true,
            ..Default::default()
        });
        let lib = ContentLibrary::new(Arc::new(two_page_fetcher()), feedback, 24);
        lib.send_feedback("a", Verdict::Bad).await;

        let ok = Arc::new(MockFeedback::default());
        let lib = ContentLibrary::new(Arc::new(two_page_fetcher()), ok.clone(), 24);
        lib.send_feedback("a", Verdict::Good).await;
        assert_eq!(*ok.sent.lock().unwrap(), vec![("a".to_string(), Verdict::Good)]);
    }
}
