//! Pure derivation of the displayed library from loaded items.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use kbforge_core::models::{
    DateBucket, GroupBy, LibraryFilter, NormalizedContentItem, Platform, SortOrder,
};

/// Bucket an item is shown under. Ordering is the display order of buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum GroupKey {
    All,
    Platform(Platform),
    Date(DateBucket),
}

impl GroupKey {
    pub fn label(&self) -> &'static str {
        match self {
            GroupKey::All => "All",
            GroupKey::Platform(p) => p.label(),
            GroupKey::Date(b) => b.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewGroup {
    pub key: GroupKey,
    pub label: String,
    pub items: Vec<NormalizedContentItem>,
}

/// Snapshot of what the library shows right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryView {
    pub groups: Vec<ViewGroup>,
    /// Items loaded so far, before the local filter.
    pub loaded: usize,
    pub visible: usize,
    pub total_hint: Option<u64>,
    pub exhausted: bool,
    pub loading: bool,
    /// Banner text of the last failed fetch, until dismissed.
    pub error: Option<String>,
    pub selected: Vec<String>,
}

impl LibraryView {
    /// Visible items in display order, across groups.
    pub fn items(&self) -> impl Iterator<Item = &NormalizedContentItem> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }
}

/// Filter, sort and group `items` (given in server order).
///
/// Sorting is stable, so items with equal timestamps keep server order.
pub fn derive_groups<'a>(
    items: impl IntoIterator<Item = &'a NormalizedContentItem>,
    filter: &LibraryFilter,
    sort: SortOrder,
    group_by: GroupBy,
    now: DateTime<Utc>,
) -> Vec<ViewGroup> {
    let mut visible: Vec<&NormalizedContentItem> =
        items.into_iter().filter(|item| filter.matches(item)).collect();

    match sort {
        SortOrder::NewestFirst => visible.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::OldestFirst => visible.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
    }

    let mut buckets: BTreeMap<GroupKey, Vec<NormalizedContentItem>> = BTreeMap::new();
    for item in visible {
        let key = match group_by {
            GroupBy::None => GroupKey::All,
            GroupBy::Platform => GroupKey::Platform(item.platform),
            GroupBy::DateBucket => GroupKey::Date(DateBucket::for_timestamp(item.created_at, now)),
        };
        buckets.entry(key).or_default().push(item.clone());
    }

    buckets
        .into_iter()
        .map(|(key, items)| ViewGroup {
            key,
            label: key.label().to_string(),
            items,
        })
        .collect()
}
