use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::content::{ContentType, NormalizedContentItem, Platform};

/// Opaque continuation token issued by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// One fetched batch of normalized items.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryPage {
    /// Position of the request that produced this page; pages are concatenated
    /// in this order regardless of when they arrive.
    pub sequence: u64,
    pub items: Vec<NormalizedContentItem>,
    /// `None` once the collection is exhausted.
    pub next_cursor: Option<Cursor>,
    pub total_hint: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "desc" | "newest" | "newest_first" => Ok(SortOrder::NewestFirst),
            "asc" | "oldest" | "oldest_first" => Ok(SortOrder::OldestFirst),
            _ => Err(anyhow::anyhow!("Invalid sort order: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    None,
    Platform,
    DateBucket,
}

impl FromStr for GroupBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(GroupBy::None),
            "platform" => Ok(GroupBy::Platform),
            "date" | "date_bucket" => Ok(GroupBy::DateBucket),
            _ => Err(anyhow::anyhow!("Invalid group-by key: {}", s)),
        }
    }
}

/// Active library filter.
///
/// `content_type` is applied by the server; `platform` is applied locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFilter {
    pub content_type: Option<ContentType>,
    pub platform: Option<Platform>,
}

impl LibraryFilter {
    pub fn matches(&self, item: &NormalizedContentItem) -> bool {
        self.content_type.map_or(true, |t| item.content_type == t)
            && self.platform.map_or(true, |p| item.platform == p)
    }
}

/// Relative-age bucket used for date grouping, most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateBucket {
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
    Older,
}

impl DateBucket {
    /// Buckets are based on calendar days in UTC relative to `now`.
    /// Timestamps in the future count as today.
    pub fn for_timestamp(ts: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let day = ts.date_naive();
        if day >= today {
            return DateBucket::Today;
        }
        let age = today.signed_duration_since(day);
        if age <= Duration::days(1) {
            DateBucket::Yesterday
        } else if age < Duration::days(7) {
            DateBucket::ThisWeek
        } else if age < Duration::days(30) {
            DateBucket::ThisMonth
        } else {
            DateBucket::Older
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DateBucket::Today => "Today",
            DateBucket::Yesterday => "Yesterday",
            DateBucket::ThisWeek => "This week",
            DateBucket::ThisMonth => "This month",
            DateBucket::Older => "Older",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_buckets() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap();
        let at = |d: u32| Utc.with_ymd_and_hms(2026, 3, d, 8, 0, 0).unwrap();
        assert_eq!(DateBucket::for_timestamp(at(15), now), DateBucket::Today);
        assert_eq!(DateBucket::for_timestamp(at(14), now), DateBucket::Yesterday);
        assert_eq!(DateBucket::for_timestamp(at(10), now), DateBucket::ThisWeek);
        assert_eq!(DateBucket::for_timestamp(at(1), now), DateBucket::ThisMonth);
        let old = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(DateBucket::for_timestamp(old, now), DateBucket::Older);
    }

    #[test]
    fn test_bucket_precedence_is_most_recent_first() {
        assert!(DateBucket::Today < DateBucket::Yesterday);
        assert!(DateBucket::ThisMonth < DateBucket::Older);
    }

    #[test]
    fn test_parse_sort_and_group() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::OldestFirst);
        assert_eq!("date".parse::<GroupBy>().unwrap(), GroupBy::DateBucket);
        assert!("size".parse::<GroupBy>().is_err());
    }
}
