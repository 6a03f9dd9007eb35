use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Type tag of a generation batch as sent by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitType {
    Videos,
    Written,
    Carousels,
}

impl KitType {
    pub fn content_type(&self) -> ContentType {
        match self {
            KitType::Videos => ContentType::Video,
            KitType::Written => ContentType::Written,
            KitType::Carousels => ContentType::Carousel,
        }
    }
}

impl Display for KitType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            KitType::Videos => write!(f, "videos"),
            KitType::Written => write!(f, "written"),
            KitType::Carousels => write!(f, "carousels"),
        }
    }
}

impl FromStr for KitType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "videos" => Ok(KitType::Videos),
            "written" => Ok(KitType::Written),
            "carousels" => Ok(KitType::Carousels),
            _ => Err(anyhow::anyhow!("Invalid kit type: {}", s)),
        }
    }
}

/// Content type tag of a normalized item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Written,
    Carousel,
}

impl ContentType {
    pub fn kit_type(&self) -> KitType {
        match self {
            ContentType::Video => KitType::Videos,
            ContentType::Written => KitType::Written,
            ContentType::Carousel => KitType::Carousels,
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ContentType::Video => write!(f, "video"),
            ContentType::Written => write!(f, "written"),
            ContentType::Carousel => write!(f, "carousel"),
        }
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "video" | "videos" => Ok(ContentType::Video),
            "written" => Ok(ContentType::Written),
            "carousel" | "carousels" => Ok(ContentType::Carousel),
            _ => Err(anyhow::anyhow!("Invalid content type: {}", s)),
        }
    }
}

/// Social platform an item was generated for.
///
/// Declaration order is the display order of platform groups; `Other` is last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LinkedIn,
    X,
    Instagram,
    Facebook,
    TikTok,
    YouTube,
    Threads,
    Blog,
    Newsletter,
    Other,
}

impl Platform {
    /// Lenient mapping used for server payloads; unknown names become `Other`.
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or(Platform::Other)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "LinkedIn",
            Platform::X => "X",
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
            Platform::TikTok => "TikTok",
            Platform::YouTube => "YouTube",
            Platform::Threads => "Threads",
            Platform::Blog => "Blog",
            Platform::Newsletter => "Newsletter",
            Platform::Other => "Other",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let tag = match self {
            Platform::LinkedIn => "linkedin",
            Platform::X => "x",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::TikTok => "tiktok",
            Platform::YouTube => "youtube",
            Platform::Threads => "threads",
            Platform::Blog => "blog",
            Platform::Newsletter => "newsletter",
            Platform::Other => "other",
        };
        write!(f, "{}", tag)
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linkedin" => Ok(Platform::LinkedIn),
            "x" | "twitter" => Ok(Platform::X),
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            "tiktok" => Ok(Platform::TikTok),
            "youtube" => Ok(Platform::YouTube),
            "threads" => Ok(Platform::Threads),
            "blog" => Ok(Platform::Blog),
            "newsletter" | "email" => Ok(Platform::Newsletter),
            "other" => Ok(Platform::Other),
            _ => Err(anyhow::anyhow!("Invalid platform: {}", s)),
        }
    }
}

/// One generation batch as returned by the remote service.
///
/// The type tag is kept as the raw string so that an unknown tag reaches the
/// normalizer and is rejected there instead of failing deserialization of the
/// whole page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentKit {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kit_type: String,
    #[serde(default)]
    pub items: Vec<JsonValue>,
}

/// Display projection shared by every kind of generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedContentItem {
    pub id: String,
    pub kit_id: String,
    pub platform: Platform,
    pub content_type: ContentType,
    pub text: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Good,
    Bad,
}

impl FromStr for Verdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "good" | "up" => Ok(Verdict::Good),
            "bad" | "down" => Ok(Verdict::Bad),
            _ => Err(anyhow::anyhow!("Invalid verdict: {} (expected good or bad)", s)),
        }
    }
}
