//! Flattening of generated content kits into display items.
//!
//! Each kit type stores its text and media under different keys; the mapping
//! below is the only place that knows about those shapes.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use kbforge_core::models::{ContentKit, KitType, NormalizedContentItem, Platform};
use kbforge_core::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("unknown kit type: {0}")]
    UnknownKitType(String),

    #[error("item in kit {kit_id} is missing required field '{field}'")]
    MissingField { kit_id: String, field: &'static str },

    #[error("item in kit {kit_id} is not a JSON object")]
    NotAnObject { kit_id: String },
}

impl From<NormalizeError> for PipelineError {
    fn from(err: NormalizeError) -> Self {
        PipelineError::Normalization(err.to_string())
    }
}

const VIDEO_TEXT_KEYS: &[&str] = &["title", "caption", "description"];
const VIDEO_MEDIA_KEYS: &[&str] = &["video_url", "thumbnail_url"];
const WRITTEN_TEXT_KEYS: &[&str] = &["content", "body", "text"];
const WRITTEN_MEDIA_KEYS: &[&str] = &["image_url"];

/// Normalize every item of a kit, failing on the first item that cannot be mapped.
pub fn normalize_kit(kit: &ContentKit) -> Result<Vec<NormalizedContentItem>, NormalizeError> {
    let kit_type = kit_type(kit)?;
    kit.items
        .iter()
        .map(|raw| normalize_typed(raw, kit, kit_type))
        .collect()
}

pub fn normalize_item(
    raw: &JsonValue,
    kit: &ContentKit,
) -> Result<NormalizedContentItem, NormalizeError> {
    normalize_typed(raw, kit, kit_type(kit)?)
}

fn kit_type(kit: &ContentKit) -> Result<KitType, NormalizeError> {
    kit.kit_type
        .parse()
        .map_err(|_| NormalizeError::UnknownKitType(kit.kit_type.clone()))
}

fn normalize_typed(
    raw: &JsonValue,
    kit: &ContentKit,
    kit_type: KitType,
) -> Result<NormalizedContentItem, NormalizeError> {
    let obj = raw.as_object().ok_or_else(|| NormalizeError::NotAnObject {
        kit_id: kit.id.clone(),
    })?;

    let id = match obj.get("id") {
        Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => {
            return Err(NormalizeError::MissingField {
                kit_id: kit.id.clone(),
                field: "id",
            })
        }
    };

    let (text, media_url) = match kit_type {
        KitType::Videos => (
            first_str(obj, VIDEO_TEXT_KEYS),
            first_str(obj, VIDEO_MEDIA_KEYS),
        ),
        KitType::Written => (
            first_str(obj, WRITTEN_TEXT_KEYS),
            first_str(obj, WRITTEN_MEDIA_KEYS),
        ),
        KitType::Carousels => {
            let first_slide = obj
                .get("slides")
                .and_then(|s| s.as_array())
                .and_then(|slides| slides.first())
                .and_then(|slide| slide.as_object());
            let text = first_str(obj, &["caption"])
                .or_else(|| first_slide.and_then(|s| first_str(s, &["text"])));
            let media = first_slide.and_then(|s| first_str(s, &["image_url"]));
            (text, media)
        }
    };

    let platform = obj
        .get("platform")
        .and_then(|p| p.as_str())
        .map(Platform::from_tag)
        .unwrap_or(Platform::Other);

    let created_at = obj
        .get("created_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(kit.created_at);

    Ok(NormalizedContentItem {
        id,
        kit_id: kit.id.clone(),
        platform,
        content_type: kit_type.content_type(),
        text: text.unwrap_or_default(),
        media_url,
        created_at,
    })
}

/// First non-empty string value among `keys`.
fn first_str(obj: &Map<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kbforge_core::models::ContentType;
    use serde_json::json;

    fn kit(kit_type: &str, items: Vec<JsonValue>) -> ContentKit {
        ContentKit {
            id: "kit-1".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap(),
            kit_type: kit_type.to_string(),
            items,
        }
    }

    #[test]
    fn test_video_prefers_title_then_caption() {
        let kit = kit(
            "videos",
            vec![
                json!({"id": "v1", "title": "Launch", "caption": "ignored", "video_url": "https://cdn/v1.mp4", "platform": "tiktok"}),
                json!({"id": "v2", "title": "", "caption": "From caption", "thumbnail_url": "https://cdn/v2.jpg"}),
            ],
        );
        let items = normalize_kit(&kit).unwrap();
        assert_eq!(items[0].text, "Launch");
        assert_eq!(items[0].media_url.as_deref(), Some("https://cdn/v1.mp4"));
        assert_eq!(items[0].platform, Platform::TikTok);
        assert_eq!(items[0].content_type, ContentType::Video);
        assert_eq!(items[1].text, "From caption");
        assert_eq!(items[1].media_url.as_deref(), Some("https://cdn/v2.jpg"));
        assert_eq!(items[1].platform, Platform::Other);
    }

    #[test]
    fn test_written_has_no_media_without_image() {
        let kit = kit(
            "written",
            vec![json!({"id": 7, "body": "A post", "platform": "linkedin"})],
        );
        let item = normalize_item(&kit.items[0], &kit).unwrap();
        assert_eq!(item.id, "7");
        assert_eq!(item.text, "A post");
        assert_eq!(item.media_url, None);
        assert_eq!(item.kit_id, "kit-1");
    }

    #[test]
    fn test_carousel_falls_back_to_first_slide() {
        let kit = kit(
            "carousels",
            vec![json!({
                "id": "c1",
                "slides": [
                    {"text": "Slide one", "image_url": "https://cdn/s1.png"},
                    {"text": "Slide two", "image_url": "https://cdn/s2.png"}
                ]
            })],
        );
        let item = normalize_item(&kit.items[0], &kit).unwrap();
        assert_eq!(item.text, "Slide one");
        assert_eq!(item.media_url.as_deref(), Some("https://cdn/s1.png"));
        assert_eq!(item.content_type, ContentType::Carousel);
    }

    #[test]
    fn test_created_at_defaults_to_kit() {
        let kit = kit(
            "written",
            vec![
                json!({"id": "a", "content": "x"}),
                json!({"id": "b", "content": "y", "created_at": "2026-05-03T10:00:00+02:00"}),
            ],
        );
        let items = normalize_kit(&kit).unwrap();
        assert_eq!(items[0].created_at, kit.created_at);
        assert_eq!(
            items[1].created_at,
            Utc.with_ymd_and_hms(2026, 5, 3, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_kit_type_is_loud() {
        let kit = kit("podcasts", vec![json!({"id": "p1"})]);
        assert_eq!(
            normalize_kit(&kit),
            Err(NormalizeError::UnknownKitType("podcasts".to_string()))
        );
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let kit = kit("videos", vec![json!({"title": "no id"})]);
        assert_eq!(
            normalize_kit(&kit),
            Err(NormalizeError::MissingField {
                kit_id: "kit-1".to_string(),
                field: "id"
            })
        );
    }

    #[test]
    fn test_empty_kit_yields_no_items() {
        assert!(normalize_kit(&kit("videos", vec![])).unwrap().is_empty());
    }
}
