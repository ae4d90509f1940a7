use crate::types::MediaKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One generation record as returned by the feed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedItem {
    pub id: String,
    pub prompt: Option<String>,
    pub generation_type: Option<String>,
    #[serde(deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub is_public: Option<bool>,
    pub is_deleted: Option<bool>,
    pub aspect_ratio: Option<String>,
    #[serde(rename = "aspect_ratio", skip_serializing)]
    pub aspect_ratio_snake: Option<String>,
    #[serde(skip_serializing)]
    pub frame_size: Option<String>,
    #[serde(skip_serializing)]
    pub width: Option<f64>,
    #[serde(skip_serializing)]
    pub height: Option<f64>,
    pub aesthetic_score: Option<f64>,
    pub score: Option<f64>,
    pub created_by: Option<Creator>,
    #[serde(deserialize_with = "media_list")]
    pub images: Vec<MediaEntry>,
    #[serde(deserialize_with = "media_list")]
    pub videos: Vec<MediaEntry>,
    #[serde(deserialize_with = "media_list")]
    pub audios: Vec<MediaEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Creator {
    pub uid: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Creator {
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or("User")
    }
}

/// A media asset attached to an item. Legacy records store a bare URL string.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub id: Option<String>,
    pub url: Option<String>,
    pub storage_path: Option<String>,
    pub thumbnail_url: Option<String>,
    pub webp_url: Option<String>,
    pub avif_url: Option<String>,
    pub aesthetic_score: Option<f64>,
}

impl<'de> Deserialize<'de> for MediaEntry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase", default)]
        struct Object {
            id: Option<String>,
            url: Option<String>,
            #[serde(alias = "originalUrl")]
            original_url: Option<String>,
            storage_path: Option<String>,
            thumbnail_url: Option<String>,
            webp_url: Option<String>,
            avif_url: Option<String>,
            aesthetic_score: Option<f64>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Legacy(String),
            Object(Object),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Legacy(url) => MediaEntry {
                url: Some(url),
                ..Default::default()
            },
            Raw::Object(o) => MediaEntry {
                id: o.id,
                url: o.url.or(o.original_url),
                storage_path: o.storage_path,
                thumbnail_url: o.thumbnail_url,
                webp_url: o.webp_url,
                avif_url: o.avif_url,
                aesthetic_score: o.aesthetic_score,
            },
        })
    }
}

impl FeedItem {
    pub fn media(&self, kind: MediaKind) -> &[MediaEntry] {
        match kind {
            MediaKind::Image => &self.images,
            MediaKind::Video => &self.videos,
            MediaKind::Audio => &self.audios,
        }
    }
    pub fn is_visible(&self) -> bool {
        self.is_deleted != Some(true) && self.is_public != Some(false)
    }
    pub fn display_score(&self) -> Option<f64> {
        self.aesthetic_score.or(self.score).or_else(|| {
            [&self.images, &self.videos, &self.audios]
                .into_iter()
                .flatten()
                .filter_map(|m| m.aesthetic_score)
                .reduce(f64::max)
        })
    }
    /// Fill derived fields after decoding: the unified aspect ratio and the
    /// update timestamp fallback.
    pub fn normalize(&mut self) {
        if self.aspect_ratio.as_deref().map_or(true, str::is_empty) {
            self.aspect_ratio = self
                .aspect_ratio_snake
                .take()
                .or_else(|| self.frame_size.take())
                .filter(|s| !s.is_empty())
                .or_else(|| match (self.width, self.height) {
                    (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some(format!("{w}:{h}")),
                    _ => None,
                });
        }
        if self.updated_at.is_none() {
            self.updated_at = self.created_at;
        }
    }
    /// Width over height, parsed from the unified aspect ratio (`16:9`, `16/9`, `1.78`).
    pub fn aspect_ratio_value(&self) -> Option<f64> {
        let s = self.aspect_ratio.as_deref()?.trim();
        let ratio = match s.split_once([':', '/', 'x']) {
            Some((w, h)) => w.trim().parse::<f64>().ok()? / h.trim().parse::<f64>().ok()?,
            None => s.parse::<f64>().ok()?,
        };
        (ratio.is_finite() && ratio > 0.0).then_some(ratio)
    }
}

/// A media collection that may be `null`.
fn media_list<'de, D>(deserializer: D) -> Result<Vec<MediaEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<MediaEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
        Firestore {
            #[serde(rename = "_seconds", alias = "seconds")]
            seconds: i64,
            #[serde(rename = "_nanoseconds", alias = "nanoseconds", default)]
            nanoseconds: u32,
        },
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Millis(ms)) => DateTime::from_timestamp_millis(ms),
        Some(Raw::Text(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)),
        Some(Raw::Firestore {
            seconds,
            nanoseconds,
        }) => DateTime::from_timestamp(seconds, nanoseconds),
        None => None,
    })
}

/// One page of the feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub next_cursor: Option<String>,
    pub has_more: Option<bool>,
}

impl<'de> Deserialize<'de> for FeedPage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase", default)]
        struct Meta {
            next_cursor: Option<String>,
            has_more: Option<bool>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            #[serde(default)]
            items: Option<Vec<serde_json::Value>>,
            #[serde(default)]
            meta: Option<Meta>,
            #[serde(default)]
            next_cursor: Option<String>,
            #[serde(default)]
            has_more: Option<bool>,
        }

        let raw = Raw::deserialize(deserializer)?;
        // A malformed record is dropped on its own instead of failing the page.
        let items = raw
            .items
            .unwrap_or_default()
            .into_iter()
            .filter_map(|value| match FeedItem::deserialize(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    log::warn!("skipping malformed feed item: {e}");
                    None
                }
            })
            .collect();
        let meta = raw.meta.unwrap_or_default();
        Ok(FeedPage {
            items,
            next_cursor: meta
                .next_cursor
                .or(raw.next_cursor)
                .filter(|c| !c.is_empty()),
            has_more: meta.has_more.or(raw.has_more),
        })
    }
}

/// Authoritative engagement numbers for one item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngagementStatus {
    #[serde(alias = "generationId")]
    pub id: String,
    pub likes_count: Option<u64>,
    pub bookmarks_count: Option<u64>,
    pub liked_by_current_user: Option<bool>,
    pub bookmarked_by_current_user: Option<bool>,
}

/// Result of a delete call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The whole item is gone.
    Deleted,
    /// Only part of the item was deleted; this is the item as it is now.
    Updated(FeedItem),
}

/// Accepts both `{ "data": ... }` and bare response bodies.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(data) => data,
        }
    }
}
