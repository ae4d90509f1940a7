use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Gallery category tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    All,
    Images,
    Videos,
    Music,
    Logos,
    Stickers,
    Products,
}

/// How a category narrows the feed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFilter {
    Mode(&'static str),
    GenerationType(&'static str),
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::All,
        Category::Images,
        Category::Videos,
        Category::Music,
        Category::Logos,
        Category::Stickers,
        Category::Products,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::All => "all",
            Category::Images => "images",
            Category::Videos => "videos",
            Category::Music => "music",
            Category::Logos => "logos",
            Category::Stickers => "stickers",
            Category::Products => "products",
        }
    }
    pub fn query_filter(&self) -> Option<CategoryFilter> {
        match self {
            Category::All => None,
            Category::Images => Some(CategoryFilter::Mode("image")),
            Category::Videos => Some(CategoryFilter::Mode("video")),
            Category::Music => Some(CategoryFilter::Mode("music")),
            Category::Logos => Some(CategoryFilter::GenerationType("logo")),
            Category::Stickers => Some(CategoryFilter::GenerationType("sticker-generation")),
            Category::Products => Some(CategoryFilter::GenerationType("product-generation")),
        }
    }
    /// The media collection that qualifies an item for this category, if any.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Category::Images => Some(MediaKind::Image),
            Category::Videos => Some(MediaKind::Video),
            Category::Music => Some(MediaKind::Audio),
            _ => None,
        }
    }
    /// Generation-type tags that qualify an item for this category regardless of its media.
    pub fn allowed_types(&self) -> &'static [&'static str] {
        match self {
            Category::All => &[],
            Category::Images => &["text-to-image", "image-to-image", "image-generation"],
            Category::Videos => &[
                "text-to-video",
                "image-to-video",
                "video-to-video",
                "video-generation",
            ],
            Category::Music => &["text-to-music", "music", "music-generation"],
            Category::Logos => &["logo", "logo-generation"],
            Category::Stickers => &["sticker", "sticker-generation"],
            Category::Products => &["product", "product-generation", "mockup"],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    /// Representative media preference: videos, then images, then audios.
    pub const PREFERENCE: [MediaKind; 3] = [MediaKind::Video, MediaKind::Image, MediaKind::Audio];
}

/// Identifier of a rendered tile. Tiles are keyed by the item they project.
pub type TileId = String;
