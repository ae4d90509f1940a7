use crate::backend::config::Config as FeedConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("http://localhost:5000/api"),
            timeout: 30,
            user_agent: format!("gallery-feed/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MediaConfig {
    /// Site-relative namespace of the media proxy. Paths under it pass through untouched.
    pub proxy_base: String,
    /// CDN prefix for direct addressing of storage keys.
    pub cdn_prefix: Option<String>,
    /// Hosts that are never attempted.
    pub blocked_hosts: Vec<String>,
    /// Hosts whose originals are excluded from full-size candidates.
    pub flaky_original_hosts: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            proxy_base: String::from("/api/proxy/"),
            cdn_prefix: None,
            blocked_hosts: vec![String::from("replicate.delivery")],
            flaky_original_hosts: vec![String::from("fal.media")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    /// Generation-type tokens hidden from the public gallery.
    pub denied_types: Vec<String>,
    /// Exceptions to `denied_types`, compared after normalization.
    pub allowed_types: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            denied_types: [
                "upscale",
                "remove-bg",
                "removebg",
                "vectorize",
                "image-to-svg",
                "resize",
                "erase",
                "replace",
                "expand",
                "reimagine",
                "edit",
                "live-chat",
            ]
            .map(String::from)
            .to_vec(),
            allowed_types: ["image-edit", "video-edit"].map(String::from).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Height of one implicit grid row in pixels.
    pub row_unit: f64,
    /// Gap between grid rows in pixels.
    pub row_gap: f64,
    pub min_span: u32,
    /// Pre-trigger margin of the reveal observer in pixels.
    pub reveal_margin: f64,
    /// Fraction of the document height after which scrolling prefetches the next page.
    pub prefetch_ratio: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            row_unit: 4.0,
            row_gap: 8.0,
            min_span: 1,
            reveal_margin: 200.0,
            prefetch_ratio: 0.25,
        }
    }
}
