use crate::backend::model::MediaEntry;
use crate::config::MediaConfig;
use indexmap::IndexSet;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Turns storage keys and URLs into fetchable addresses.
pub trait MediaAddressing {
    /// Address of the asset through the media proxy, if it has a storage key.
    fn proxy(&self, url_or_key: &str) -> Option<String>;
    /// Direct (CDN) address of the asset.
    fn direct(&self, url_or_key: &str) -> Option<String>;
}

/// Addressing through the site's `/api/proxy/` namespace, with an optional CDN prefix
/// that identifies storage-backed absolute URLs.
#[derive(Debug, Clone)]
pub struct ProxyAddressing {
    proxy_base: String,
    cdn_prefix: Option<String>,
}

impl ProxyAddressing {
    pub fn new(proxy_base: impl Into<String>, cdn_prefix: Option<String>) -> Self {
        let mut proxy_base = proxy_base.into();
        if !proxy_base.ends_with('/') {
            proxy_base.push('/');
        }
        Self {
            proxy_base,
            cdn_prefix: cdn_prefix.filter(|p| !p.is_empty()),
        }
    }
    /// The storage key behind `url_or_key`, if it refers to our storage at all.
    fn storage_key(&self, url_or_key: &str) -> Option<String> {
        if let Some(rest) = url_or_key.strip_prefix(&self.proxy_base) {
            let encoded = rest
                .split_once('/')
                .map_or(rest, |(_, encoded)| encoded)
                .split('?')
                .next()
                .unwrap_or_default();
            return Some(
                percent_encoding::percent_decode_str(encoded)
                    .decode_utf8_lossy()
                    .into_owned(),
            );
        }
        if let Some(prefix) = &self.cdn_prefix {
            if let Some(key) = url_or_key.strip_prefix(prefix.as_str()) {
                return Some(key.trim_start_matches('/').to_string());
            }
        }
        if is_absolute(url_or_key) || is_local(url_or_key) {
            return None;
        }
        Some(url_or_key.trim_start_matches('/').to_string()).filter(|k| !k.is_empty())
    }
}

impl MediaAddressing for ProxyAddressing {
    fn proxy(&self, url_or_key: &str) -> Option<String> {
        let key = self.storage_key(url_or_key)?;
        Some(format!(
            "{}media/{}",
            self.proxy_base,
            utf8_percent_encode(&key, COMPONENT)
        ))
    }
    fn direct(&self, url_or_key: &str) -> Option<String> {
        if is_absolute(url_or_key) {
            return Some(url_or_key.to_string());
        }
        if is_local(url_or_key) || url_or_key.starts_with(&self.proxy_base) {
            return None;
        }
        let key = url_or_key.trim_start_matches('/');
        if key.is_empty() {
            return None;
        }
        Some(match &self.cdn_prefix {
            Some(prefix) => format!("{}/{key}", prefix.trim_end_matches('/')),
            None => format!(
                "{}resource/{}",
                self.proxy_base,
                utf8_percent_encode(key, COMPONENT)
            ),
        })
    }
}

fn is_absolute(s: &str) -> bool {
    let lowered = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

fn is_local(s: &str) -> bool {
    let lowered = s.get(..5).unwrap_or(s).to_ascii_lowercase();
    lowered.starts_with("blob:") || lowered.starts_with("data:")
}

fn host(s: &str) -> Option<String> {
    Url::parse(s).ok()?.host_str().map(str::to_ascii_lowercase)
}

fn host_matches(host: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| {
        let p = p.to_ascii_lowercase();
        host == p || host.ends_with(&format!(".{p}"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Thumbnail,
    Full,
}

/// Ordered, deduplicated candidate addresses for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    candidates: Vec<String>,
}

impl Resolution {
    pub fn primary(&self) -> &str {
        &self.candidates[0]
    }
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
    pub fn fallbacks(&self) -> &[String] {
        &self.candidates[1..]
    }
}

#[derive(Debug, Clone)]
pub struct MediaResolver<A = ProxyAddressing> {
    addressing: A,
    proxy_base: String,
    blocked_hosts: Vec<String>,
    flaky_original_hosts: Vec<String>,
}

impl MediaResolver<ProxyAddressing> {
    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(
            ProxyAddressing::new(config.proxy_base.clone(), config.cdn_prefix.clone()),
            config,
        )
    }
}

impl<A> MediaResolver<A>
where
    A: MediaAddressing,
{
    pub fn new(addressing: A, config: &MediaConfig) -> Self {
        Self {
            addressing,
            proxy_base: config.proxy_base.clone(),
            blocked_hosts: config.blocked_hosts.clone(),
            flaky_original_hosts: config.flaky_original_hosts.clone(),
        }
    }
    fn is_blocked(&self, url: &str) -> bool {
        is_absolute(url) && host(url).map_or(true, |h| host_matches(&h, &self.blocked_hosts))
    }
    /// Normalize one raw reference into a fetchable address.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || is_local(raw) {
            return None;
        }
        if is_absolute(raw) {
            return (!self.is_blocked(raw)).then(|| raw.to_string());
        }
        if raw.starts_with(&self.proxy_base) {
            return Some(raw.to_string());
        }
        self.addressing.proxy(raw)
    }
    /// Candidate addresses for `entry`, best first. `None` when nothing is resolvable.
    pub fn resolve(&self, entry: &MediaEntry, purpose: Purpose) -> Option<Resolution> {
        fn field(f: &Option<String>) -> Option<&str> {
            f.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        let url = field(&entry.url);
        let storage = field(&entry.storage_path);
        let storage_proxy = storage.and_then(|s| self.addressing.proxy(s));

        let candidates: Vec<Option<String>> = match purpose {
            Purpose::Thumbnail => vec![
                field(&entry.avif_url).and_then(|u| self.normalize(u)),
                field(&entry.webp_url).and_then(|u| self.normalize(u)),
                field(&entry.thumbnail_url).and_then(|u| self.normalize(u)),
                url.filter(|u| is_absolute(u)).and_then(|u| self.normalize(u)),
                url.and_then(|u| self.addressing.proxy(u)),
                storage_proxy,
            ],
            Purpose::Full => vec![
                url.filter(|u| {
                    !(is_absolute(u)
                        && host(u).is_some_and(|h| host_matches(&h, &self.flaky_original_hosts)))
                })
                .and_then(|u| self.addressing.direct(u)),
                storage_proxy,
            ],
        };
        let candidates = candidates
            .into_iter()
            .flatten()
            .filter(|c| !self.is_blocked(c))
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        (!candidates.is_empty()).then_some(Resolution { candidates })
    }
}

/// Load progress of one tile's media through its candidate list.
#[derive(Debug, Clone)]
pub struct MediaCursor {
    resolution: Resolution,
    index: usize,
}

impl MediaCursor {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            index: 0,
        }
    }
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }
    pub fn current(&self) -> Option<&str> {
        self.resolution.candidates.get(self.index).map(String::as_str)
    }
    /// Move past a failed candidate. `None` once every candidate has failed.
    pub fn advance(&mut self) -> Option<&str> {
        if self.index < self.resolution.candidates.len() {
            self.index += 1;
        }
        self.current()
    }
}

/// A media URL with its query string and trailing slash removed, for duplicate detection.
pub fn canonical_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].trim_end_matches('/')
}
