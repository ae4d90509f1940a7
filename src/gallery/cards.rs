use super::media::{canonical_url, MediaResolver, Purpose, Resolution};
use crate::backend::model::{FeedItem, MediaEntry};
use crate::config::FilterConfig;
use crate::types::{Category, MediaKind};
use std::collections::HashSet;

/// One renderable tile: an item with the single media chosen to represent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub item: FeedItem,
    pub media: MediaEntry,
    pub kind: MediaKind,
    pub resolution: Resolution,
}

impl Card {
    pub fn id(&self) -> &str {
        &self.item.id
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CardFilter<'a> {
    pub category: Category,
    pub search: &'a str,
    pub liked_only: bool,
    pub liked: &'a HashSet<String>,
}

/// Lowercase, with every run of non-alphanumerics collapsed to a single `-`.
pub fn normalize_type(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Whether `token` occurs in `tag` on `-` segment boundaries.
fn contains_token(tag: &str, token: &str) -> bool {
    tag == token
        || tag.starts_with(&format!("{token}-"))
        || tag.ends_with(&format!("-{token}"))
        || tag.contains(&format!("-{token}-"))
}

pub struct Projector {
    resolver: MediaResolver,
    denied: Vec<String>,
    allowed: Vec<String>,
}

impl Projector {
    pub fn new(resolver: MediaResolver, filters: &FilterConfig) -> Self {
        let normalized = |v: &[String]| -> Vec<String> {
            v.iter()
                .map(|s| normalize_type(s))
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            resolver,
            denied: normalized(&filters.denied_types),
            allowed: normalized(&filters.allowed_types),
        }
    }
    pub fn resolver(&self) -> &MediaResolver {
        &self.resolver
    }
    fn is_denied(&self, item: &FeedItem) -> bool {
        let Some(tag) = item.generation_type.as_deref().map(normalize_type) else {
            return false;
        };
        if self.allowed.iter().any(|a| *a == tag) {
            return false;
        }
        self.denied.iter().any(|d| contains_token(&tag, d))
    }
    /// Cards for `items`, in list order, at most one per item and per canonical media URL.
    pub fn project(&self, items: &[FeedItem], filter: &CardFilter<'_>) -> Vec<Card> {
        let mut seen_items = HashSet::new();
        let mut seen_media = HashSet::new();
        let mut cards = Vec::new();
        for item in items {
            if !item.is_visible()
                || !in_category(item, filter.category)
                || self.is_denied(item)
                || !matches_search(item, filter.search)
                || (filter.liked_only && !filter.liked.contains(&item.id))
            {
                continue;
            }
            if seen_items.contains(&item.id) {
                continue;
            }
            let Some((kind, media, resolution)) = self.representative(item, filter.category)
            else {
                log::debug!("no resolvable media for {}", item.id);
                continue;
            };
            if !seen_media.insert(canonical_url(resolution.primary()).to_string()) {
                continue;
            }
            seen_items.insert(item.id.clone());
            cards.push(Card {
                item: item.clone(),
                media: media.clone(),
                kind,
                resolution,
            });
        }
        cards
    }
    fn representative<'a>(
        &self,
        item: &'a FeedItem,
        category: Category,
    ) -> Option<(MediaKind, &'a MediaEntry, Resolution)> {
        // A media-kind category shows its own kind first.
        let preferred = category.media_kind();
        preferred
            .into_iter()
            .chain(
                MediaKind::PREFERENCE
                    .into_iter()
                    .filter(move |k| Some(*k) != preferred),
            )
            .find_map(|kind| {
                let purpose = match kind {
                    MediaKind::Image => Purpose::Thumbnail,
                    MediaKind::Video | MediaKind::Audio => Purpose::Full,
                };
                item.media(kind).iter().find_map(|media| {
                    self.resolver
                        .resolve(media, purpose)
                        .map(|resolution| (kind, media, resolution))
                })
            })
    }
}

fn in_category(item: &FeedItem, category: Category) -> bool {
    if category == Category::All {
        return true;
    }
    if category
        .media_kind()
        .is_some_and(|kind| !item.media(kind).is_empty())
    {
        return true;
    }
    item.generation_type
        .as_deref()
        .map(normalize_type)
        .is_some_and(|tag| category.allowed_types().contains(&tag.as_str()))
}

/// Every search term must appear in the prompt, type or creator name. Items
/// without a prompt are trusted to the server's match.
fn matches_search(item: &FeedItem, search: &str) -> bool {
    let search = search.trim().to_lowercase();
    if search.is_empty() || item.prompt.as_deref().map_or(true, str::is_empty) {
        return true;
    }
    let haystack = [
        item.prompt.as_deref(),
        item.generation_type.as_deref(),
        item.created_by.as_ref().map(|c| c.name()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();
    search.split_whitespace().all(|term| haystack.contains(term))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConfig;

    fn projector() -> Projector {
        Projector::new(
            MediaResolver::from_config(&MediaConfig::default()),
            &FilterConfig::default(),
        )
    }

    fn image(url: &str) -> MediaEntry {
        MediaEntry {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    fn item(id: &str, generation_type: &str, images: &[&str]) -> FeedItem {
        FeedItem {
            id: id.into(),
            prompt: Some(format!("prompt {id}")),
            generation_type: Some(generation_type.into()),
            is_public: Some(true),
            images: images.iter().map(|u| image(u)).collect(),
            ..Default::default()
        }
    }

    fn filter<'a>(category: Category, liked: &'a HashSet<String>) -> CardFilter<'a> {
        CardFilter {
            category,
            search: "",
            liked_only: false,
            liked,
        }
    }

    #[test]
    fn type_normalization() {
        assert_eq!(normalize_type("Image_Upscale"), "image-upscale");
        assert_eq!(normalize_type("  Remove  BG!! "), "remove-bg");
        assert_eq!(normalize_type("text-to-image"), "text-to-image");
        assert!(contains_token("image-upscale", "upscale"));
        assert!(contains_token("upscale", "upscale"));
        assert!(!contains_token("credit-report", "edit"));
    }

    #[test]
    fn dedup() {
        let liked = HashSet::new();
        let items = vec![
            item("a", "text-to-image", &["https://img.example.com/1.png?w=512"]),
            item("a", "text-to-image", &["https://img.example.com/2.png"]),
            item("b", "text-to-image", &["https://img.example.com/1.png/"]),
            item("c", "text-to-image", &["https://img.example.com/3.png"]),
        ];
        let cards = projector().project(&items, &filter(Category::All, &liked));
        assert_eq!(
            cards.iter().map(Card::id).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        let mut urls = HashSet::new();
        let mut ids = HashSet::new();
        for card in &cards {
            assert!(urls.insert(canonical_url(card.resolution.primary()).to_string()));
            assert!(ids.insert(card.id().to_string()));
        }
    }

    #[test]
    fn hidden_items() {
        let liked = HashSet::new();
        let mut private = item("p", "text-to-image", &["https://img.example.com/p.png"]);
        private.is_public = Some(false);
        let mut deleted = item("d", "text-to-image", &["https://img.example.com/d.png"]);
        deleted.is_deleted = Some(true);
        let items = vec![
            private,
            deleted,
            item("u", "Image Upscale", &["https://img.example.com/u.png"]),
            item("e", "canvas_edit", &["https://img.example.com/e.png"]),
            item("ok", "image-edit", &["https://img.example.com/ok.png"]),
            item("none", "text-to-image", &[]),
            item("blocked", "text-to-image", &["https://replicate.delivery/x.png"]),
        ];
        let cards = projector().project(&items, &filter(Category::All, &liked));
        assert_eq!(cards.iter().map(Card::id).collect::<Vec<_>>(), vec!["ok"]);
    }

    #[test]
    fn category_and_representative() {
        let liked = HashSet::new();
        let mut mixed = item("mixed", "text-to-video", &["https://img.example.com/m.png"]);
        mixed.videos = vec![image("https://img.example.com/m.mp4")];
        let mut song = item("song", "text-to-music", &[]);
        song.audios = vec![image("https://img.example.com/s.mp3")];
        let logo = item("logo", "logo", &["https://img.example.com/l.png"]);
        let items = vec![mixed, song, logo];

        let cards = projector().project(&items, &filter(Category::All, &liked));
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].kind, MediaKind::Video);
        assert_eq!(cards[1].kind, MediaKind::Audio);
        assert_eq!(cards[2].kind, MediaKind::Image);

        let cards = projector().project(&items, &filter(Category::Images, &liked));
        assert_eq!(
            cards.iter().map(|c| (c.id(), c.kind)).collect::<Vec<_>>(),
            vec![("mixed", MediaKind::Image), ("logo", MediaKind::Image)]
        );

        let cards = projector().project(&items, &filter(Category::Logos, &liked));
        assert_eq!(cards.iter().map(Card::id).collect::<Vec<_>>(), vec!["logo"]);

        let cards = projector().project(&items, &filter(Category::Music, &liked));
        assert_eq!(cards.iter().map(Card::id).collect::<Vec<_>>(), vec!["song"]);
    }

    #[test]
    fn liked_only_and_search() {
        let liked = HashSet::from(["b".to_string()]);
        let mut cat = item("a", "text-to-image", &["https://img.example.com/a.png"]);
        cat.prompt = Some("A Cat on a mat".into());
        let items = vec![
            cat,
            item("b", "text-to-image", &["https://img.example.com/b.png"]),
        ];
        let cards = projector().project(
            &items,
            &CardFilter {
                liked_only: true,
                ..filter(Category::All, &liked)
            },
        );
        assert_eq!(cards.iter().map(Card::id).collect::<Vec<_>>(), vec!["b"]);

        let cards = projector().project(
            &items,
            &CardFilter {
                search: " cat MAT ",
                ..filter(Category::All, &liked)
            },
        );
        assert_eq!(cards.iter().map(Card::id).collect::<Vec<_>>(), vec!["a"]);
    }
}
