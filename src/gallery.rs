pub mod cards;
pub mod media;

use self::cards::{Card, CardFilter, Projector};
use self::media::MediaCursor;
use crate::backend::model::FeedItem;
use crate::types::TileId;
use std::collections::{HashMap, HashSet};

/// The projected card set plus per-tile media loading state.
pub struct Gallery {
    projector: Projector,
    cards: Vec<Card>,
    cursors: HashMap<TileId, MediaCursor>,
    failed: HashSet<TileId>,
}

impl Gallery {
    pub fn new(projector: Projector) -> Self {
        Self {
            projector,
            cards: Vec::new(),
            cursors: HashMap::new(),
            failed: HashSet::new(),
        }
    }
    /// Re-project the cards from the canonical list. Tiles that survive with the
    /// same candidates keep their loading progress.
    pub fn refresh(&mut self, items: &[FeedItem], filter: &CardFilter<'_>) {
        self.cards = self.projector.project(items, filter);
        let mut cursors = HashMap::with_capacity(self.cards.len());
        for card in &self.cards {
            let kept = self
                .cursors
                .remove(card.id())
                .filter(|cursor| cursor.resolution() == &card.resolution);
            let cursor = match kept {
                Some(cursor) => cursor,
                None => {
                    self.failed.remove(card.id());
                    MediaCursor::new(card.resolution.clone())
                }
            };
            cursors.insert(card.id().to_string(), cursor);
        }
        self.cursors = cursors;
    }
    /// Cards to render, excluding tiles whose media could not be loaded.
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.cards
            .iter()
            .filter(|card| !self.failed.contains(card.id()))
    }
    pub fn tile_ids(&self) -> Vec<TileId> {
        self.cards().map(|card| card.id().to_string()).collect()
    }
    pub fn media_url(&self, tile: &str) -> Option<&str> {
        self.cursors.get(tile).and_then(MediaCursor::current)
    }
    /// Record a load failure of the tile's current address. Returns the next address
    /// to try, or `None` once the tile is hidden.
    pub fn on_media_error(&mut self, tile: &str) -> Option<String> {
        let cursor = self.cursors.get_mut(tile)?;
        match cursor.advance() {
            Some(next) => Some(next.to_string()),
            None => {
                log::debug!("all media candidates failed for {tile}");
                self.failed.insert(tile.to_string());
                None
            }
        }
    }
    pub fn is_failed(&self, tile: &str) -> bool {
        self.failed.contains(tile)
    }
}
