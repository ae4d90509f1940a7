use super::Observer;
use crate::config::LayoutConfig;
use crate::types::TileId;
use indexmap::IndexSet;
use std::collections::HashMap;

/// Row spans for a fixed-row grid, so each tile renders at about its natural
/// height while keeping document order.
#[derive(Debug, Clone)]
pub struct MasonryLayout {
    row_unit: f64,
    row_gap: f64,
    min_span: u32,
    spans: HashMap<TileId, u32>,
    observed: IndexSet<TileId>,
}

impl MasonryLayout {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            row_unit: config.row_unit,
            row_gap: config.row_gap,
            min_span: config.min_span,
            spans: HashMap::new(),
            observed: IndexSet::new(),
        }
    }
    pub fn span(&self, tile: &str) -> Option<u32> {
        self.spans.get(tile).copied()
    }
    pub fn spans(&self) -> &HashMap<TileId, u32> {
        &self.spans
    }
    pub fn span_for(&self, height: f64) -> u32 {
        if !height.is_finite() || height <= 0.0 {
            return self.min_span;
        }
        let rows = ((height + self.row_gap) / (self.row_unit + self.row_gap)).ceil();
        self.min_span.max(rows as u32)
    }
    /// Record a measured height. Returns whether the tile's span changed.
    pub fn measure(&mut self, tile: &str, height: f64) -> bool {
        let span = self.span_for(height);
        if self.spans.get(tile) == Some(&span) {
            return false;
        }
        log::debug!("span {tile}: {span}");
        self.spans.insert(tile.to_string(), span);
        true
    }
    /// The tile's media finished decoding.
    pub fn on_content_loaded(&mut self, tile: &str, height: f64) -> bool {
        self.measure(tile, height)
    }
    /// Size changes reported by the resize observer. Returns whether any span
    /// changed.
    pub fn on_resize<'a, I>(&mut self, entries: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        entries
            .into_iter()
            .fold(false, |changed, (tile, height)| {
                self.measure(tile, height) || changed
            })
    }
    /// Follow the mounted tile set: new tiles are observed, removed tiles are
    /// released and forget their spans.
    pub fn sync_tiles(&mut self, tiles: &[TileId], observer: &mut impl Observer) {
        let current = tiles.iter().cloned().collect::<IndexSet<_>>();
        for tile in self.observed.difference(&current) {
            observer.unobserve(tile);
            self.spans.remove(tile);
        }
        for tile in current.difference(&self.observed) {
            observer.observe(tile);
        }
        self.observed = current;
    }
}
