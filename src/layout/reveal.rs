use super::Observer;
use crate::backend::coordinator::FeedSnapshot;
use crate::config::LayoutConfig;
use crate::types::TileId;
use indexmap::IndexSet;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Coordinator state that decides whether a continuation may be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadGate {
    pub has_more: bool,
    pub loading: bool,
    pub initial_loaded: bool,
}

impl LoadGate {
    fn is_open(&self) -> bool {
        self.has_more && !self.loading && self.initial_loaded
    }
}

impl From<&FeedSnapshot> for LoadGate {
    fn from(snapshot: &FeedSnapshot) -> Self {
        Self {
            has_more: snapshot.has_more,
            loading: snapshot.loading,
            initial_loaded: snapshot.initial_loaded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ScrollMetrics {
    fn progress(&self) -> f64 {
        if self.document_height <= 0.0 {
            return 0.0;
        }
        (self.scroll_top + self.viewport_height) / self.document_height
    }
}

/// Tracks which tiles have been revealed and when the trailing sentinel should
/// ask for the next page.
#[derive(Debug)]
pub struct RevealTracker {
    visible: HashSet<TileId>,
    observed: IndexSet<TileId>,
    user_scrolled: bool,
    sentinel_intersecting: bool,
    last_load: Option<Instant>,
    cooldown: Duration,
    margin: f64,
    prefetch_ratio: f64,
}

impl RevealTracker {
    pub fn new(config: &LayoutConfig, cooldown: Duration) -> Self {
        Self {
            visible: HashSet::new(),
            observed: IndexSet::new(),
            user_scrolled: false,
            sentinel_intersecting: false,
            last_load: None,
            cooldown,
            margin: config.reveal_margin,
            prefetch_ratio: config.prefetch_ratio,
        }
    }
    /// Pre-trigger margin for the shared intersection observer, in pixels.
    pub fn margin(&self) -> f64 {
        self.margin
    }
    pub fn is_visible(&self, tile: &str) -> bool {
        self.visible.contains(tile)
    }
    pub fn visible_count(&self) -> usize {
        self.visible.len()
    }
    /// Observe newly mounted tiles and release unmounted ones. Tiles already
    /// revealed stay revealed.
    pub fn sync_tiles(&mut self, tiles: &[TileId], observer: &mut impl Observer) {
        let current = tiles.iter().cloned().collect::<IndexSet<_>>();
        for tile in self.observed.difference(&current) {
            observer.unobserve(tile);
        }
        for tile in current.difference(&self.observed) {
            if !self.visible.contains(tile) {
                observer.observe(tile);
            }
        }
        self.observed = current;
    }
    /// Apply intersection entries. Returns the tiles revealed by this batch; each
    /// is released from the observer since reveal happens once.
    pub fn on_intersections(
        &mut self,
        entries: &[(TileId, bool)],
        observer: &mut impl Observer,
    ) -> Vec<TileId> {
        let mut revealed = Vec::new();
        for (tile, intersecting) in entries {
            if *intersecting && self.visible.insert(tile.clone()) {
                observer.unobserve(tile);
                revealed.push(tile.clone());
            }
        }
        revealed
    }
    /// The trailing sentinel entered or left the viewport. Returns whether a
    /// continuation should be requested.
    pub fn on_sentinel(&mut self, intersecting: bool, gate: LoadGate, now: Instant) -> bool {
        self.sentinel_intersecting = intersecting;
        intersecting && self.try_load(gate, now)
    }
    /// A user scroll. Returns whether a continuation should be requested, either
    /// because the prefetch threshold was passed or the sentinel is already in view.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics, gate: LoadGate, now: Instant) -> bool {
        self.user_scrolled = true;
        let prefetch = metrics.progress() >= self.prefetch_ratio;
        (prefetch || self.sentinel_intersecting) && self.try_load(gate, now)
    }
    /// Forget the cooldown and scroll state after a filter change.
    pub fn reset(&mut self) {
        self.user_scrolled = false;
        self.sentinel_intersecting = false;
        self.last_load = None;
    }
    fn try_load(&mut self, gate: LoadGate, now: Instant) -> bool {
        if !self.user_scrolled || !gate.is_open() {
            return false;
        }
        if let Some(last) = self.last_load {
            if now.saturating_duration_since(last) < self.cooldown {
                log::debug!("continuation suppressed by cooldown");
                return false;
            }
        }
        self.last_load = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::testing::Recorder;

    const OPEN: LoadGate = LoadGate {
        has_more: true,
        loading: false,
        initial_loaded: true,
    };

    fn tracker() -> RevealTracker {
        RevealTracker::new(&LayoutConfig::default(), Duration::from_millis(700))
    }

    fn scroll(scroll_top: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            viewport_height: 1000.0,
            document_height: 10000.0,
        }
    }

    #[test]
    fn reveal_is_monotonic() {
        let mut tracker = tracker();
        let mut observer = Recorder::default();
        let tiles = vec!["a".to_string(), "b".to_string()];
        tracker.sync_tiles(&tiles, &mut observer);
        let revealed = tracker.on_intersections(
            &[("a".into(), true), ("b".into(), false)],
            &mut observer,
        );
        assert_eq!(revealed, vec!["a"]);
        let revealed = tracker.on_intersections(
            &[("a".into(), false), ("a".into(), true)],
            &mut observer,
        );
        assert!(revealed.is_empty());
        assert!(tracker.is_visible("a"));
        assert!(!tracker.is_visible("b"));
        assert_eq!(tracker.visible_count(), 1);
        assert_eq!(
            observer.observed.iter().collect::<Vec<_>>(),
            vec!["b"]
        );
    }

    #[test]
    fn sentinel_requires_user_scroll() {
        let mut tracker = tracker();
        let now = Instant::now();
        assert!(!tracker.on_sentinel(true, OPEN, now));
        // Scrolling while the sentinel is in view resumes the load.
        assert!(tracker.on_scroll(scroll(0.0), OPEN, now));
    }

    #[test]
    fn sentinel_guards() {
        let now = Instant::now();
        for gate in [
            LoadGate { has_more: false, ..OPEN },
            LoadGate { loading: true, ..OPEN },
            LoadGate { initial_loaded: false, ..OPEN },
        ] {
            let mut tracker = tracker();
            tracker.on_scroll(scroll(0.0), gate, now);
            assert!(!tracker.on_sentinel(true, gate, now), "{gate:?}");
        }
        let mut tracker = tracker();
        tracker.on_scroll(scroll(0.0), OPEN, now);
        assert!(!tracker.on_sentinel(false, OPEN, now));
        assert!(tracker.on_sentinel(true, OPEN, now));
    }

    #[test]
    fn prefetch_threshold() {
        let mut tracker = tracker();
        let now = Instant::now();
        assert!(!tracker.on_scroll(scroll(1000.0), OPEN, now));
        assert!(tracker.on_scroll(scroll(1500.0), OPEN, now));
    }

    #[test]
    fn cooldown() {
        let mut tracker = tracker();
        let now = Instant::now();
        assert!(tracker.on_scroll(scroll(5000.0), OPEN, now));
        assert!(!tracker.on_sentinel(true, OPEN, now + Duration::from_millis(100)));
        assert!(!tracker.on_scroll(scroll(5100.0), OPEN, now + Duration::from_millis(699)));
        assert!(tracker.on_scroll(scroll(5200.0), OPEN, now + Duration::from_millis(700)));
        tracker.reset();
        assert!(!tracker.on_sentinel(true, OPEN, now + Duration::from_millis(800)));
    }

    #[test]
    fn gate_from_snapshot() {
        let snapshot = FeedSnapshot {
            has_more: true,
            initial_loaded: true,
            ..Default::default()
        };
        assert_eq!(LoadGate::from(&snapshot), OPEN);
        let snapshot = FeedSnapshot {
            loading: true,
            ..snapshot
        };
        assert!(!LoadGate::from(&snapshot).is_open());
    }
}
