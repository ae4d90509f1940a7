pub mod masonry;
pub mod reveal;

use crate::types::TileId;

/// Receives the tiles a layout component wants size or visibility reports for.
pub trait Observer {
    fn observe(&mut self, tile: &TileId);
    fn unobserve(&mut self, tile: &TileId);
}
