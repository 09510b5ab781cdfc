//! Per-tile feature extraction.

use crate::{ClusterIndex, FeatureFilter, Tile, TileCoord};

/// Pulls features for one grid cell from a [`ClusterIndex`] and applies the
/// optional filter.
pub struct TileExtractor<'a, I: ?Sized> {
    index: &'a I,
    filter: Option<&'a dyn FeatureFilter>,
}

impl<'a, I> TileExtractor<'a, I>
where
    I: ClusterIndex + ?Sized,
{
    /// Create an extractor over `index`.
    pub const fn new(index: &'a I, filter: Option<&'a dyn FeatureFilter>) -> Self {
        Self { index, filter }
    }

    /// Return the filtered tile at `coord`, or `None` when nothing survives.
    ///
    /// An absent tile, an empty tile and a tile whose features were all
    /// rejected by the filter are indistinguishable to the caller.
    pub fn extract(&self, coord: TileCoord) -> Option<Tile> {
        let mut tile = self.index.tile(coord.zoom, coord.x, coord.y)?;
        tile.coord = coord;
        if let Some(filter) = self.filter {
            tile.features
                .retain(|feature| filter.keep(&feature.properties));
        }
        (!tile.is_empty()).then_some(tile)
    }
}
