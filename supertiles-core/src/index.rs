//! Read access to a clustered point index.
//!
//! The [`ClusterIndex`] trait is the only way the pipeline reaches the
//! clustering engine. Implementations answer "which features fall in tile
//! `(z, x, y)`" and "at which zoom does this cluster expand".

use crate::Tile;

/// Query interface over an already-built cluster index.
///
/// Implementations must be read-only from the caller's perspective; the
/// pipeline may call [`ClusterIndex::tile`] once per grid cell and expects no
/// observable state change.
///
/// # Examples
///
/// ```rust
/// use geo::Coord;
/// use supertiles_core::{ClusterIndex, Feature, Properties, Tile, TileCoord};
///
/// struct SingleTile;
///
/// impl ClusterIndex for SingleTile {
///     fn tile(&self, zoom: u8, x: u32, y: u32) -> Option<Tile> {
///         let coord = TileCoord::new(zoom, x, y);
///         (zoom == 0).then(|| {
///             Tile::new(coord, vec![Feature::new(Coord { x: 256, y: 256 }, Properties::new())])
///         })
///     }
///
///     fn cluster_expansion_zoom(&self, _cluster_id: u64) -> Option<u8> {
///         None
///     }
/// }
///
/// assert!(SingleTile.tile(0, 0, 0).is_some());
/// assert!(SingleTile.tile(1, 0, 0).is_none());
/// ```
pub trait ClusterIndex {
    /// Return the features inside tile `(zoom, x, y)`, or `None` when the cell
    /// holds nothing. An empty tile and `None` are treated alike.
    fn tile(&self, zoom: u8, x: u32, y: u32) -> Option<Tile>;

    /// Zoom level at which `cluster_id` splits into its children, or `None`
    /// when the identifier is unknown.
    fn cluster_expansion_zoom(&self, cluster_id: u64) -> Option<u8>;
}

impl<T: ClusterIndex + ?Sized> ClusterIndex for &T {
    fn tile(&self, zoom: u8, x: u32, y: u32) -> Option<Tile> {
        (**self).tile(zoom, x, y)
    }

    fn cluster_expansion_zoom(&self, cluster_id: u64) -> Option<u8> {
        (**self).cluster_expansion_zoom(cluster_id)
    }
}
