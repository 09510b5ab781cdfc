//! Tile and feature types shared across the generation pipeline.

use std::fmt;

use geo::Coord;
use serde_json::{Map, Value};

/// Property mapping carried by each feature.
///
/// Keys keep their insertion order so schema inference and the serialised
/// metadata document are deterministic.
pub type Properties = Map<String, Value>;

/// Property holding the identifier of a cluster feature.
pub const CLUSTER_ID_PROPERTY: &str = "cluster_id";

/// Address of a tile in the zoom-`z` grid.
///
/// Columns and rows are counted from the north-west corner, so `y = 0` is the
/// northernmost row. [`TileScheme`](crate::TileScheme) decides how the row is
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Zoom level.
    pub zoom: u8,
    /// Column, `0 <= x < 2^zoom`.
    pub x: u32,
    /// Row from the top, `0 <= y < 2^zoom`.
    pub y: u32,
}

impl TileCoord {
    /// Construct a coordinate without validating it against the grid.
    ///
    /// # Examples
    /// ```
    /// use supertiles_core::TileCoord;
    ///
    /// let coord = TileCoord::new(2, 1, 3);
    /// assert_eq!(coord.to_string(), "z:2, x:1, y:3");
    /// ```
    #[must_use]
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of rows (and columns) in this coordinate's zoom level.
    #[must_use]
    pub const fn dimension(&self) -> u64 {
        1_u64 << self.zoom
    }

    /// Row counted from the bottom of the grid.
    ///
    /// ```
    /// use supertiles_core::TileCoord;
    ///
    /// assert_eq!(TileCoord::new(2, 0, 0).flipped_y(), 3);
    /// assert_eq!(TileCoord::new(0, 0, 0).flipped_y(), 0);
    /// ```
    #[must_use]
    pub const fn flipped_y(&self) -> u64 {
        self.dimension() - 1 - self.y as u64
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z:{}, x:{}, y:{}", self.zoom, self.x, self.y)
    }
}

/// A point feature positioned in tile-local coordinates.
///
/// `geometry` is expressed in the tile's extent space; values outside
/// `0..extent` are legal and represent the tile buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Optional feature identifier written to the encoded tile.
    pub id: Option<u64>,
    /// Tile-local point position.
    pub geometry: Coord<i32>,
    /// Feature properties.
    pub properties: Properties,
}

impl Feature {
    /// Construct a feature without an identifier.
    #[must_use]
    pub const fn new(geometry: Coord<i32>, properties: Properties) -> Self {
        Self {
            id: None,
            geometry,
            properties,
        }
    }

    /// Attach an identifier to the feature.
    #[must_use]
    pub const fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Raw `cluster_id` property. A null or missing property marks an
    /// individual point and yields `None`.
    #[must_use]
    pub fn cluster_id_value(&self) -> Option<&Value> {
        self.properties
            .get(CLUSTER_ID_PROPERTY)
            .filter(|value| !value.is_null())
    }

    /// Identifier of the cluster this feature represents, if any.
    ///
    /// Only non-negative integral `cluster_id` values qualify. Use
    /// [`Feature::cluster_id_value`] to tell a malformed identifier apart from
    /// an individual point.
    #[must_use]
    pub fn cluster_id(&self) -> Option<u64> {
        self.cluster_id_value().and_then(Value::as_u64)
    }
}

/// Features belonging to one cell of a zoom-level grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Grid address of the tile.
    pub coord: TileCoord,
    /// Ordered features inside the tile (including its buffer).
    pub features: Vec<Feature>,
}

impl Tile {
    /// Construct a tile from its coordinate and features.
    #[must_use]
    pub const fn new(coord: TileCoord, features: Vec<Feature>) -> Self {
        Self { coord, features }
    }

    /// Whether the tile has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
