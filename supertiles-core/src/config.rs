//! Immutable run configuration for tileset generation.

use thiserror::Error;

/// Highest zoom level the tile grid supports.
pub const MAX_SUPPORTED_ZOOM: u8 = 24;

/// Vector tile specification version the encoder produces.
pub const SUPPORTED_TILE_SPEC_VERSION: u32 = 2;

/// Default bounds recorded in the container metadata (the whole world).
pub const DEFAULT_BOUNDS: &str = "-180.0,-85,180,85";

/// Default centre recorded in the container metadata (null island).
pub const DEFAULT_CENTER: &str = "0,0,0";

/// How tile rows are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TileScheme {
    /// Rows counted from the south, as MBTiles requires.
    #[default]
    Tms,
    /// Rows counted from the north, matching the traversal grid.
    Xyz,
}

/// Errors raised when validating a [`TilesetConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The minimum zoom exceeded the maximum zoom.
    #[error("min zoom {min_zoom} is greater than max zoom {max_zoom}")]
    InvertedZoomRange {
        /// Requested minimum zoom.
        min_zoom: u8,
        /// Requested maximum zoom.
        max_zoom: u8,
    },
    /// The effective maximum zoom is beyond the supported grid.
    #[error("max zoom {max_zoom} exceeds the supported maximum of {MAX_SUPPORTED_ZOOM}")]
    ZoomTooLarge {
        /// Effective maximum zoom.
        max_zoom: u8,
    },
    /// Tile extent must be positive.
    #[error("tile extent must be greater than zero")]
    ZeroExtent,
    /// Only one vector tile version can be produced.
    #[error(
        "tile spec version {found} is not supported; the encoder writes version {SUPPORTED_TILE_SPEC_VERSION}"
    )]
    UnsupportedTileSpecVersion {
        /// Requested version.
        found: u32,
    },
}

/// Configuration for a single generation run.
///
/// Built once, validated, then shared by reference with every pipeline
/// component. There is no global defaults object; [`Default`] provides the
/// documented defaults.
///
/// # Examples
/// ```
/// use supertiles_core::TilesetConfig;
///
/// let config = TilesetConfig::new("out.mbtiles").with_max_zoom(2);
/// assert_eq!(config.effective_max_zoom(), 2);
/// assert!(config.validate().is_ok());
///
/// let config = config.with_include_unclustered(true);
/// assert_eq!(config.effective_max_zoom(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilesetConfig {
    /// Tileset name written to the metadata table.
    pub name: String,
    /// Lowest zoom level traversed.
    pub min_zoom: u8,
    /// Highest clustered zoom level.
    pub max_zoom: u8,
    /// Also traverse the unclustered level at `max_zoom + 1`.
    pub include_unclustered: bool,
    /// Tile extent used by the encoder.
    pub extent: u32,
    /// Declared vector tile specification version.
    pub tile_spec_version: u32,
    /// Comma-separated bounds for the metadata table.
    pub bounds: String,
    /// Comma-separated centre (longitude, latitude, zoom).
    pub center: String,
    /// Optional attribution HTML.
    pub attribution: Option<String>,
    /// Optional tileset description.
    pub description: Option<String>,
    /// Annotate clusters with the zoom at which they expand.
    pub store_cluster_expansion_zoom: bool,
    /// Row convention for persisted tiles.
    pub scheme: TileScheme,
}

impl Default for TilesetConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            min_zoom: 0,
            max_zoom: 8,
            include_unclustered: false,
            extent: 512,
            tile_spec_version: SUPPORTED_TILE_SPEC_VERSION,
            bounds: DEFAULT_BOUNDS.to_owned(),
            center: DEFAULT_CENTER.to_owned(),
            attribution: None,
            description: None,
            store_cluster_expansion_zoom: false,
            scheme: TileScheme::Tms,
        }
    }
}

impl TilesetConfig {
    /// Defaults with the given tileset name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the minimum zoom.
    #[must_use]
    pub fn with_min_zoom(mut self, min_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self
    }

    /// Set the maximum clustered zoom.
    #[must_use]
    pub fn with_max_zoom(mut self, max_zoom: u8) -> Self {
        self.max_zoom = max_zoom;
        self
    }

    /// Toggle traversal of the unclustered level.
    #[must_use]
    pub fn with_include_unclustered(mut self, include: bool) -> Self {
        self.include_unclustered = include;
        self
    }

    /// Set the tile extent.
    #[must_use]
    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = extent;
        self
    }

    /// Toggle cluster expansion zoom annotation.
    #[must_use]
    pub fn with_cluster_expansion_zoom(mut self, enabled: bool) -> Self {
        self.store_cluster_expansion_zoom = enabled;
        self
    }

    /// Set the persisted row convention.
    #[must_use]
    pub fn with_scheme(mut self, scheme: TileScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the attribution.
    #[must_use]
    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Highest zoom actually traversed.
    #[must_use]
    pub fn effective_max_zoom(&self) -> u8 {
        self.max_zoom
            .saturating_add(u8::from(self.include_unclustered))
    }

    /// Check the configuration is internally consistent.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for an inverted or oversized zoom range, a zero
    /// extent or an unsupported tile specification version.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::InvertedZoomRange {
                min_zoom: self.min_zoom,
                max_zoom: self.max_zoom,
            });
        }
        let max_zoom = self.effective_max_zoom();
        if max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(ConfigError::ZoomTooLarge { max_zoom });
        }
        if self.extent == 0 {
            return Err(ConfigError::ZeroExtent);
        }
        if self.tile_spec_version != SUPPORTED_TILE_SPEC_VERSION {
            return Err(ConfigError::UnsupportedTileSpecVersion {
                found: self.tile_spec_version,
            });
        }
        Ok(())
    }
}
