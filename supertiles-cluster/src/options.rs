//! Clustering parameters.

use supertiles_core::MAX_SUPPORTED_ZOOM;
use thiserror::Error;

/// Errors raised by [`ClusterOptions::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ClusterOptionsError {
    /// The minimum zoom exceeded the maximum zoom.
    #[error("min zoom {min_zoom} is greater than max zoom {max_zoom}")]
    InvertedZoomRange {
        /// Requested minimum zoom.
        min_zoom: u8,
        /// Requested maximum zoom.
        max_zoom: u8,
    },
    /// Clustering zooms must leave room for the unclustered level.
    #[error("max zoom {max_zoom} exceeds the clustering limit of {limit}")]
    ZoomTooLarge {
        /// Requested maximum zoom.
        max_zoom: u8,
        /// Highest accepted maximum zoom.
        limit: u8,
    },
    /// The radius must be a positive, finite number of pixels.
    #[error("cluster radius must be positive and finite, got {radius}")]
    InvalidRadius {
        /// Requested radius.
        radius: f64,
    },
    /// Tile extent must be positive.
    #[error("tile extent must be greater than zero")]
    ZeroExtent,
    /// Leaf nodes must hold at least one entry.
    #[error("node size must be greater than zero")]
    ZeroNodeSize,
    /// A cluster needs at least one point.
    #[error("min points must be greater than zero")]
    ZeroMinPoints,
}

/// Parameters of the zoom-by-zoom clustering pass.
///
/// ```
/// use supertiles_cluster::ClusterOptions;
///
/// let options = ClusterOptions::default();
/// assert_eq!((options.min_zoom, options.max_zoom), (0, 8));
/// assert_eq!(options.radius, 40.0);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    /// Lowest zoom level clusters are built for.
    pub min_zoom: u8,
    /// Highest zoom level clusters are built for; the level above holds the
    /// raw points.
    pub max_zoom: u8,
    /// Cluster radius in pixels, relative to `extent`.
    pub radius: f64,
    /// Tile extent the radius is measured against.
    pub extent: u32,
    /// Leaf size hint for the spatial index.
    ///
    /// The R\*-tree fixes its node capacity at compile time, so the value is
    /// validated and logged but does not change the tree layout.
    pub node_size: usize,
    /// Minimum number of points that form a cluster.
    pub min_points: u64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 8,
            radius: 40.0,
            extent: 512,
            node_size: 64,
            min_points: 2,
        }
    }
}

impl ClusterOptions {
    /// Check the options describe a buildable index.
    ///
    /// # Errors
    /// Returns [`ClusterOptionsError`] for an inverted or oversized zoom
    /// range, a non-positive radius, or zero extent, node size or minimum
    /// point count.
    pub fn validate(&self) -> Result<(), ClusterOptionsError> {
        if self.min_zoom > self.max_zoom {
            return Err(ClusterOptionsError::InvertedZoomRange {
                min_zoom: self.min_zoom,
                max_zoom: self.max_zoom,
            });
        }
        let limit = MAX_SUPPORTED_ZOOM - 1;
        if self.max_zoom > limit {
            return Err(ClusterOptionsError::ZoomTooLarge {
                max_zoom: self.max_zoom,
                limit,
            });
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(ClusterOptionsError::InvalidRadius {
                radius: self.radius,
            });
        }
        if self.extent == 0 {
            return Err(ClusterOptionsError::ZeroExtent);
        }
        if self.node_size == 0 {
            return Err(ClusterOptionsError::ZeroNodeSize);
        }
        if self.min_points == 0 {
            return Err(ClusterOptionsError::ZeroMinPoints);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ClusterOptions { min_zoom: 5, max_zoom: 2, ..ClusterOptions::default() })]
    #[case(ClusterOptions { max_zoom: 24, ..ClusterOptions::default() })]
    #[case(ClusterOptions { radius: 0.0, ..ClusterOptions::default() })]
    #[case(ClusterOptions { radius: f64::NAN, ..ClusterOptions::default() })]
    #[case(ClusterOptions { extent: 0, ..ClusterOptions::default() })]
    #[case(ClusterOptions { node_size: 0, ..ClusterOptions::default() })]
    #[case(ClusterOptions { min_points: 0, ..ClusterOptions::default() })]
    fn rejects_invalid_options(#[case] options: ClusterOptions) {
        assert!(options.validate().is_err());
    }

    #[rstest]
    fn accepts_highest_clustering_zoom() {
        let options = ClusterOptions {
            max_zoom: MAX_SUPPORTED_ZOOM - 1,
            ..ClusterOptions::default()
        };
        assert_eq!(options.validate(), Ok(()));
    }
}
