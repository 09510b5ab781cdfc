//! GeoJSON point clustering for the tile generator.
//!
//! [`PointClusterIndex`] loads point features, clusters them once per zoom
//! level and answers [`supertiles_core::ClusterIndex`] queries. Cluster
//! properties can be aggregated with a [`ClusterProperties`] strategy.
#![forbid(unsafe_code)]

mod geojson;
mod index;
mod options;
mod properties;

pub use geojson::{LoadFeaturesError, PointFeature, load_points, parse_points};
pub use index::{ClusterChild, PointClusterIndex};
pub use options::{ClusterOptions, ClusterOptionsError};
pub use properties::{ClusterProperties, NoAggregation, SumProperties};
