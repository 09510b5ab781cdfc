//! Facade crate for the supertiles tileset generator.
//!
//! This crate re-exports the core pipeline types and exposes the SQLite
//! container writer and the GeoJSON cluster index behind feature flags.

#![forbid(unsafe_code)]

pub use supertiles_core::{
    ClusterIndex, Feature, FeatureFilter, FieldSchema, GenerateError, GenerationReport,
    MetadataRecord, Properties, PropertyFilter, PropertyPredicate, Tile, TileCoord, TileError,
    TileGenerator, TileScheme, TileStore, TileStoreError, TilesetConfig,
};

#[cfg(feature = "store-sqlite")]
pub use supertiles_core::SqliteTileStore;

#[cfg(feature = "cluster")]
pub use supertiles_cluster::{
    ClusterOptions, ClusterProperties, PointClusterIndex, PointFeature, SumProperties, load_points,
};
