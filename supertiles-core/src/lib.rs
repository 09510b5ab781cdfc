//! Core tile generation pipeline for clustered point tilesets.
//!
//! A run walks every zoom-level grid cell, pulls the features of each cell
//! from a [`ClusterIndex`], optionally filters and annotates them, encodes
//! non-empty tiles as gzipped Mapbox Vector Tiles and writes them, followed
//! by metadata, to a [`TileStore`]. The SQLite [`SqliteTileStore`] produces
//! an MBTiles container.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod annotate;
mod config;
pub mod encode;
mod error;
mod extract;
mod feature;
mod filter;
mod index;
mod metadata;
mod pipeline;
mod schema;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub mod test_support;

pub use annotate::{AnnotateError, CLUSTER_EXPANSION_ZOOM_PROPERTY, ClusterExpansionAnnotator};
pub use config::{
    ConfigError, DEFAULT_BOUNDS, DEFAULT_CENTER, MAX_SUPPORTED_ZOOM, SUPPORTED_TILE_SPEC_VERSION,
    TileScheme, TilesetConfig,
};
pub use encode::{
    Compressor, EncodeError, GzipCompressor, LAYER_NAME, MAX_TILE_BYTES, MvtEncoder, TileEncoder,
    TileError, TilePipeline,
};
pub use error::GenerateError;
pub use extract::TileExtractor;
pub use feature::{CLUSTER_ID_PROPERTY, Feature, Properties, Tile, TileCoord};
pub use filter::{FeatureFilter, PropertyFilter, PropertyPredicate};
pub use index::ClusterIndex;
pub use metadata::{LAYER_DESCRIPTION, MetadataAssembler, MetadataRecord};
pub use pipeline::{GenerationReport, TileGenerator, TileGrid};
pub use schema::{FieldSchema, FieldSchemaCollector, PropertyType};
#[cfg(feature = "store-sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "store-sqlite")))]
pub use store::SqliteTileStore;
pub use store::{TileRow, TileStore, TileStoreError};
