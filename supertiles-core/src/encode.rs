//! Vector tile encoding, compression and the size policy.
//!
//! Each surviving tile becomes one `geojsonLayer` Mapbox Vector Tile, gzip
//! compressed. Payloads larger than [`MAX_TILE_BYTES`] fail the run.

use std::{io::Write, sync::Arc};

use flate2::{Compression, write::GzEncoder};
use mvt::{GeomEncoder, GeomType};
use serde_json::{Number, Value};
use thiserror::Error;

use crate::{Feature, Tile, TileCoord};

/// Name of the single layer written to every tile.
pub const LAYER_NAME: &str = "geojsonLayer";

/// Largest compressed tile accepted, in bytes.
pub const MAX_TILE_BYTES: usize = 500_000;

/// Largest integer a feature property can hold without losing precision.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Failure from the underlying vector tile encoder.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct EncodeError(#[from] mvt::Error);

/// Errors raised while turning a tile into its persisted payload.
#[derive(Debug, Error)]
pub enum TileError {
    /// The vector tile encoder rejected the tile.
    #[error("failed to encode tile {coord}: {source}")]
    Encode {
        /// Tile being encoded.
        coord: TileCoord,
        /// Encoder failure.
        #[source]
        source: EncodeError,
    },
    /// Compressing the encoded tile failed.
    #[error("failed to compress tile {coord}: {source}")]
    Compress {
        /// Tile being compressed.
        coord: TileCoord,
        /// Underlying I/O error from the compressor.
        #[source]
        source: std::io::Error,
    },
    /// The compressed payload exceeded the size limit.
    #[error(
        "tile {coord} is {size} bytes compressed, over the {limit} byte limit; \
         try increasing the cluster radius, reducing max zoom, or aggregating fewer cluster properties"
    )]
    TooLarge {
        /// Offending tile.
        coord: TileCoord,
        /// Compressed size in bytes.
        size: usize,
        /// Limit that was exceeded.
        limit: usize,
    },
}

/// Serialises a tile's features into a binary vector tile.
pub trait TileEncoder: Send + Sync {
    /// Encode `tile` as a single-layer vector tile.
    ///
    /// # Errors
    /// Returns [`EncodeError`] when the encoder rejects a geometry or layer.
    fn encode(&self, tile: &Tile) -> Result<Vec<u8>, EncodeError>;
}

/// Compresses encoded tile bytes.
pub trait Compressor: Send + Sync {
    /// Compress `bytes`.
    ///
    /// # Errors
    /// Propagates I/O failures from the compression stream.
    fn compress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Mapbox Vector Tile encoder backed by the `mvt` crate.
///
/// Property values follow the vector tile value rules: integral numbers are
/// written as unsigned or signed integers, fractional numbers as doubles,
/// nested values as their JSON text, and nulls are omitted.
#[derive(Debug, Clone, Copy)]
pub struct MvtEncoder {
    extent: u32,
}

impl MvtEncoder {
    /// Encoder producing tiles with the given extent.
    #[must_use]
    pub const fn new(extent: u32) -> Self {
        Self { extent }
    }
}

impl TileEncoder for MvtEncoder {
    fn encode(&self, tile: &Tile) -> Result<Vec<u8>, EncodeError> {
        let mut mvt_tile = mvt::Tile::new(self.extent);
        let mut layer = mvt_tile.create_layer(LAYER_NAME);
        for feature in &tile.features {
            let geometry = GeomEncoder::new(GeomType::Point)
                .point(
                    f64::from(feature.geometry.x),
                    f64::from(feature.geometry.y),
                )?
                .encode()?;
            let mut encoded = layer.into_feature(geometry);
            if let Some(id) = feature.id {
                encoded.set_id(id);
            }
            write_properties(&mut encoded, feature);
            layer = encoded.into_layer();
        }
        mvt_tile.add_layer(layer)?;
        Ok(mvt_tile.to_bytes()?)
    }
}

fn write_properties(encoded: &mut mvt::Feature, feature: &Feature) {
    for (key, value) in &feature.properties {
        match value {
            Value::Null => {}
            Value::Bool(flag) => encoded.add_tag_bool(key, *flag),
            Value::String(text) => encoded.add_tag_string(key, text),
            Value::Number(number) => write_number(encoded, key, number),
            Value::Array(_) | Value::Object(_) => {
                encoded.add_tag_string(key, &value.to_string());
            }
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "integral doubles are range-checked against MAX_SAFE_INTEGER first"
)]
fn write_number(encoded: &mut mvt::Feature, key: &str, number: &Number) {
    if let Some(unsigned) = number.as_u64() {
        encoded.add_tag_uint(key, unsigned);
    } else if let Some(signed) = number.as_i64() {
        encoded.add_tag_sint(key, signed);
    } else if let Some(double) = number.as_f64() {
        if double.fract() == 0.0 && double.abs() <= MAX_SAFE_INTEGER {
            if double < 0.0 {
                encoded.add_tag_sint(key, double as i64);
            } else {
                encoded.add_tag_uint(key, double as u64);
            }
        } else {
            encoded.add_tag_double(key, double);
        }
    }
}

/// Gzip compressor using `flate2`.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipCompressor {
    /// Compressor using an explicit level from 0 (store) to 9 (best).
    #[must_use]
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder.write_all(bytes)?;
        encoder.finish()
    }
}

/// Encode, compress and size-check one tile.
///
/// Cloning is cheap; workers each hold a clone.
#[derive(Clone)]
pub struct TilePipeline {
    encoder: Arc<dyn TileEncoder>,
    compressor: Arc<dyn Compressor>,
    max_bytes: usize,
}

impl std::fmt::Debug for TilePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TilePipeline")
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl TilePipeline {
    /// MVT encoding at `extent` followed by gzip, limited to
    /// [`MAX_TILE_BYTES`].
    #[must_use]
    pub fn mvt_gzip(extent: u32) -> Self {
        Self::new(
            Arc::new(MvtEncoder::new(extent)),
            Arc::new(GzipCompressor::default()),
        )
    }

    /// Pipeline over custom encoder and compressor implementations.
    #[must_use]
    pub fn new(encoder: Arc<dyn TileEncoder>, compressor: Arc<dyn Compressor>) -> Self {
        Self {
            encoder,
            compressor,
            max_bytes: MAX_TILE_BYTES,
        }
    }

    /// Override the compressed size limit.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Produce the persisted payload for `tile`.
    ///
    /// # Errors
    /// Returns [`TileError::TooLarge`] when the compressed payload exceeds the
    /// limit, or the encoder/compressor failure otherwise.
    pub fn process(&self, tile: &Tile) -> Result<Vec<u8>, TileError> {
        let coord = tile.coord;
        let encoded = self
            .encoder
            .encode(tile)
            .map_err(|source| TileError::Encode { coord, source })?;
        let compressed = self
            .compressor
            .compress(&encoded)
            .map_err(|source| TileError::Compress { coord, source })?;
        if compressed.len() > self.max_bytes {
            return Err(TileError::TooLarge {
                coord,
                size: compressed.len(),
                limit: self.max_bytes,
            });
        }
        Ok(compressed)
    }
}
