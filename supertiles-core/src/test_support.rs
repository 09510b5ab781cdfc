//! In-memory doubles for [`ClusterIndex`] and [`TileStore`] used by unit and
//! behaviour tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use geo::Coord;
use serde_json::Value;

use crate::{
    ClusterIndex, Feature, MetadataRecord, Properties, Tile, TileCoord, TileRow, TileStore,
    TileStoreError,
};

/// Build a feature at tile-local `(x, y)` from a JSON object literal.
///
/// Non-object values produce a feature without properties.
#[must_use]
pub fn point(x: i32, y: i32, properties: Value) -> Feature {
    let properties = match properties {
        Value::Object(map) => map,
        _ => Properties::new(),
    };
    Feature::new(Coord { x, y }, properties)
}

/// `ClusterIndex` answering from preloaded tiles.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    tiles: HashMap<TileCoord, Vec<Feature>>,
    expansion_zooms: HashMap<u64, u8>,
}

impl MemoryIndex {
    /// Register the features returned for `coord`.
    #[must_use]
    pub fn with_tile(mut self, coord: TileCoord, features: Vec<Feature>) -> Self {
        self.tiles.insert(coord, features);
        self
    }

    /// Register the expansion zoom reported for `cluster_id`.
    #[must_use]
    pub fn with_expansion_zoom(mut self, cluster_id: u64, zoom: u8) -> Self {
        self.expansion_zooms.insert(cluster_id, zoom);
        self
    }
}

impl ClusterIndex for MemoryIndex {
    fn tile(&self, zoom: u8, x: u32, y: u32) -> Option<Tile> {
        let coord = TileCoord::new(zoom, x, y);
        self.tiles
            .get(&coord)
            .map(|features| Tile::new(coord, features.clone()))
    }

    fn cluster_expansion_zoom(&self, cluster_id: u64) -> Option<u8> {
        self.expansion_zooms.get(&cluster_id).copied()
    }
}

#[derive(Debug, Default)]
struct Recorded {
    rows: Vec<TileRow>,
    metadata: MetadataRecord,
    events: Vec<String>,
    finalized: bool,
    tile_limit: Option<usize>,
    reject_metadata: bool,
}

/// `TileStore` keeping rows in memory.
///
/// Clones share the same contents, so a test can hand one clone to the
/// generator and inspect another afterwards. Writes can be made to fail with
/// [`MemoryTileStore::failing_after`] and
/// [`MemoryTileStore::rejecting_metadata`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTileStore {
    recorded: Arc<Mutex<Recorded>>,
}

impl MemoryTileStore {
    fn with_recorded<T>(&self, read: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut recorded = self
            .recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        read(&mut recorded)
    }

    /// Store that accepts `accepted` tiles and rejects every later insert.
    #[must_use]
    pub fn failing_after(accepted: usize) -> Self {
        let store = Self::default();
        store.with_recorded(|recorded| recorded.tile_limit = Some(accepted));
        store
    }

    /// Store that accepts tiles but rejects the metadata write.
    #[must_use]
    pub fn rejecting_metadata() -> Self {
        let store = Self::default();
        store.with_recorded(|recorded| recorded.reject_metadata = true);
        store
    }

    /// Rows inserted so far, in arrival order.
    #[must_use]
    pub fn rows(&self) -> Vec<TileRow> {
        self.with_recorded(|recorded| recorded.rows.clone())
    }

    /// Metadata written so far.
    #[must_use]
    pub fn metadata(&self) -> MetadataRecord {
        self.with_recorded(|recorded| recorded.metadata.clone())
    }

    /// Calls received: `tile z/x/y`, `metadata` and `finalize`.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.with_recorded(|recorded| recorded.events.clone())
    }

    /// Whether `finalize` was called.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.with_recorded(|recorded| recorded.finalized)
    }
}

impl TileStore for MemoryTileStore {
    fn insert_tile(&self, row: &TileRow) -> Result<(), TileStoreError> {
        self.with_recorded(|recorded| {
            if recorded
                .tile_limit
                .is_some_and(|limit| recorded.rows.len() >= limit)
            {
                return Err(TileStoreError::Poisoned);
            }
            recorded.events.push(format!(
                "tile {}/{}/{}",
                row.zoom_level, row.tile_column, row.tile_row
            ));
            recorded.rows.push(row.clone());
            Ok(())
        })
    }

    fn write_metadata(&self, record: &MetadataRecord) -> Result<(), TileStoreError> {
        self.with_recorded(|recorded| {
            if recorded.reject_metadata {
                return Err(TileStoreError::Poisoned);
            }
            recorded.events.push("metadata".to_owned());
            for (name, value) in record.iter() {
                recorded.metadata.push(name, value);
            }
            Ok(())
        })
    }

    fn finalize(self) -> Result<(), TileStoreError> {
        self.with_recorded(|recorded| {
            recorded.events.push("finalize".to_owned());
            recorded.finalized = true;
        });
        Ok(())
    }
}
