//! Persistence of encoded tiles and metadata.
//!
//! The [`TileStore`] trait is the write-only sink the generator feeds. Rows
//! arrive from several worker threads at once, so methods take `&self` and
//! implementations serialise writes internally.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::{MetadataRecord, TileCoord, TileScheme};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteTileStore;

/// One row of the `tiles` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRow {
    /// Zoom level.
    pub zoom_level: u8,
    /// Column index.
    pub tile_column: u32,
    /// Row index in the store's row convention.
    pub tile_row: u64,
    /// Compressed vector tile payload.
    pub tile_data: Vec<u8>,
}

impl TileRow {
    /// Build the row for `coord`, converting its row to `scheme`.
    ///
    /// ```
    /// use supertiles_core::{TileCoord, TileRow, TileScheme};
    ///
    /// let coord = TileCoord::new(2, 1, 0);
    /// assert_eq!(TileRow::new(coord, TileScheme::Tms, Vec::new()).tile_row, 3);
    /// assert_eq!(TileRow::new(coord, TileScheme::Xyz, Vec::new()).tile_row, 0);
    /// ```
    #[must_use]
    pub fn new(coord: TileCoord, scheme: TileScheme, tile_data: Vec<u8>) -> Self {
        let tile_row = match scheme {
            TileScheme::Tms => coord.flipped_y(),
            TileScheme::Xyz => u64::from(coord.y),
        };
        Self {
            zoom_level: coord.zoom,
            tile_column: coord.x,
            tile_row,
            tile_data,
        }
    }
}

/// Errors raised while writing the tile container.
#[derive(Debug, Error)]
pub enum TileStoreError {
    /// A previous artefact at the output path could not be removed.
    #[error("failed to remove existing file at {path}: {source}")]
    RemoveExisting {
        /// Output path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The output directory could not be created.
    #[error("failed to create directory for {path}: {source}")]
    CreateDirectory {
        /// Output path whose parent was being created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the database failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to open SQLite database at {path}: {source}")]
    Open {
        /// Database location.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Beginning the write transaction failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to begin tile container transaction: {source}")]
    BeginTransaction {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating the container tables failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to create MBTiles schema: {source}")]
    CreateSchema {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Inserting a row failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to insert into {table}: {source}")]
    Insert {
        /// Table receiving the row.
        table: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Committing the transaction failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to commit tile container: {source}")]
    Commit {
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Moving the finished container into place failed.
    #[error("failed to move finished container to {path}: {source}")]
    Persist {
        /// Final output path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A writer thread panicked while holding the connection.
    #[error("tile store lock poisoned")]
    Poisoned,
}

/// Write-only sink for tile rows and metadata.
///
/// # Examples
///
/// ```rust
/// use std::sync::Mutex;
/// use supertiles_core::{MetadataRecord, TileRow, TileStore, TileStoreError};
///
/// #[derive(Default)]
/// struct CountingStore {
///     rows: Mutex<usize>,
/// }
///
/// impl TileStore for CountingStore {
///     fn insert_tile(&self, _row: &TileRow) -> Result<(), TileStoreError> {
///         *self.rows.lock().map_err(|_| TileStoreError::Poisoned)? += 1;
///         Ok(())
///     }
///
///     fn write_metadata(&self, _record: &MetadataRecord) -> Result<(), TileStoreError> {
///         Ok(())
///     }
/// }
///
/// let store = CountingStore::default();
/// let row = TileRow::new(supertiles_core::TileCoord::new(0, 0, 0), Default::default(), vec![1]);
/// store.insert_tile(&row).unwrap();
/// assert_eq!(*store.rows.lock().unwrap(), 1);
/// ```
pub trait TileStore: Send + Sync {
    /// Persist one tile row.
    ///
    /// # Errors
    /// Returns [`TileStoreError`] when the backend rejects the row.
    fn insert_tile(&self, row: &TileRow) -> Result<(), TileStoreError>;

    /// Persist every metadata entry.
    ///
    /// # Errors
    /// Returns [`TileStoreError`] when the backend rejects an entry.
    fn write_metadata(&self, record: &MetadataRecord) -> Result<(), TileStoreError>;

    /// Make all writes durable. Called once, after every row and the
    /// metadata have been written.
    ///
    /// # Errors
    /// Returns [`TileStoreError`] when the backend cannot commit.
    fn finalize(self) -> Result<(), TileStoreError>
    where
        Self: Sized,
    {
        Ok(())
    }
}
