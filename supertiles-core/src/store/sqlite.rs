//! MBTiles container writer backed by SQLite.

use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use rusqlite::{Connection, params};

use super::{TileRow, TileStore, TileStoreError};
use crate::MetadataRecord;

const SCHEMA: &str = "\
CREATE TABLE metadata (name text, value text);
CREATE TABLE tiles (zoom_level integer, tile_column integer, tile_row integer, tile_data blob);";

const INSERT_TILE: &str =
    "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)";

const INSERT_METADATA: &str = "INSERT INTO metadata (name, value) VALUES (?1, ?2)";

/// Writes a fresh MBTiles file.
///
/// All rows go to a staging database next to the output inside one
/// transaction. [`TileStore::finalize`] commits and renames the staging file
/// over the output; dropping the store first discards the staging file, so a
/// failed run never leaves a container behind.
#[derive(Debug)]
pub struct SqliteTileStore {
    path: Utf8PathBuf,
    staging: Utf8PathBuf,
    connection: Option<Mutex<Connection>>,
    finalized: bool,
}

impl SqliteTileStore {
    /// Remove any file at `path` and start a new container for it.
    ///
    /// # Errors
    /// Returns [`TileStoreError`] when the old file cannot be removed, the
    /// directory cannot be created or the schema cannot be applied.
    pub fn create(path: impl AsRef<Utf8Path>) -> Result<Self, TileStoreError> {
        let path = path.as_ref().to_path_buf();
        remove_existing(&path)?;
        supertiles_fs::ensure_parent_dir(&path).map_err(|source| {
            TileStoreError::CreateDirectory {
                path: path.clone(),
                source,
            }
        })?;
        let staging = supertiles_fs::staging_path(&path);
        remove_existing(&staging)?;

        let connection = Connection::open(staging.as_std_path()).map_err(|source| {
            TileStoreError::Open {
                path: staging.clone(),
                source,
            }
        })?;
        let store = Self {
            path,
            staging,
            connection: Some(Mutex::new(connection)),
            finalized: false,
        };
        {
            let connection = store.lock()?;
            connection
                .execute_batch("BEGIN;")
                .map_err(|source| TileStoreError::BeginTransaction { source })?;
            connection
                .execute_batch(SCHEMA)
                .map_err(|source| TileStoreError::CreateSchema { source })?;
        }
        debug!("staging tile container at {}", store.staging);
        Ok(store)
    }

    /// Final location of the container.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Add the conventional unique `tile_index` over tile coordinates.
    ///
    /// # Errors
    /// Returns [`TileStoreError::CreateSchema`] when the index cannot be
    /// created, including when duplicate rows were already written.
    pub fn create_unique_tile_index(&self) -> Result<(), TileStoreError> {
        self.lock()?
            .execute_batch(
                "CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row);",
            )
            .map_err(|source| TileStoreError::CreateSchema { source })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TileStoreError> {
        self.connection
            .as_ref()
            .ok_or(TileStoreError::Poisoned)?
            .lock()
            .map_err(|_| TileStoreError::Poisoned)
    }
}

fn remove_existing(path: &Utf8Path) -> Result<(), TileStoreError> {
    let removed = supertiles_fs::remove_file_if_exists(path).map_err(|source| {
        TileStoreError::RemoveExisting {
            path: path.to_path_buf(),
            source,
        }
    })?;
    if removed {
        debug!("removed existing file at {path}");
    }
    Ok(())
}

impl TileStore for SqliteTileStore {
    fn insert_tile(&self, row: &TileRow) -> Result<(), TileStoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare_cached(INSERT_TILE)
            .map_err(|source| TileStoreError::Insert {
                table: "tiles",
                source,
            })?;
        statement
            .execute(params![
                row.zoom_level,
                row.tile_column,
                row.tile_row,
                row.tile_data
            ])
            .map_err(|source| TileStoreError::Insert {
                table: "tiles",
                source,
            })?;
        Ok(())
    }

    fn write_metadata(&self, record: &MetadataRecord) -> Result<(), TileStoreError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare_cached(INSERT_METADATA)
            .map_err(|source| TileStoreError::Insert {
                table: "metadata",
                source,
            })?;
        for (name, value) in record.iter() {
            statement
                .execute(params![name, value])
                .map_err(|source| TileStoreError::Insert {
                    table: "metadata",
                    source,
                })?;
        }
        Ok(())
    }

    fn finalize(mut self) -> Result<(), TileStoreError> {
        let connection = self
            .connection
            .take()
            .ok_or(TileStoreError::Poisoned)?
            .into_inner()
            .map_err(|_| TileStoreError::Poisoned)?;
        connection
            .execute_batch("COMMIT;")
            .map_err(|source| TileStoreError::Commit { source })?;
        connection
            .close()
            .map_err(|(_, source)| TileStoreError::Commit { source })?;
        supertiles_fs::persist(&self.staging, &self.path).map_err(|source| {
            TileStoreError::Persist {
                path: self.path.clone(),
                source,
            }
        })?;
        self.finalized = true;
        debug!("tile container written to {}", self.path);
        Ok(())
    }
}

impl Drop for SqliteTileStore {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        drop(self.connection.take());
        if let Err(err) = supertiles_fs::remove_file_if_exists(&self.staging) {
            warn!("failed to discard staging file {}: {err}", self.staging);
        }
    }
}
