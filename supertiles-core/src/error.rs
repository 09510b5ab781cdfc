//! Errors surfaced by a generation run.

use thiserror::Error;

use crate::{AnnotateError, ConfigError, TileError, TileStoreError};

/// Failure of [`TileGenerator::generate`](crate::TileGenerator::generate).
///
/// Any error ends the run; outstanding tile work is cancelled and the
/// container is discarded.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The run configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Encoding, compressing or size-checking a tile failed.
    #[error(transparent)]
    Tile(#[from] TileError),
    /// The tile container rejected a write.
    #[error(transparent)]
    Store(#[from] TileStoreError),
    /// A cluster could not be annotated with its expansion zoom.
    #[error(transparent)]
    Annotate(#[from] AnnotateError),
    /// A tile worker panicked or was cancelled.
    #[error("tile worker failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// A tile worker still held the store after every task completed.
    #[error("tile store is still shared after all tile workers finished")]
    StoreInUse,
}
