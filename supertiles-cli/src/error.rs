//! Error types emitted by the supertiles CLI.
//!
//! Keep this error type reasonably small, as every CLI helper returns
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use supertiles_cluster::{ClusterOptionsError, LoadFeaturesError};
use supertiles_core::{ConfigError, GenerateError, TileStoreError};
use thiserror::Error;

/// Errors emitted by the supertiles CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Long flag name of the option.
        field: &'static str,
        /// Environment variable that can supply it.
        env: &'static str,
    },
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        /// Option naming the path.
        field: &'static str,
        /// Missing path.
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        /// Option naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        /// Option naming the path.
        field: &'static str,
        /// Offending path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A `--filter` expression could not be parsed.
    #[error("invalid --{field} expression {expression:?}; expected KEY, KEY=VALUE or KEY!=VALUE")]
    InvalidFilter {
        /// Option naming the expression.
        field: &'static str,
        /// Rejected expression.
        expression: String,
    },
    /// The tileset configuration was rejected.
    #[error("invalid tileset configuration: {0}")]
    Tileset(#[from] ConfigError),
    /// The clustering options were rejected.
    #[error("invalid clustering options: {0}")]
    ClusterOptions(#[from] ClusterOptionsError),
    /// Loading the GeoJSON input failed.
    #[error(transparent)]
    LoadFeatures(#[from] LoadFeaturesError),
    /// Preparing the MBTiles container failed.
    #[error(transparent)]
    Store(#[from] TileStoreError),
    /// Tile generation failed.
    #[error(transparent)]
    Generate(#[from] GenerateError),
    /// The async runtime could not be started.
    #[error("failed to start the tile generation runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// A global logger was already installed.
    #[error("failed to initialise logging: {0}")]
    Logging(#[from] log::SetLoggerError),
}
