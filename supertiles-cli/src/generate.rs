//! Generate command implementation for the supertiles CLI.

use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueEnum};
use log::{Level, log};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use supertiles_cluster::{ClusterOptions, PointClusterIndex, SumProperties, load_points};
use supertiles_core::{
    GenerationReport, PropertyFilter, PropertyPredicate, SqliteTileStore, TileGenerator,
    TileScheme, TilesetConfig,
};

use crate::{ARG_FILTER, ARG_INPUT, ARG_OUTPUT, CliError, ENV_INPUT, ENV_OUTPUT};

/// Row numbering written to the `tiles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SchemeArg {
    /// Rows counted from the south (MBTiles).
    Tms,
    /// Rows counted from the north.
    Xyz,
}

impl From<SchemeArg> for TileScheme {
    fn from(value: SchemeArg) -> Self {
        match value {
            SchemeArg::Tms => Self::Tms,
            SchemeArg::Xyz => Self::Xyz,
        }
    }
}

/// CLI arguments for the `generate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Cluster the points of a GeoJSON FeatureCollection at every \
                 zoom level, encode each non-empty tile as a gzipped Mapbox \
                 Vector Tile and package the tiles with their metadata in an \
                 MBTiles file. Options can come from CLI flags, configuration \
                 files, or environment variables.",
    about = "Generate an MBTiles tileset from GeoJSON points"
)]
#[ortho_config(prefix = "SUPERTILES")]
pub(crate) struct GenerateArgs {
    /// GeoJSON FeatureCollection of points.
    #[arg(long = ARG_INPUT, short = 'i', value_name = "path")]
    #[serde(default)]
    pub(crate) input: Option<Utf8PathBuf>,
    /// MBTiles file to create; an existing file is replaced.
    #[arg(long = ARG_OUTPUT, short = 'o', value_name = "path")]
    #[serde(default)]
    pub(crate) output: Option<Utf8PathBuf>,
    /// Lowest zoom level to generate (default 0).
    #[arg(long, value_name = "zoom")]
    #[serde(default)]
    pub(crate) min_zoom: Option<u8>,
    /// Highest clustered zoom level (default 8).
    #[arg(long, value_name = "zoom")]
    #[serde(default)]
    pub(crate) max_zoom: Option<u8>,
    /// Cluster radius in pixels at tile extent (default 40).
    #[arg(long, value_name = "pixels")]
    #[serde(default)]
    pub(crate) radius: Option<f64>,
    /// Tile extent (default 512).
    #[arg(long, value_name = "units")]
    #[serde(default)]
    pub(crate) extent: Option<u32>,
    /// R-tree node size hint (default 64).
    #[arg(long, value_name = "count")]
    #[serde(default)]
    pub(crate) node_size: Option<usize>,
    /// Minimum number of points forming a cluster (default 2).
    #[arg(long, value_name = "count")]
    #[serde(default)]
    pub(crate) min_points: Option<u64>,
    /// Also write the unclustered level at max zoom + 1 (default true).
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) include_unclustered: Option<bool>,
    /// Keep features matching KEY, KEY=VALUE or KEY!=VALUE; repeat to AND.
    #[arg(long = ARG_FILTER, value_name = "expr")]
    #[serde(default)]
    pub(crate) filter: Vec<String>,
    /// Sum a numeric property into cluster properties; repeatable.
    #[arg(long, value_name = "field")]
    #[serde(default)]
    pub(crate) sum: Vec<String>,
    /// Attribution HTML stored in the metadata.
    #[arg(long, value_name = "html")]
    #[serde(default)]
    pub(crate) attribution: Option<String>,
    /// Tileset description stored in the metadata.
    #[arg(long, value_name = "text")]
    #[serde(default)]
    pub(crate) description: Option<String>,
    /// Metadata bounds (default "-180.0,-85,180,85").
    #[arg(long, value_name = "w,s,e,n", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) bounds: Option<String>,
    /// Metadata centre as longitude,latitude,zoom (default "0,0,0").
    #[arg(long, value_name = "lon,lat,zoom", allow_hyphen_values = true)]
    #[serde(default)]
    pub(crate) center: Option<String>,
    /// Vector tile specification version (only 2 is supported).
    #[arg(long, value_name = "version")]
    #[serde(default)]
    pub(crate) tile_spec_version: Option<u32>,
    /// Record `clusterExpansionZoom` on every cluster (default false).
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) cluster_expansion_zoom: Option<bool>,
    /// Tile row numbering (default tms).
    #[arg(long, value_enum, value_name = "scheme")]
    #[serde(default)]
    pub(crate) scheme: Option<SchemeArg>,
    /// Log timings for index construction and tile generation.
    #[arg(long, value_name = "bool", num_args = 0..=1, default_missing_value = "true")]
    #[serde(default)]
    pub(crate) log_performance: Option<bool>,
}

impl GenerateArgs {
    pub(crate) fn into_config(self) -> Result<GenerateConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        GenerateConfig::try_from(merged)
    }
}

/// Resolved `generate` command configuration.
#[derive(Debug, Clone)]
pub(crate) struct GenerateConfig {
    /// GeoJSON input.
    pub(crate) input: Utf8PathBuf,
    /// MBTiles output.
    pub(crate) output: Utf8PathBuf,
    pub(crate) tileset: TilesetConfig,
    pub(crate) cluster: ClusterOptions,
    pub(crate) filter: PropertyFilter,
    pub(crate) aggregation: SumProperties,
    pub(crate) log_performance: bool,
}

impl GenerateConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.input, ARG_INPUT)
    }
}

fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    match supertiles_fs::file_is_file(path) {
        Ok(true) => Ok(()),
        Ok(false) if path.exists() => Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        }),
        Ok(false) => Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::InspectSourcePath {
            field,
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_filter(expressions: &[String]) -> Result<PropertyFilter, CliError> {
    expressions
        .iter()
        .map(|expression| {
            PropertyPredicate::parse(expression).ok_or_else(|| CliError::InvalidFilter {
                field: ARG_FILTER,
                expression: expression.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(PropertyFilter::new)
}

impl TryFrom<GenerateArgs> for GenerateConfig {
    type Error = CliError;

    fn try_from(args: GenerateArgs) -> Result<Self, Self::Error> {
        let input = args.input.ok_or(CliError::MissingArgument {
            field: ARG_INPUT,
            env: ENV_INPUT,
        })?;
        let output = args.output.ok_or(CliError::MissingArgument {
            field: ARG_OUTPUT,
            env: ENV_OUTPUT,
        })?;
        let filter = parse_filter(&args.filter)?;

        let defaults = TilesetConfig::default();
        let tileset = TilesetConfig {
            name: output.as_str().to_owned(),
            min_zoom: args.min_zoom.unwrap_or(defaults.min_zoom),
            max_zoom: args.max_zoom.unwrap_or(defaults.max_zoom),
            include_unclustered: args.include_unclustered.unwrap_or(true),
            extent: args.extent.unwrap_or(defaults.extent),
            tile_spec_version: args.tile_spec_version.unwrap_or(defaults.tile_spec_version),
            bounds: args.bounds.unwrap_or(defaults.bounds),
            center: args.center.unwrap_or(defaults.center),
            attribution: args.attribution,
            description: args.description,
            store_cluster_expansion_zoom: args
                .cluster_expansion_zoom
                .unwrap_or(defaults.store_cluster_expansion_zoom),
            scheme: args.scheme.map_or(defaults.scheme, TileScheme::from),
        };
        tileset.validate()?;

        let cluster_defaults = ClusterOptions::default();
        let cluster = ClusterOptions {
            min_zoom: tileset.min_zoom,
            max_zoom: tileset.max_zoom,
            radius: args.radius.unwrap_or(cluster_defaults.radius),
            extent: tileset.extent,
            node_size: args.node_size.unwrap_or(cluster_defaults.node_size),
            min_points: args.min_points.unwrap_or(cluster_defaults.min_points),
        };
        cluster.validate()?;

        Ok(Self {
            input,
            output,
            tileset,
            cluster,
            filter,
            aggregation: SumProperties::new(args.sum),
            log_performance: args.log_performance.unwrap_or(false),
        })
    }
}

/// Build the cluster index and write the tileset described by `config`.
pub(crate) fn execute_generate(config: &GenerateConfig) -> Result<GenerationReport, CliError> {
    config.validate_sources()?;
    let timing = if config.log_performance {
        Level::Info
    } else {
        Level::Debug
    };

    let started = Instant::now();
    let points = load_points(&config.input)?;
    let point_count = points.len();
    let index = PointClusterIndex::load_with(points, &config.cluster, &config.aggregation)?;
    log!(
        timing,
        "indexed {point_count} points in {}",
        format_elapsed(started.elapsed())
    );

    let started = Instant::now();
    let store = SqliteTileStore::create(&config.output)?;
    store.create_unique_tile_index()?;
    let mut generator = TileGenerator::new(&config.tileset, &index);
    if !config.filter.is_empty() {
        generator = generator.with_filter(&config.filter);
    }
    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    let report = runtime.block_on(generator.generate(store))?;
    log!(
        timing,
        "wrote {} tiles to {} in {}",
        report.tiles_written,
        config.output,
        format_elapsed(started.elapsed())
    );
    Ok(report)
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{}ms", elapsed.as_millis())
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<GenerateConfig, CliError> {
    let merged = GenerateArgs::merge_from_layers(layers).map_err(CliError::from)?;
    GenerateConfig::try_from(merged)
}
