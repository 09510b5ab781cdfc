//! Zoom traversal and the concurrent tile generator.
//!
//! The generator walks every grid cell from the minimum to the effective
//! maximum zoom. Extraction, annotation and schema observation happen on the
//! calling task in traversal order; encoding, compression and the row insert
//! run as blocking tasks on a [`JoinSet`]. Metadata is only written after
//! every tile task has completed.

use std::{num::NonZeroUsize, sync::Arc, thread};

use log::{debug, info};
use tokio::task::{JoinError, JoinSet};

use crate::{
    ClusterExpansionAnnotator, ClusterIndex, FeatureFilter, FieldSchema, FieldSchemaCollector,
    GenerateError, MAX_SUPPORTED_ZOOM, MetadataAssembler, MetadataRecord, Tile, TileCoord,
    TileExtractor, TilePipeline, TileRow, TileScheme, TileStore, TilesetConfig,
};

/// Every tile coordinate between two zoom levels, inclusive.
///
/// Coordinates are yielded zoom-major, then by column, then by row, all
/// ascending. Zooms above [`MAX_SUPPORTED_ZOOM`] are not visited.
///
/// ```
/// use supertiles_core::{TileCoord, TileGrid};
///
/// let coords: Vec<_> = TileGrid::new(0, 1).collect();
/// assert_eq!(
///     coords,
///     [
///         TileCoord::new(0, 0, 0),
///         TileCoord::new(1, 0, 0),
///         TileCoord::new(1, 0, 1),
///         TileCoord::new(1, 1, 0),
///         TileCoord::new(1, 1, 1),
///     ]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct TileGrid {
    next: TileCoord,
    max_zoom: u8,
}

impl TileGrid {
    /// Grid spanning `min_zoom..=max_zoom`.
    #[must_use]
    pub fn new(min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            next: TileCoord::new(min_zoom, 0, 0),
            max_zoom: max_zoom.min(MAX_SUPPORTED_ZOOM),
        }
    }
}

impl Iterator for TileGrid {
    type Item = TileCoord;

    fn next(&mut self) -> Option<TileCoord> {
        let current = self.next;
        if current.zoom > self.max_zoom {
            return None;
        }
        let dimension = 1_u32 << current.zoom;
        self.next = if current.y + 1 < dimension {
            TileCoord::new(current.zoom, current.x, current.y + 1)
        } else if current.x + 1 < dimension {
            TileCoord::new(current.zoom, current.x + 1, 0)
        } else {
            TileCoord::new(current.zoom + 1, 0, 0)
        };
        Some(current)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Grid cells visited.
    pub tiles_visited: u64,
    /// Tiles persisted.
    pub tiles_written: u64,
    /// Total compressed bytes persisted.
    pub bytes_written: u64,
    /// Schema inferred across every persisted feature.
    pub schema: FieldSchema,
    /// Metadata written to the container.
    pub metadata: MetadataRecord,
}

/// Drives a full generation run against a [`ClusterIndex`] and a
/// [`TileStore`].
pub struct TileGenerator<'a, I: ?Sized> {
    config: &'a TilesetConfig,
    index: &'a I,
    filter: Option<&'a dyn FeatureFilter>,
    pipeline: TilePipeline,
    max_in_flight: usize,
}

impl<'a, I> TileGenerator<'a, I>
where
    I: ClusterIndex + ?Sized,
{
    /// Generator using MVT encoding and gzip at the configured extent.
    #[must_use]
    pub fn new(config: &'a TilesetConfig, index: &'a I) -> Self {
        let workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self {
            config,
            index,
            filter: None,
            pipeline: TilePipeline::mvt_gzip(config.extent),
            max_in_flight: workers * 4,
        }
    }

    /// Drop features rejected by `filter` before encoding.
    #[must_use]
    pub fn with_filter(mut self, filter: &'a dyn FeatureFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Replace the encode/compress pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: TilePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Cap on tile tasks queued at once; traversal waits for a slot.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Generate every tile into `store`, then write metadata and finalise it.
    ///
    /// # Errors
    /// Returns the first [`GenerateError`] raised. Remaining tile tasks are
    /// cancelled and awaited, and `store` is dropped without being finalised.
    pub async fn generate<S>(&self, store: S) -> Result<GenerationReport, GenerateError>
    where
        S: TileStore + 'static,
    {
        self.config.validate()?;
        let store = Arc::new(store);
        let mut tasks = JoinSet::new();
        let mut report = GenerationReport::default();

        let outcome = self.traverse(&store, &mut tasks, &mut report).await;
        let schema = match outcome {
            Ok(schema) => schema,
            Err(err) => {
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                return Err(err);
            }
        };

        let metadata = MetadataAssembler::new(self.config).assemble(&schema);
        store.write_metadata(&metadata)?;
        Arc::into_inner(store)
            .ok_or(GenerateError::StoreInUse)?
            .finalize()?;

        info!(
            "generated {} tiles ({} bytes) from {} grid cells, zoom {}..={}",
            report.tiles_written,
            report.bytes_written,
            report.tiles_visited,
            self.config.min_zoom,
            self.config.effective_max_zoom()
        );
        report.schema = schema;
        report.metadata = metadata;
        Ok(report)
    }

    async fn traverse<S>(
        &self,
        store: &Arc<S>,
        tasks: &mut JoinSet<Result<u64, GenerateError>>,
        report: &mut GenerationReport,
    ) -> Result<FieldSchema, GenerateError>
    where
        S: TileStore + 'static,
    {
        let extractor = TileExtractor::new(self.index, self.filter);
        let annotator = self
            .config
            .store_cluster_expansion_zoom
            .then(|| ClusterExpansionAnnotator::new(self.index));
        let schema = FieldSchemaCollector::new();

        for coord in TileGrid::new(self.config.min_zoom, self.config.effective_max_zoom()) {
            report.tiles_visited += 1;
            let Some(mut tile) = extractor.extract(coord) else {
                continue;
            };
            if let Some(annotator) = &annotator {
                annotator.annotate(&mut tile)?;
            }
            schema.observe_all(&tile.features);

            while tasks.len() >= self.max_in_flight {
                if let Some(joined) = tasks.join_next().await {
                    settle(joined, report)?;
                }
            }
            let pipeline = self.pipeline.clone();
            let store = Arc::clone(store);
            let scheme = self.config.scheme;
            tasks.spawn_blocking(move || write_tile(&pipeline, store.as_ref(), scheme, &tile));

            while let Some(joined) = tasks.try_join_next() {
                settle(joined, report)?;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            settle(joined, report)?;
        }
        Ok(schema.finalize())
    }
}

fn settle(
    joined: Result<Result<u64, GenerateError>, JoinError>,
    report: &mut GenerationReport,
) -> Result<(), GenerateError> {
    let size = joined??;
    report.tiles_written += 1;
    report.bytes_written += size;
    Ok(())
}

fn write_tile<S>(
    pipeline: &TilePipeline,
    store: &S,
    scheme: TileScheme,
    tile: &Tile,
) -> Result<u64, GenerateError>
where
    S: TileStore + ?Sized,
{
    let payload = pipeline.process(tile)?;
    let size = payload.len() as u64;
    store.insert_tile(&TileRow::new(tile.coord, scheme, payload))?;
    debug!(
        "tile {} written: {} features, {size} bytes",
        tile.coord,
        tile.features.len()
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryIndex, MemoryTileStore, point};
    use crate::{CLUSTER_EXPANSION_ZOOM_PROPERTY, PropertyType, TileError, TileStoreError};
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[rstest]
    #[case(0, 0, 1)]
    #[case(0, 2, 21)]
    #[case(2, 2, 16)]
    #[case(3, 2, 0)]
    fn grid_visits_every_cell(#[case] min: u8, #[case] max: u8, #[case] expected: usize) {
        assert_eq!(TileGrid::new(min, max).count(), expected);
    }

    #[rstest]
    fn grid_ignores_unsupported_zooms() {
        assert_eq!(TileGrid::new(MAX_SUPPORTED_ZOOM + 1, u8::MAX).next(), None);
        assert_eq!(
            TileGrid::new(MAX_SUPPORTED_ZOOM, u8::MAX).next(),
            Some(TileCoord::new(MAX_SUPPORTED_ZOOM, 0, 0))
        );
    }

    #[fixture]
    fn index() -> MemoryIndex {
        MemoryIndex::default()
            .with_tile(
                TileCoord::new(0, 0, 0),
                vec![point(
                    100,
                    100,
                    json!({"cluster": true, "cluster_id": 37, "point_count": 2}),
                )],
            )
            .with_tile(
                TileCoord::new(1, 1, 0),
                vec![
                    point(10, 10, json!({"name": "Kyiv", "rank": 1})),
                    point(20, 20, json!({"name": "Lviv", "rank": 2})),
                ],
            )
            .with_tile(TileCoord::new(1, 0, 1), Vec::new())
            .with_expansion_zoom(37, 1)
    }

    fn config() -> TilesetConfig {
        TilesetConfig::new("test").with_max_zoom(1)
    }

    #[rstest]
    #[tokio::test]
    async fn writes_only_non_empty_tiles(index: MemoryIndex) {
        let store = MemoryTileStore::default();
        let config = config();
        let report = TileGenerator::new(&config, &index)
            .generate(store.clone())
            .await
            .expect("generate");

        assert_eq!(report.tiles_visited, 5);
        assert_eq!(report.tiles_written, 2);
        assert!(store.is_finalized());
        let mut rows: Vec<_> = store
            .rows()
            .into_iter()
            .map(|row| (row.zoom_level, row.tile_column, row.tile_row))
            .collect();
        rows.sort_unstable();
        assert_eq!(rows, [(0, 0, 0), (1, 1, 1)]);
        assert_eq!(
            report.bytes_written,
            store
                .rows()
                .iter()
                .map(|row| row.tile_data.len() as u64)
                .sum::<u64>()
        );
    }

    #[rstest]
    #[tokio::test]
    async fn filter_prunes_tiles_and_schema(index: MemoryIndex) {
        let store = MemoryTileStore::default();
        let config = config();
        let only_named = |props: &crate::Properties| props.contains_key("name");
        let report = TileGenerator::new(&config, &index)
            .with_filter(&only_named)
            .generate(store.clone())
            .await
            .expect("generate");

        assert_eq!(report.tiles_written, 1);
        assert_eq!(report.schema.get("cluster"), None);
        assert_eq!(report.schema.get("name"), Some(PropertyType::String));
    }

    #[rstest]
    #[tokio::test]
    async fn expansion_zoom_joins_the_schema(index: MemoryIndex) {
        let store = MemoryTileStore::default();
        let config = config().with_cluster_expansion_zoom(true);
        let report = TileGenerator::new(&config, &index)
            .generate(store.clone())
            .await
            .expect("generate");

        assert_eq!(
            report.schema.get(CLUSTER_EXPANSION_ZOOM_PROPERTY),
            Some(PropertyType::Number)
        );
        assert!(
            store
                .metadata()
                .get("json")
                .is_some_and(|json| json.contains("clusterExpansionZoom"))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn metadata_is_written_after_tiles(index: MemoryIndex) {
        let store = MemoryTileStore::default();
        let config = config();
        TileGenerator::new(&config, &index)
            .with_max_in_flight(1)
            .generate(store.clone())
            .await
            .expect("generate");

        let events = store.events();
        assert_eq!(events.last().map(String::as_str), Some("finalize"));
        let metadata_at = events
            .iter()
            .position(|event| event == "metadata")
            .expect("metadata written");
        assert_eq!(metadata_at, 2, "both tiles precede metadata: {events:?}");
    }

    #[rstest]
    #[tokio::test]
    async fn oversize_tile_aborts_without_finalizing(index: MemoryIndex) {
        let store = MemoryTileStore::default();
        let config = config();
        let err = TileGenerator::new(&config, &index)
            .with_pipeline(TilePipeline::mvt_gzip(config.extent).with_max_bytes(8))
            .generate(store.clone())
            .await
            .expect_err("tiny limit should fail");

        match err {
            GenerateError::Tile(TileError::TooLarge { limit, .. }) => assert_eq!(limit, 8),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store.is_finalized());
        assert!(store.metadata().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn rejected_tile_write_aborts_without_finalizing(index: MemoryIndex) {
        let store = MemoryTileStore::failing_after(1);
        let config = config();
        let err = TileGenerator::new(&config, &index)
            .with_max_in_flight(1)
            .generate(store.clone())
            .await
            .expect_err("second insert should fail");

        assert!(
            matches!(err, GenerateError::Store(TileStoreError::Poisoned)),
            "{err:?}"
        );
        assert_eq!(store.rows().len(), 1);
        assert!(!store.is_finalized());
        assert!(store.metadata().is_empty());
        assert!(!store.events().iter().any(|event| event == "metadata"));
    }

    #[rstest]
    #[tokio::test]
    async fn rejected_metadata_write_skips_finalize(index: MemoryIndex) {
        let store = MemoryTileStore::rejecting_metadata();
        let config = config();
        let err = TileGenerator::new(&config, &index)
            .generate(store.clone())
            .await
            .expect_err("metadata write should fail");

        assert!(
            matches!(err, GenerateError::Store(TileStoreError::Poisoned)),
            "{err:?}"
        );
        assert_eq!(store.rows().len(), 2);
        assert!(!store.is_finalized());
        assert!(store.metadata().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_cluster_fails_the_run() {
        let index = MemoryIndex::default().with_tile(
            TileCoord::new(0, 0, 0),
            vec![point(0, 0, json!({"cluster_id": 99}))],
        );
        let config = TilesetConfig::new("t")
            .with_max_zoom(0)
            .with_cluster_expansion_zoom(true);
        let err = TileGenerator::new(&config, &index)
            .generate(MemoryTileStore::default())
            .await
            .expect_err("unknown cluster");
        assert!(matches!(err, GenerateError::Annotate(_)));
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_config_is_rejected_before_traversal(index: MemoryIndex) {
        let store = MemoryTileStore::default();
        let config = TilesetConfig::new("t").with_min_zoom(3).with_max_zoom(1);
        let err = TileGenerator::new(&config, &index)
            .generate(store.clone())
            .await
            .expect_err("inverted zoom range");
        assert!(matches!(err, GenerateError::Config(_)));
        assert!(store.events().is_empty());
    }
}
