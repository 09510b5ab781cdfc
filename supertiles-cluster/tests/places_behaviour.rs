//! End-to-end generation of an MBTiles container from the places fixture,
//! driven by rstest-bdd scenarios.

use std::cell::RefCell;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use rusqlite::Connection;
use supertiles_cluster::{ClusterOptions, PointClusterIndex, PointFeature, load_points};
use supertiles_core::{SqliteTileStore, TileGenerator, TilesetConfig};
use tempfile::TempDir;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/places.geojson");

const CLUSTERED_FIELDS: &str = concat!(
    r#"{"vector_layers":[{"id":"geojsonLayer","description":"Point layer imported from GeoJSON.","#,
    r#""fields":{"cluster":"boolean","cluster_id":"number","point_count":"number","#,
    r#""point_count_abbreviated":"number","name":"string","region":"object"}}]}"#
);

/// Shared state for places scenarios.
#[derive(Debug)]
struct PlacesWorld {
    _dir: TempDir,
    output: Utf8PathBuf,
    places: RefCell<Vec<PointFeature>>,
    config: RefCell<Option<TilesetConfig>>,
}

impl PlacesWorld {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let output =
            Utf8PathBuf::from_path_buf(dir.path().join("basic.mbtiles")).expect("utf8 path");
        Self {
            _dir: dir,
            output,
            places: RefCell::new(Vec::new()),
            config: RefCell::new(None),
        }
    }

    fn expect_config(&self) -> TilesetConfig {
        self.config
            .borrow()
            .clone()
            .expect("a tileset should be configured before generating")
    }

    fn metadata_value(&self, key: &str) -> Option<String> {
        metadata(&self.output)
            .into_iter()
            .find_map(|(name, value)| (name == key).then_some(value))
    }
}

#[fixture]
fn world() -> PlacesWorld {
    PlacesWorld::new()
}

fn tiles(output: &Utf8Path) -> Vec<(u8, u32, u32)> {
    let connection = Connection::open(output.as_std_path()).expect("open container");
    let mut statement = connection
        .prepare("SELECT zoom_level, tile_column, tile_row FROM tiles ORDER BY 1, 2, 3")
        .expect("prepare");
    statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

fn metadata(output: &Utf8Path) -> Vec<(String, String)> {
    let connection = Connection::open(output.as_std_path()).expect("open container");
    let mut statement = connection
        .prepare("SELECT name, value FROM metadata ORDER BY rowid")
        .expect("prepare");
    statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

#[given("the places fixture")]
fn given_places(world: &PlacesWorld) {
    let places = load_points(Utf8Path::new(FIXTURE)).expect("load fixture");
    assert_eq!(places.len(), 3);
    world.places.replace(places);
}

#[given("a tileset named ./test/basic.mbtiles clustered up to zoom 2")]
fn given_reference_tileset(world: &PlacesWorld) {
    let config = TilesetConfig::new("./test/basic.mbtiles").with_max_zoom(2);
    world.config.replace(Some(config));
}

#[given("a tileset clustered up to zoom 2 with an unclustered level")]
fn given_unclustered_tileset(world: &PlacesWorld) {
    let config = TilesetConfig::new("places")
        .with_max_zoom(2)
        .with_include_unclustered(true);
    world.config.replace(Some(config));
}

#[given("a tileset clustered up to zoom 2 recording expansion zooms")]
fn given_expansion_tileset(world: &PlacesWorld) {
    let config = TilesetConfig::new("places")
        .with_max_zoom(2)
        .with_cluster_expansion_zoom(true);
    world.config.replace(Some(config));
}

#[when("the places tileset is generated")]
fn generate(world: &PlacesWorld) {
    let config = world.expect_config();
    let options = ClusterOptions {
        min_zoom: config.min_zoom,
        max_zoom: config.max_zoom,
        extent: config.extent,
        ..ClusterOptions::default()
    };
    let places = world.places.take();
    let index = PointClusterIndex::load(places, &options).expect("build index");
    let store = SqliteTileStore::create(&world.output).expect("create store");
    tokio::runtime::Runtime::new()
        .expect("runtime")
        .block_on(TileGenerator::new(&config, &index).generate(store))
        .expect("generate");
}

#[then("the container holds tiles 0/0/0, 1/0/0, 1/1/1, 2/0/1 and 2/2/2")]
fn then_clustered_tiles(world: &PlacesWorld) {
    assert_eq!(
        tiles(&world.output),
        [(0, 0, 0), (1, 0, 0), (1, 1, 1), (2, 0, 1), (2, 2, 2)]
    );
}

#[then("the metadata matches the reference tileset")]
fn then_reference_metadata(world: &PlacesWorld) {
    let expected: Vec<(String, String)> = [
        ("name", "./test/basic.mbtiles"),
        ("format", "pbf"),
        ("minZoom", "0"),
        ("maxZoom", "2"),
        ("bounds", "-180.0,-85,180,85"),
        ("center", "0,0,0"),
        ("type", "overlay"),
        ("version", "2"),
        ("json", CLUSTERED_FIELDS),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_owned(), value.to_owned()))
    .collect();
    assert_eq!(metadata(&world.output), expected);
}

#[then("zoom 3 holds 4 of the 9 tiles")]
fn then_unclustered_tiles(world: &PlacesWorld) {
    let rows = tiles(&world.output);
    assert_eq!(rows.len(), 9);
    assert_eq!(
        rows.iter().filter(|(zoom, _, _)| *zoom == 3).count(),
        4,
        "{rows:?}"
    );
}

#[then("the metadata reports maxZoom 3 and lists the scalerank field")]
fn then_unclustered_metadata(world: &PlacesWorld) {
    assert_eq!(world.metadata_value("maxZoom").as_deref(), Some("3"));
    let json = world.metadata_value("json").expect("json metadata");
    assert!(
        json.ends_with(r#""region":"object","scalerank":"number"}}]}"#),
        "{json}"
    );
}

#[then("the layer fields list clusterExpansionZoom after point_count_abbreviated")]
fn then_expansion_field(world: &PlacesWorld) {
    let json = world.metadata_value("json").expect("json metadata");
    assert!(
        json.contains(r#""point_count_abbreviated":"number","clusterExpansionZoom":"number""#),
        "{json}"
    );
}

#[scenario(path = "tests/features/places_tileset.feature", index = 0)]
fn clustered_levels_match_reference(world: PlacesWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/places_tileset.feature", index = 1)]
fn unclustered_level_adds_raw_points(world: PlacesWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/places_tileset.feature", index = 2)]
fn expansion_zoom_is_recorded_on_clusters(world: PlacesWorld) {
    let _ = world;
}
