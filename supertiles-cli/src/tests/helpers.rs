//! Test helpers for building generate arguments and reading containers back.

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::Connection;
use tempfile::TempDir;

use crate::generate::GenerateArgs;

pub(super) const PLACES: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../supertiles-cluster/tests/fixtures/places.geojson"
);

pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }
}

pub(super) fn places_args(output: &Utf8Path) -> GenerateArgs {
    GenerateArgs {
        input: Some(Utf8PathBuf::from(PLACES)),
        output: Some(output.to_path_buf()),
        max_zoom: Some(2),
        ..GenerateArgs::default()
    }
}

pub(super) fn tile_rows(path: &Utf8Path) -> Vec<(u8, u32, u32)> {
    let connection = Connection::open(path.as_std_path()).expect("open container");
    let mut statement = connection
        .prepare("SELECT zoom_level, tile_column, tile_row FROM tiles ORDER BY 1, 2, 3")
        .expect("prepare tiles query");
    statement
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .expect("query tiles")
        .collect::<Result<_, _>>()
        .expect("read tiles")
}

pub(super) fn metadata_value(path: &Utf8Path, key: &str) -> Option<String> {
    let connection = Connection::open(path.as_std_path()).expect("open container");
    connection
        .query_row("SELECT value FROM metadata WHERE name = ?1", [key], |row| {
            row.get(0)
        })
        .ok()
}
