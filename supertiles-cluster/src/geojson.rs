//! GeoJSON point loading.

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use supertiles_core::Properties;
use thiserror::Error;

/// A GeoJSON point with its properties.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    /// Feature identifier, when the input carried a non-negative integer id.
    pub id: Option<u64>,
    /// Longitude (`x`) and latitude (`y`) in degrees.
    pub location: Coord<f64>,
    /// Feature properties in input order.
    pub properties: Properties,
}

impl PointFeature {
    /// Point at `location` with the given properties and no identifier.
    #[must_use]
    pub const fn new(location: Coord<f64>, properties: Properties) -> Self {
        Self {
            id: None,
            location,
            properties,
        }
    }
}

/// Errors raised while reading the input collection.
#[derive(Debug, Error)]
pub enum LoadFeaturesError {
    /// The input path is not an existing file.
    #[error("input file {path} does not exist")]
    NotFound {
        /// Requested input.
        path: Utf8PathBuf,
    },
    /// Reading the input failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Requested input.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The input was not a GeoJSON feature collection.
    #[error("failed to parse {path} as a GeoJSON feature collection: {source}")]
    Parse {
        /// Requested input.
        path: Utf8PathBuf,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawCollection {
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

impl RawFeature {
    fn into_point(self) -> Option<PointFeature> {
        let geometry = self.geometry?;
        if geometry.kind != "Point" {
            return None;
        }
        let Value::Array(position) = geometry.coordinates else {
            return None;
        };
        let mut axes = position.iter().map(Value::as_f64);
        let (Some(Some(x)), Some(Some(y))) = (axes.next(), axes.next()) else {
            return None;
        };
        Some(PointFeature {
            id: self.id.as_ref().and_then(Value::as_u64),
            location: Coord { x, y },
            properties: self.properties.unwrap_or_default(),
        })
    }
}

/// Parse the points of a GeoJSON `FeatureCollection`.
///
/// Features without a `Point` geometry are skipped with a warning.
///
/// # Errors
/// Returns the JSON error when `text` is not a feature collection.
///
/// ```
/// let points = supertiles_cluster::parse_points(
///     r#"{"type":"FeatureCollection","features":[
///         {"type":"Feature","id":4,"geometry":{"type":"Point","coordinates":[2.35,48.85]},
///          "properties":{"name":"Paris"}}
///     ]}"#,
/// )?;
/// assert_eq!(points.len(), 1);
/// assert_eq!(points[0].id, Some(4));
/// # Ok::<(), serde_json::Error>(())
/// ```
pub fn parse_points(text: &str) -> Result<Vec<PointFeature>, serde_json::Error> {
    let collection: RawCollection = serde_json::from_str(text)?;
    let total = collection.features.len();
    let points: Vec<_> = collection
        .features
        .into_iter()
        .filter_map(RawFeature::into_point)
        .collect();
    if points.len() < total {
        warn!(
            "skipped {} of {total} features without point geometry",
            total - points.len()
        );
    }
    Ok(points)
}

/// Read and parse the GeoJSON file at `path`.
///
/// # Errors
/// Returns [`LoadFeaturesError`] when the file is missing, unreadable or not
/// a feature collection.
pub fn load_points(path: &Utf8Path) -> Result<Vec<PointFeature>, LoadFeaturesError> {
    let exists = supertiles_fs::file_is_file(path).map_err(|source| LoadFeaturesError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if !exists {
        return Err(LoadFeaturesError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = supertiles_fs::read_to_string(path).map_err(|source| LoadFeaturesError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_points(&text).map_err(|source| LoadFeaturesError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    #[rstest]
    fn keeps_points_and_skips_other_geometries() {
        let text = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.0, -20.5, 3.0]},
                 "properties": {"b": 1, "a": 2}},
                {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
                 "properties": {}},
                {"type": "Feature", "geometry": null, "properties": {}},
                {"type": "Feature", "id": "text-id", "geometry": {"type": "Point", "coordinates": [1, 2]}}
            ]
        })
        .to_string();

        let points = parse_points(&text).expect("parse");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].location, Coord { x: 10.0, y: -20.5 });
        let keys: Vec<_> = points[0].properties.keys().map(String::as_str).collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(points[1].id, None);
        assert!(points[1].properties.is_empty());
    }

    #[rstest]
    fn missing_file_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.geojson")).expect("utf8");
        let err = load_points(&path).expect_err("missing input");
        assert!(matches!(err, LoadFeaturesError::NotFound { .. }));
    }

    #[rstest]
    fn malformed_file_is_a_parse_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("bad.geojson")).expect("utf8");
        std::fs::write(&path, "[1, 2").expect("write");
        let err = load_points(&path).expect_err("malformed input");
        match err {
            LoadFeaturesError::Parse { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
