//! Attach cluster expansion zooms to cluster features.

use serde_json::Value;

use crate::{ClusterIndex, Tile};

/// Property written onto cluster features when annotation is enabled.
pub const CLUSTER_EXPANSION_ZOOM_PROPERTY: &str = "clusterExpansionZoom";

/// A cluster feature could not be resolved to an expansion zoom.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnnotateError {
    /// The index does not know the identifier.
    #[error("cluster {cluster_id} has no expansion zoom in the index")]
    UnknownCluster {
        /// Identifier read from the feature's `cluster_id` property.
        cluster_id: u64,
    },
    /// `cluster_id` is set but is not a non-negative integer.
    #[error("cluster_id {value} is not a non-negative integer")]
    InvalidClusterId {
        /// Value found in the feature's `cluster_id` property.
        value: Value,
    },
}

/// Adds [`CLUSTER_EXPANSION_ZOOM_PROPERTY`] to every cluster feature.
#[derive(Debug)]
pub struct ClusterExpansionAnnotator<'a, I: ?Sized> {
    index: &'a I,
}

impl<'a, I> ClusterExpansionAnnotator<'a, I>
where
    I: ClusterIndex + ?Sized,
{
    /// Create an annotator backed by `index`.
    pub const fn new(index: &'a I) -> Self {
        Self { index }
    }

    /// Annotate cluster features in place. Non-cluster features are untouched.
    ///
    /// # Errors
    /// Returns [`AnnotateError`] when a feature carries a malformed
    /// `cluster_id` or one the index cannot resolve.
    pub fn annotate(&self, tile: &mut Tile) -> Result<(), AnnotateError> {
        for feature in &mut tile.features {
            let Some(value) = feature.cluster_id_value() else {
                continue;
            };
            let cluster_id = value
                .as_u64()
                .ok_or_else(|| AnnotateError::InvalidClusterId {
                    value: value.clone(),
                })?;
            let zoom = self
                .index
                .cluster_expansion_zoom(cluster_id)
                .ok_or(AnnotateError::UnknownCluster { cluster_id })?;
            feature.properties.insert(
                CLUSTER_EXPANSION_ZOOM_PROPERTY.to_owned(),
                Value::from(zoom),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileCoord;
    use crate::test_support::{MemoryIndex, point};
    use rstest::rstest;
    use serde_json::json;

    fn tile() -> Tile {
        Tile::new(
            TileCoord::new(0, 0, 0),
            vec![
                point(0, 0, json!({"cluster": true, "cluster_id": 7, "point_count": 3})),
                point(1, 1, json!({"name": "Oslo"})),
                point(2, 2, json!({"cluster_id": null})),
            ],
        )
    }

    #[rstest]
    fn annotates_only_clusters() {
        let index = MemoryIndex::default().with_expansion_zoom(7, 4);
        let mut tile = tile();
        ClusterExpansionAnnotator::new(&index)
            .annotate(&mut tile)
            .expect("annotate");

        assert_eq!(
            tile.features[0].properties.get(CLUSTER_EXPANSION_ZOOM_PROPERTY),
            Some(&json!(4))
        );
        assert!(
            !tile.features[1]
                .properties
                .contains_key(CLUSTER_EXPANSION_ZOOM_PROPERTY)
        );
        assert!(
            !tile.features[2]
                .properties
                .contains_key(CLUSTER_EXPANSION_ZOOM_PROPERTY)
        );
    }

    #[rstest]
    fn unknown_cluster_is_an_error() {
        let index = MemoryIndex::default();
        let mut tile = tile();
        let err = ClusterExpansionAnnotator::new(&index)
            .annotate(&mut tile)
            .expect_err("unknown cluster should fail");
        assert_eq!(err, AnnotateError::UnknownCluster { cluster_id: 7 });
    }

    #[rstest]
    #[case(json!("7"))]
    #[case(json!(-7))]
    #[case(json!(7.5))]
    fn malformed_cluster_id_is_an_error(#[case] cluster_id: Value) {
        let index = MemoryIndex::default().with_expansion_zoom(7, 4);
        let mut tile = Tile::new(
            TileCoord::new(0, 0, 0),
            vec![point(
                0,
                0,
                json!({"cluster": true, "cluster_id": cluster_id.clone()}),
            )],
        );
        let err = ClusterExpansionAnnotator::new(&index)
            .annotate(&mut tile)
            .expect_err("malformed cluster id should fail");
        assert_eq!(err, AnnotateError::InvalidClusterId { value: cluster_id });
        assert!(
            !tile.features[0]
                .properties
                .contains_key(CLUSTER_EXPANSION_ZOOM_PROPERTY)
        );
    }
}
