//! Hierarchical point clustering over per-zoom R\*-trees.
//!
//! Points are projected to the unit Web Mercator square. Starting from the
//! raw points one level above `max_zoom`, each zoom merges points lying
//! within `radius / (extent * 2^zoom)` of a seed into a weighted-centre
//! cluster. Every level keeps its own tree, so a tile query only touches the
//! level for its zoom.
//!
//! Cluster identifiers encode where the cluster was formed:
//! `(slot << 5) + (zoom + 1) + point_count`, where `slot` is the seed's
//! position in the level it was merged from.
#![expect(
    clippy::float_arithmetic,
    reason = "projection and clustering operate on floating point coordinates"
)]

use std::f64::consts::PI;

use geo::Coord;
use log::debug;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use serde_json::Value;
use supertiles_core::{
    CLUSTER_ID_PROPERTY, ClusterIndex, Feature, Properties, Tile, TileCoord,
};

use crate::{ClusterOptions, ClusterOptionsError, ClusterProperties, NoAggregation, PointFeature};

/// Bits of a cluster identifier holding the zoom it was formed at.
const ZOOM_BITS: u32 = 5;

/// Longitude in degrees to the `[0, 1]` Mercator x coordinate.
fn lng_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Latitude in degrees to the `[0, 1]` Mercator y coordinate, clamped at the
/// poles.
fn lat_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

/// Single precision rounding applied to projected input coordinates.
#[expect(
    clippy::cast_possible_truncation,
    reason = "coordinates are deliberately stored at single precision"
)]
fn fround(value: f64) -> f64 {
    f64::from(value as f32)
}

/// Round half towards positive infinity.
#[expect(
    clippy::cast_possible_truncation,
    reason = "tile-local coordinates fit comfortably in i32"
)]
fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

#[expect(
    clippy::cast_precision_loss,
    reason = "counts stay far below 2^52"
)]
fn as_float(count: u64) -> f64 {
    count as f64
}

#[expect(
    clippy::integer_division,
    clippy::integer_division_remainder_used,
    reason = "counts are rounded to whole thousands or tenths of a thousand"
)]
fn abbreviate(count: u64) -> Value {
    if count >= 10_000 {
        Value::from(format!("{}k", count.saturating_add(500) / 1_000))
    } else if count >= 1_000 {
        let tenths = count.saturating_add(50) / 100;
        if tenths % 10 == 0 {
            Value::from(format!("{}k", tenths / 10))
        } else {
            Value::from(format!("{}.{}k", tenths / 10, tenths % 10))
        }
    } else {
        Value::from(count)
    }
}

/// Entry of one zoom level.
#[derive(Debug, Clone)]
struct Node {
    x: f64,
    y: f64,
    /// Zoom at which the node was consumed by the clustering pass.
    visited: Option<u8>,
    /// Input point index, or the cluster identifier.
    id: u64,
    parent: Option<u64>,
    num_points: u64,
    /// Slot of the aggregated properties in `PointClusterIndex::cluster_props`.
    props: Option<usize>,
}

impl Node {
    fn point(index: u64, location: Coord<f64>) -> Self {
        Self {
            x: fround(lng_x(location.x)),
            y: fround(lat_y(location.y)),
            visited: None,
            id: index,
            parent: None,
            num_points: 1,
            props: None,
        }
    }

    fn is_cluster(&self) -> bool {
        self.num_points > 1
    }

    fn visited_at(&self, zoom: u8) -> bool {
        self.visited.is_some_and(|at| at <= zoom)
    }
}

/// Tree entry pointing back at a node slot.
#[derive(Debug, Clone, Copy)]
struct Slot {
    position: [f64; 2],
    index: usize,
}

impl RTreeObject for Slot {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for Slot {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

#[derive(Debug)]
struct Level {
    nodes: Vec<Node>,
    tree: RTree<Slot>,
}

impl Level {
    fn new(nodes: Vec<Node>) -> Self {
        let slots = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| Slot {
                position: [fround(node.x), fround(node.y)],
                index,
            })
            .collect();
        Self {
            nodes,
            tree: RTree::bulk_load(slots),
        }
    }

    fn within(&self, x: f64, y: f64, radius: f64) -> Vec<usize> {
        let mut found: Vec<_> = self
            .tree
            .locate_within_distance([x, y], radius * radius)
            .map(|slot| slot.index)
            .collect();
        found.sort_unstable();
        found
    }

    fn range(&self, min: [f64; 2], max: [f64; 2]) -> Vec<usize> {
        let mut found: Vec<_> = self
            .tree
            .locate_in_envelope(&AABB::from_corners(min, max))
            .map(|slot| slot.index)
            .collect();
        found.sort_unstable();
        found
    }
}

/// A cluster's direct member at the zoom it was formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterChild {
    /// A nested cluster with its identifier and size.
    Cluster {
        /// Cluster identifier.
        id: u64,
        /// Points inside the nested cluster.
        point_count: u64,
    },
    /// An input point, by position in the loaded collection.
    Point(usize),
}

/// [`ClusterIndex`] over GeoJSON points.
///
/// ```
/// use geo::Coord;
/// use supertiles_cluster::{ClusterOptions, PointClusterIndex, PointFeature};
/// use supertiles_core::ClusterIndex;
///
/// let points = vec![
///     PointFeature::new(Coord { x: 10.0, y: 10.0 }, Default::default()),
///     PointFeature::new(Coord { x: 10.1, y: 10.1 }, Default::default()),
/// ];
/// let options = ClusterOptions { max_zoom: 4, ..ClusterOptions::default() };
/// let index = PointClusterIndex::load(points, &options)?;
///
/// let world = index.tile(0, 0, 0).expect("points are visible at zoom 0");
/// assert_eq!(world.features.len(), 1);
/// assert_eq!(world.features[0].properties["point_count"], 2);
/// # Ok::<(), supertiles_cluster::ClusterOptionsError>(())
/// ```
pub struct PointClusterIndex {
    options: ClusterOptions,
    points: Vec<PointFeature>,
    /// Levels from `min_zoom` to `max_zoom + 1`.
    levels: Vec<Level>,
    cluster_props: Vec<Properties>,
}

impl std::fmt::Debug for PointClusterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointClusterIndex")
            .field("points", &self.points.len())
            .field("levels", &self.levels.len())
            .finish_non_exhaustive()
    }
}

impl PointClusterIndex {
    /// Cluster `points` at every zoom from `options.min_zoom` to
    /// `options.max_zoom` without aggregating properties.
    ///
    /// # Errors
    /// Returns [`ClusterOptionsError`] when the options are invalid.
    pub fn load(
        points: Vec<PointFeature>,
        options: &ClusterOptions,
    ) -> Result<Self, ClusterOptionsError> {
        Self::load_with(points, options, &NoAggregation)
    }

    /// Cluster `points`, aggregating properties with `aggregation`.
    ///
    /// # Errors
    /// Returns [`ClusterOptionsError`] when the options are invalid.
    pub fn load_with(
        points: Vec<PointFeature>,
        options: &ClusterOptions,
        aggregation: &dyn ClusterProperties,
    ) -> Result<Self, ClusterOptionsError> {
        options.validate()?;
        debug!(
            "clustering {} points, zoom {}..={}, node size hint {}",
            points.len(),
            options.min_zoom,
            options.max_zoom,
            options.node_size
        );
        let mut builder = Builder {
            options,
            points: &points,
            aggregation,
            cluster_props: Vec::new(),
        };
        let base = points
            .iter()
            .zip(0_u64..)
            .map(|(point, index)| Node::point(index, point.location))
            .collect();

        let mut current = Level::new(base);
        let mut levels = Vec::with_capacity(usize::from(options.max_zoom - options.min_zoom) + 2);
        for zoom in (options.min_zoom..=options.max_zoom).rev() {
            let next = Level::new(builder.cluster(&mut current, zoom));
            debug!("zoom {zoom}: {} entries", next.nodes.len());
            levels.push(current);
            current = next;
        }
        levels.push(current);
        levels.reverse();

        let cluster_props = builder.cluster_props;
        Ok(Self {
            options: options.clone(),
            points,
            levels,
            cluster_props,
        })
    }

    /// Number of loaded points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points were loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn point_count(&self) -> u64 {
        self.points.len() as u64
    }

    fn level(&self, zoom: u8) -> Option<&Level> {
        let clamped = zoom.clamp(self.options.min_zoom, self.options.max_zoom + 1);
        self.levels
            .get(usize::from(clamped - self.options.min_zoom))
    }

    /// Level and seed node a cluster was formed from, with the level's zoom.
    ///
    /// Identifiers are `(slot << 5) + (zoom + 1) + point_count`; the seed at
    /// `slot` carries the cluster as its parent.
    fn origin(&self, cluster_id: u64) -> Option<(&Level, &Node, u8)> {
        let offset = cluster_id.checked_sub(self.point_count())?;
        let zoom = u8::try_from(offset & ((1 << ZOOM_BITS) - 1)).ok()?;
        let slot = usize::try_from(offset >> ZOOM_BITS).ok()?;
        if zoom <= self.options.min_zoom || zoom > self.options.max_zoom + 1 {
            return None;
        }
        let level = self.levels.get(usize::from(zoom - self.options.min_zoom))?;
        let seed = level.nodes.get(slot)?;
        (seed.parent == Some(cluster_id)).then_some((level, seed, zoom))
    }

    /// Direct members of `cluster_id`, or `None` for an unknown identifier.
    #[must_use]
    pub fn children(&self, cluster_id: u64) -> Option<Vec<ClusterChild>> {
        let (level, seed, zoom) = self.origin(cluster_id)?;
        let radius = self.options.radius
            / (f64::from(self.options.extent) * 2_f64.powi(i32::from(zoom) - 1));
        let children: Vec<_> = level
            .within(seed.x, seed.y, radius)
            .into_iter()
            .filter_map(|index| level.nodes.get(index))
            .filter(|node| node.parent == Some(cluster_id))
            .map(|node| {
                if node.is_cluster() {
                    ClusterChild::Cluster {
                        id: node.id,
                        point_count: node.num_points,
                    }
                } else {
                    ClusterChild::Point(usize::try_from(node.id).unwrap_or(usize::MAX))
                }
            })
            .collect();
        (!children.is_empty()).then_some(children)
    }

    fn cluster_properties(&self, node: &Node) -> Properties {
        let mut properties = node
            .props
            .and_then(|slot| self.cluster_props.get(slot))
            .cloned()
            .unwrap_or_default();
        properties.insert("cluster".to_owned(), Value::Bool(true));
        properties.insert(CLUSTER_ID_PROPERTY.to_owned(), Value::from(node.id));
        properties.insert("point_count".to_owned(), Value::from(node.num_points));
        properties.insert(
            "point_count_abbreviated".to_owned(),
            abbreviate(node.num_points),
        );
        properties
    }

    fn push_features(
        &self,
        level: &Level,
        slots: Vec<usize>,
        origin: (f64, f64),
        scale: f64,
        features: &mut Vec<Feature>,
    ) {
        let extent = f64::from(self.options.extent);
        for node in slots.into_iter().filter_map(|slot| level.nodes.get(slot)) {
            let (x, y, id, properties) = if node.is_cluster() {
                (node.x, node.y, Some(node.id), self.cluster_properties(node))
            } else {
                let Some(point) = usize::try_from(node.id)
                    .ok()
                    .and_then(|index| self.points.get(index))
                else {
                    continue;
                };
                (
                    lng_x(point.location.x),
                    lat_y(point.location.y),
                    point.id,
                    point.properties.clone(),
                )
            };
            let geometry = Coord {
                x: round_half_up(extent * (x * scale - origin.0)),
                y: round_half_up(extent * (y * scale - origin.1)),
            };
            let feature = Feature::new(geometry, properties);
            features.push(match id {
                Some(id) => feature.with_id(id),
                None => feature,
            });
        }
    }
}

impl ClusterIndex for PointClusterIndex {
    fn tile(&self, zoom: u8, x: u32, y: u32) -> Option<Tile> {
        let level = self.level(zoom)?;
        let scale = 2_f64.powi(i32::from(zoom));
        let buffer = self.options.radius / f64::from(self.options.extent);
        let (fx, fy) = (f64::from(x), f64::from(y));
        let top = (fy - buffer) / scale;
        let bottom = (fy + 1.0 + buffer) / scale;

        let mut features = Vec::new();
        let slots = level.range(
            [(fx - buffer) / scale, top],
            [(fx + 1.0 + buffer) / scale, bottom],
        );
        self.push_features(level, slots, (fx, fy), scale, &mut features);
        if x == 0 {
            let wrapped = level.range([1.0 - buffer / scale, top], [1.0, bottom]);
            self.push_features(level, wrapped, (scale, fy), scale, &mut features);
        }
        if f64::from(x) == scale - 1.0 {
            let wrapped = level.range([0.0, top], [buffer / scale, bottom]);
            self.push_features(level, wrapped, (-1.0, fy), scale, &mut features);
        }
        (!features.is_empty()).then(|| Tile::new(TileCoord::new(zoom, x, y), features))
    }

    fn cluster_expansion_zoom(&self, cluster_id: u64) -> Option<u8> {
        let (_, _, origin_zoom) = self.origin(cluster_id)?;
        let mut expansion = origin_zoom - 1;
        let mut current = cluster_id;
        while expansion <= self.options.max_zoom {
            let children = self.children(current)?;
            expansion += 1;
            match children.as_slice() {
                [ClusterChild::Cluster { id, .. }] => current = *id,
                _ => break,
            }
        }
        Some(expansion)
    }
}

/// State threaded through the zoom-by-zoom clustering pass.
struct Builder<'a> {
    options: &'a ClusterOptions,
    points: &'a [PointFeature],
    aggregation: &'a dyn ClusterProperties,
    cluster_props: Vec<Properties>,
}

impl Builder<'_> {
    /// Properties a node contributes to a reduction.
    fn mapped(&self, node: &Node) -> Properties {
        if node.is_cluster() {
            return node
                .props
                .and_then(|slot| self.cluster_props.get(slot))
                .cloned()
                .unwrap_or_default();
        }
        usize::try_from(node.id)
            .ok()
            .and_then(|index| self.points.get(index))
            .map(|point| self.aggregation.map(&point.properties))
            .unwrap_or_default()
    }

    /// Merge `level` at `zoom`, marking consumed nodes, and return the nodes
    /// of the next coarser level.
    #[expect(
        clippy::indexing_slicing,
        reason = "slots come from the level's own tree"
    )]
    fn cluster(&mut self, level: &mut Level, zoom: u8) -> Vec<Node> {
        let radius = self.options.radius
            / (f64::from(self.options.extent) * 2_f64.powi(i32::from(zoom)));
        let aggregates = self.aggregation.aggregates();
        let point_count = self.points.len() as u64;
        let mut next = Vec::new();

        for slot in 0..level.nodes.len() {
            if level.nodes[slot].visited_at(zoom) {
                continue;
            }
            level.nodes[slot].visited = Some(zoom);
            let (x, y, own) = {
                let seed = &level.nodes[slot];
                (seed.x, seed.y, seed.num_points)
            };
            let neighbours = level.within(x, y, radius);
            let total = own
                + neighbours
                    .iter()
                    .map(|&k| &level.nodes[k])
                    .filter(|node| !node.visited_at(zoom))
                    .map(|node| node.num_points)
                    .sum::<u64>();

            if total > own && total >= self.options.min_points {
                let id = ((slot as u64) << ZOOM_BITS) + u64::from(zoom) + 1 + point_count;
                let mut wx = x * as_float(own);
                let mut wy = y * as_float(own);
                let mut props = None;
                for &k in &neighbours {
                    if level.nodes[k].visited_at(zoom) {
                        continue;
                    }
                    let neighbour = &mut level.nodes[k];
                    neighbour.visited = Some(zoom);
                    neighbour.parent = Some(id);
                    wx += neighbour.x * as_float(neighbour.num_points);
                    wy += neighbour.y * as_float(neighbour.num_points);
                    if aggregates {
                        let accumulated = match props {
                            Some(accumulated) => accumulated,
                            None => {
                                let seed = self.mapped(&level.nodes[slot]);
                                self.cluster_props.push(seed);
                                let created = self.cluster_props.len() - 1;
                                props = Some(created);
                                created
                            }
                        };
                        let contribution = self.mapped(&level.nodes[k]);
                        self.aggregation
                            .reduce(&mut self.cluster_props[accumulated], &contribution);
                    }
                }
                level.nodes[slot].parent = Some(id);
                next.push(Node {
                    x: wx / as_float(total),
                    y: wy / as_float(total),
                    visited: None,
                    id,
                    parent: None,
                    num_points: total,
                    props,
                });
            } else {
                next.push(carried(&level.nodes[slot]));
                if total > 1 {
                    for &k in &neighbours {
                        if level.nodes[k].visited_at(zoom) {
                            continue;
                        }
                        level.nodes[k].visited = Some(zoom);
                        next.push(carried(&level.nodes[k]));
                    }
                }
            }
        }
        next
    }
}

/// Copy of a node promoted unchanged to the next level.
fn carried(node: &Node) -> Node {
    Node {
        visited: None,
        parent: None,
        ..node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SumProperties;
    use rstest::{fixture, rstest};
    use serde_json::json;

    fn place(lng: f64, lat: f64, properties: Value) -> PointFeature {
        let properties = match properties {
            Value::Object(map) => map,
            other => panic!("expected object, found {other}"),
        };
        PointFeature::new(Coord { x: lng, y: lat }, properties)
    }

    #[fixture]
    fn places() -> Vec<PointFeature> {
        vec![
            place(45.0, 45.0, json!({"name": "a", "population": 10})),
            place(45.5, 45.2, json!({"name": "b", "population": 5})),
            place(-135.0, -45.0, json!({"name": "c", "population": 1})),
        ]
    }

    fn options(max_zoom: u8) -> ClusterOptions {
        ClusterOptions {
            max_zoom,
            ..ClusterOptions::default()
        }
    }

    #[rstest]
    #[case(0.0, 0.5)]
    #[case(180.0, 1.0)]
    #[case(-180.0, 0.0)]
    fn projects_longitude(#[case] lng: f64, #[case] expected: f64) {
        assert!((lng_x(lng) - expected).abs() < f64::EPSILON);
    }

    #[rstest]
    fn projects_latitude_with_clamping() {
        assert!((lat_y(0.0) - 0.5).abs() < 1e-12);
        assert!(lat_y(45.0) < 0.5);
        assert!((lat_y(90.0) - 0.0).abs() < f64::EPSILON);
        assert!((lat_y(-90.0) - 1.0).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(999, json!(999))]
    #[case(1_000, json!("1k"))]
    #[case(1_549, json!("1.5k"))]
    #[case(1_550, json!("1.6k"))]
    #[case(9_960, json!("10k"))]
    #[case(12_345, json!("12k"))]
    fn abbreviates_counts(#[case] count: u64, #[case] expected: Value) {
        assert_eq!(abbreviate(count), expected);
    }

    #[rstest]
    fn world_tile_holds_cluster_and_outlier(places: Vec<PointFeature>) {
        let index = PointClusterIndex::load(places, &options(2)).expect("load");
        let tile = index.tile(0, 0, 0).expect("world tile");

        assert_eq!(tile.features.len(), 2);
        let cluster = &tile.features[0];
        assert_eq!(cluster.id, Some(6));
        assert_eq!(cluster.properties["cluster"], json!(true));
        assert_eq!(cluster.properties["cluster_id"], json!(6));
        assert_eq!(cluster.properties["point_count"], json!(2));
        assert_eq!(cluster.properties["point_count_abbreviated"], json!(2));
        let outlier = &tile.features[1];
        assert_eq!(outlier.properties["name"], json!("c"));
        assert_eq!(outlier.geometry, Coord { x: 64, y: 328 });
    }

    #[rstest]
    fn unclustered_level_returns_raw_points(places: Vec<PointFeature>) {
        let index = PointClusterIndex::load(places, &options(2)).expect("load");
        let tile = index.tile(3, 5, 2).expect("tile with a and b");
        let names: Vec<_> = tile
            .features
            .iter()
            .map(|feature| feature.properties["name"].clone())
            .collect();
        assert_eq!(names, [json!("a"), json!("b")]);
        assert!(tile.features.iter().all(|feature| feature.cluster_id().is_none()));
    }

    #[rstest]
    fn expansion_zoom_follows_single_children(places: Vec<PointFeature>) {
        let index = PointClusterIndex::load(places, &options(2)).expect("load");
        assert_eq!(index.cluster_expansion_zoom(6), Some(3));
        assert_eq!(
            index.children(6),
            Some(vec![ClusterChild::Point(0), ClusterChild::Point(1)])
        );
        assert_eq!(index.cluster_expansion_zoom(1), None);
        assert_eq!(index.cluster_expansion_zoom(1_000), None);
    }

    #[rstest]
    fn empty_cells_yield_none(places: Vec<PointFeature>) {
        let index = PointClusterIndex::load(places, &options(2)).expect("load");
        assert!(index.tile(2, 3, 3).is_none());
    }

    #[rstest]
    fn sums_properties_into_clusters(places: Vec<PointFeature>) {
        let index =
            PointClusterIndex::load_with(places, &options(2), &SumProperties::new(["population"]))
                .expect("load");
        let tile = index.tile(0, 0, 0).expect("world tile");
        let cluster = &tile.features[0];

        let keys: Vec<_> = cluster.properties.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["population", "cluster", "cluster_id", "point_count", "point_count_abbreviated"]
        );
        assert_eq!(cluster.properties["population"], json!(15));
        assert_eq!(tile.features[1].properties["population"], json!(1));
    }

    #[rstest]
    fn points_near_the_antimeridian_appear_in_both_edge_tiles() {
        let points = vec![place(179.0, 0.0, json!({"name": "east"}))];
        let index = PointClusterIndex::load(points, &options(2)).expect("load");

        let east = index.tile(1, 1, 0).expect("eastern tile");
        let west = index.tile(1, 0, 0).expect("western tile wraps");
        assert_eq!(east.features.len(), 1);
        assert_eq!(west.features.len(), 1);
        assert_eq!(west.features[0].geometry, Coord { x: -3, y: 512 });
        assert_eq!(east.features[0].geometry, Coord { x: 509, y: 512 });
    }
}
