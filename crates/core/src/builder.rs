//! Tiles produced by the tiler and their MVT serialization.

use std::sync::Arc;

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

use crate::convert::{feature_id, to_geojson};
use crate::geometry::{BBox, TileFeature, TileGeometry, TileLine, TilePoint};
use crate::mvt::{Cursor, Dialect, LayerConfig, LayerWriter};
use crate::projection::world_to_pixel;
use crate::simplify::is_retained;
use crate::tile::TileCoord;
use crate::tiler::TilerConfig;
use crate::Result;

/// One node of the tile pyramid: the features clipped to this tile (plus its
/// buffer) in world coordinates.
///
/// A tile is immutable once built. Serialization applies the tile's
/// simplification tolerance and the `max_features` cap without touching the
/// stored features, so children split from this tile still see all of them.
#[derive(Debug, Clone)]
pub struct Tile {
    coord: TileCoord,
    features: Vec<TileFeature>,
    bbox: BBox,
    num_points: usize,
    num_simplified: usize,
    config: Arc<TilerConfig>,
}

impl Tile {
    pub fn new(features: Vec<TileFeature>, coord: TileCoord, config: Arc<TilerConfig>) -> Self {
        let (tolerance, sq_tolerance) = tolerances(&coord, &config);
        let mut bbox = BBox::empty();
        let mut num_points = 0;
        let mut num_simplified = 0;
        for feature in &features {
            bbox.union(feature.bbox());
            let keep_all = matches!(
                feature.geometry(),
                TileGeometry::Point(_) | TileGeometry::MultiPoint(_)
            );
            feature.geometry().for_each_point(|p| {
                num_points += 1;
                if keep_all || is_retained(p, tolerance, sq_tolerance) {
                    num_simplified += 1;
                }
            });
        }
        Self {
            coord,
            features,
            bbox,
            num_points,
            num_simplified,
            config,
        }
    }

    /// A tile with no features and an empty bbox.
    pub fn empty(coord: TileCoord, config: Arc<TilerConfig>) -> Self {
        Self::new(Vec::new(), coord, config)
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn features(&self) -> &[TileFeature] {
        &self.features
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn config(&self) -> &Arc<TilerConfig> {
        &self.config
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Vertices left after applying this tile's tolerance.
    pub fn num_simplified(&self) -> usize {
        self.num_simplified
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Transform a world-space geometry into this tile's pixel space, keeping
    /// only vertices important enough at this zoom. Lines left with fewer than
    /// two vertices are dropped.
    pub fn pixel_geometry(&self, geometry: &TileGeometry) -> Option<Geometry<i32>> {
        let (tolerance, sq_tolerance) = tolerances(&self.coord, &self.config);
        let extent = self.config.extent;
        let pixel = |p: &TilePoint| {
            let (x, y) = world_to_pixel(p.x, p.y, &self.coord, extent);
            Coord { x, y }
        };
        let line = |line: &TileLine| -> LineString<i32> {
            line.iter()
                .filter(|p| is_retained(p, tolerance, sq_tolerance))
                .map(pixel)
                .collect()
        };
        let polygon = |rings: &[TileLine]| -> Option<Polygon<i32>> {
            let mut rings = rings.iter().map(line);
            let exterior = rings.next()?;
            Some(Polygon::new(exterior, rings.collect()))
        };

        match geometry {
            TileGeometry::Point(p) => Some(Geometry::Point(Point(pixel(p)))),
            TileGeometry::MultiPoint(points) => Some(Geometry::MultiPoint(MultiPoint::new(
                points.iter().map(|p| Point(pixel(p))).collect(),
            ))),
            TileGeometry::LineString(l) => {
                let l = line(l);
                (l.0.len() > 1).then_some(Geometry::LineString(l))
            }
            TileGeometry::MultiLineString(lines) => {
                let lines: Vec<LineString<i32>> =
                    lines.iter().map(line).filter(|l| l.0.len() > 1).collect();
                (!lines.is_empty())
                    .then(|| Geometry::MultiLineString(MultiLineString::new(lines)))
            }
            TileGeometry::Polygon(rings) => polygon(rings).map(Geometry::Polygon),
            TileGeometry::MultiPolygon(polygons) => {
                let polygons: Vec<Polygon<i32>> =
                    polygons.iter().filter_map(|p| polygon(p)).collect();
                (!polygons.is_empty()).then(|| Geometry::MultiPolygon(MultiPolygon::new(polygons)))
            }
        }
    }

    /// Serialize the tile as a single-layer vector tile.
    ///
    /// Only the first `max_features` features are written. Features whose
    /// geometry collapses in pixel space are skipped.
    pub fn encode(&self, dialect: Dialect) -> Result<Vec<u8>> {
        let limit = self.config.max_features.min(self.features.len());
        if limit < self.features.len() {
            log::warn!(
                "Tile {} has {} features, writing only the first {}",
                self.coord,
                self.features.len(),
                limit
            );
        }

        let layer = LayerConfig::new(self.config.layer_name.clone(), self.coord)
            .with_extent(self.config.extent)
            .with_dialect(dialect)
            .with_clamp(false);
        let mut writer = LayerWriter::new(layer);
        let mut cursor = Cursor::new(self.coord, self.config.extent);

        for feature in &self.features[..limit] {
            let Some(geometry) = self.pixel_geometry(feature.geometry()) else {
                log::trace!("{} feature simplified away in tile {}", feature.geometry().type_name(), self.coord);
                continue;
            };
            let geom_type = cursor.encode(&geometry)?;
            writer.add_feature_raw(
                feature_id(feature.id()),
                feature.tags(),
                geom_type,
                cursor.geometry(),
            )?;
        }

        log::debug!(
            "Encoded tile {}: {} of {} features",
            self.coord,
            writer.len(),
            self.features.len()
        );
        Ok(writer.finish())
    }

    /// The tile's features as lng/lat GeoJSON, without simplification.
    pub fn to_geojson(&self) -> Vec<geojson::Feature> {
        self.features.iter().map(to_geojson).collect()
    }
}

/// Per-tile vertex tolerance in world units and its square. A pyramid with a
/// single zoom level keeps every vertex.
fn tolerances(coord: &TileCoord, config: &TilerConfig) -> (f64, f64) {
    if config.max_zoom == 0 {
        return (0.0, 0.0);
    }
    let tolerance = config.tolerance / ((1u64 << coord.z) as f64 * config.extent as f64);
    (tolerance, tolerance * tolerance)
}
