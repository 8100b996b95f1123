//! Tiler-internal geometry model.
//!
//! During tiling every coordinate lives in projected world space (see
//! [`crate::projection`]) and carries an `importance` slot written by the
//! simplifier. Lines and rings are flat vectors of [`TilePoint`]s.

use std::sync::Arc;

use geojson::feature::Id;

use crate::mvt::Properties;

/// A projected coordinate plus its simplification importance.
///
/// `importance` is the squared distance at which Douglas-Peucker retained the
/// vertex, `1.0` for vertices that must never be dropped (line endpoints and
/// clip intersections) and `0.0` for vertices that are never retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePoint {
    pub x: f64,
    pub y: f64,
    pub importance: f64,
}

impl TilePoint {
    pub fn new(x: f64, y: f64, importance: f64) -> Self {
        Self { x, y, importance }
    }
}

/// A line or polygon ring.
pub type TileLine = Vec<TilePoint>;

/// Geometry variants handled by the tiler.
#[derive(Debug, Clone, PartialEq)]
pub enum TileGeometry {
    Point(TilePoint),
    MultiPoint(Vec<TilePoint>),
    LineString(TileLine),
    MultiLineString(Vec<TileLine>),
    Polygon(Vec<TileLine>),
    MultiPolygon(Vec<Vec<TileLine>>),
}

impl TileGeometry {
    /// GeoJSON name of the variant, for log messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            TileGeometry::Point(_) => "Point",
            TileGeometry::MultiPoint(_) => "MultiPoint",
            TileGeometry::LineString(_) => "LineString",
            TileGeometry::MultiLineString(_) => "MultiLineString",
            TileGeometry::Polygon(_) => "Polygon",
            TileGeometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Visit every vertex in storage order.
    pub fn for_each_point<F: FnMut(&TilePoint)>(&self, mut f: F) {
        match self {
            TileGeometry::Point(p) => f(p),
            TileGeometry::MultiPoint(points) | TileGeometry::LineString(points) => {
                points.iter().for_each(f)
            }
            TileGeometry::MultiLineString(lines) | TileGeometry::Polygon(lines) => {
                lines.iter().flatten().for_each(f)
            }
            TileGeometry::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(f),
        }
    }

    fn for_each_point_mut<F: FnMut(&mut TilePoint)>(&mut self, mut f: F) {
        match self {
            TileGeometry::Point(p) => f(p),
            TileGeometry::MultiPoint(points) | TileGeometry::LineString(points) => {
                points.iter_mut().for_each(f)
            }
            TileGeometry::MultiLineString(lines) | TileGeometry::Polygon(lines) => {
                lines.iter_mut().flatten().for_each(f)
            }
            TileGeometry::MultiPolygon(polygons) => polygons
                .iter_mut()
                .flatten()
                .flatten()
                .for_each(f),
        }
    }

    /// Total number of stored vertices.
    pub fn num_points(&self) -> usize {
        let mut count = 0;
        self.for_each_point(|_| count += 1);
        count
    }

    /// Bounding box over all vertices.
    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox::empty();
        self.for_each_point(|p| bbox.extend(p.x, p.y));
        bbox
    }

    /// Shift every vertex along x, used to re-insert wrapped copies across the antimeridian.
    pub fn translate_x(&mut self, dx: f64) {
        self.for_each_point_mut(|p| p.x += dx);
    }
}

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// The degenerate box that any `extend` replaces.
    pub fn empty() -> Self {
        Self::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn extend(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn union(&mut self, other: &BBox) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }
}

impl Default for BBox {
    fn default() -> Self {
        Self::empty()
    }
}

/// A feature as it moves through the tiler.
///
/// The bounding box is computed once in [`TileFeature::new`]; clipping never edits
/// a feature in place but builds a new one through [`TileFeature::with_geometry`].
/// Tags are shared between the copies a feature is clipped into.
#[derive(Debug, Clone)]
pub struct TileFeature {
    id: Option<Id>,
    geometry: TileGeometry,
    tags: Arc<Properties>,
    bbox: BBox,
}

impl TileFeature {
    pub fn new(id: Option<Id>, geometry: TileGeometry, tags: Arc<Properties>) -> Self {
        let bbox = geometry.bbox();
        Self {
            id,
            geometry,
            tags,
            bbox,
        }
    }

    /// A new feature with this feature's id and tags but a different geometry.
    pub fn with_geometry(&self, geometry: TileGeometry) -> Self {
        Self::new(self.id.clone(), geometry, Arc::clone(&self.tags))
    }

    pub fn id(&self) -> Option<&Id> {
        self.id.as_ref()
    }

    pub fn geometry(&self) -> &TileGeometry {
        &self.geometry
    }

    pub fn tags(&self) -> &Properties {
        &self.tags
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }
}
