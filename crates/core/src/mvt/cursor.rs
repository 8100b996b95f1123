//! Geometry command encoder.
//!
//! A [`Cursor`] turns one feature's geometry into the packed MVT command
//! stream: `MoveTo`/`LineTo`/`ClosePath` commands with zigzag-encoded deltas
//! against the previously emitted point. The cursor is refreshed before every
//! feature so deltas never leak from one feature into the next.

use geo::{Coord, Geometry, LineString, MapCoords, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

use super::{command_encode, zigzag_encode, GeomType, CMD_CLOSE_PATH, CMD_LINE_TO, CMD_MOVE_TO};
use crate::projection::lng_lat_to_pixel;
use crate::tile::TileCoord;
use crate::{Error, Result};

type Pixel = (i32, i32);

/// Stateful encoder for one tile.
#[derive(Debug, Clone)]
pub struct Cursor {
    tile: TileCoord,
    extent: u32,
    clamp: bool,
    geometry: Vec<u32>,
    last: Pixel,
}

impl Cursor {
    pub fn new(tile: TileCoord, extent: u32) -> Self {
        Self {
            tile,
            extent,
            clamp: false,
            geometry: Vec::new(),
            last: (0, 0),
        }
    }

    /// Clamp every encoded coordinate into `[0, extent]`.
    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp = clamp;
        self
    }

    pub fn tile(&self) -> &TileCoord {
        &self.tile
    }

    pub fn extent(&self) -> u32 {
        self.extent
    }

    /// Reset state for a new feature.
    pub fn refresh(&mut self) {
        self.geometry.clear();
        self.last = (0, 0);
    }

    /// The command stream of the current feature.
    pub fn geometry(&self) -> &[u32] {
        &self.geometry
    }

    pub fn take_geometry(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.geometry)
    }

    /// Project a lng/lat position into this tile's pixel space.
    pub fn project(&self, lng: f64, lat: f64) -> Pixel {
        lng_lat_to_pixel(lng, lat, &self.tile, self.extent)
    }

    fn pixel(&self, c: Coord<i32>) -> Pixel {
        if self.clamp {
            let max = self.extent as i32;
            (c.x.clamp(0, max), c.y.clamp(0, max))
        } else {
            (c.x, c.y)
        }
    }

    fn push_delta(&mut self, p: Pixel) {
        self.geometry.push(zigzag_encode(p.0.wrapping_sub(self.last.0)));
        self.geometry.push(zigzag_encode(p.1.wrapping_sub(self.last.1)));
        self.last = p;
    }

    pub fn make_point(&mut self, point: &Point<i32>) {
        self.geometry.push(command_encode(CMD_MOVE_TO, 1));
        let p = self.pixel(point.0);
        self.push_delta(p);
    }

    pub fn make_multi_point(&mut self, points: &MultiPoint<i32>) {
        if points.0.is_empty() {
            return;
        }
        self.geometry
            .push(command_encode(CMD_MOVE_TO, points.0.len() as u32));
        for point in &points.0 {
            let p = self.pixel(point.0);
            self.push_delta(p);
        }
    }

    /// Emit `MoveTo(1)` and `LineTo(n)`, skipping zero-length segments.
    ///
    /// A line whose points all coincide encodes as a `MoveTo` followed by an
    /// empty `LineTo`.
    pub fn make_line(&mut self, line: &LineString<i32>) {
        let Some((first, rest)) = line.0.split_first() else {
            return;
        };
        self.geometry.push(command_encode(CMD_MOVE_TO, 1));
        let p = self.pixel(*first);
        self.push_delta(p);

        let count_at = self.geometry.len();
        self.geometry.push(command_encode(CMD_LINE_TO, 0));
        let mut count = 0;
        for c in rest {
            let p = self.pixel(*c);
            if p == self.last {
                continue;
            }
            self.push_delta(p);
            count += 1;
        }
        self.geometry[count_at] = command_encode(CMD_LINE_TO, count);
    }

    pub fn make_multi_line(&mut self, lines: &MultiLineString<i32>) {
        for line in &lines.0 {
            self.make_line(line);
        }
    }

    /// Emit one ring, oriented so that outer rings have positive area and
    /// holes negative area in pixel space. Returns `false` if the ring
    /// collapsed below three distinct points and was skipped.
    fn make_ring(&mut self, ring: &LineString<i32>, outer: bool) -> bool {
        let mut points: Vec<Pixel> = Vec::with_capacity(ring.0.len());
        for c in &ring.0 {
            let p = self.pixel(*c);
            if points.last() != Some(&p) {
                points.push(p);
            }
        }
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            log::trace!("skipping ring with {} distinct points", points.len());
            return false;
        }

        let area = pixel_ring_area(&points);
        if area == 0 {
            log::trace!("skipping zero-area ring");
            return false;
        }
        if (area > 0) != outer {
            points.reverse();
        }

        self.geometry.push(command_encode(CMD_MOVE_TO, 1));
        self.push_delta(points[0]);
        self.geometry
            .push(command_encode(CMD_LINE_TO, (points.len() - 1) as u32));
        for p in &points[1..] {
            self.push_delta(*p);
        }
        self.geometry.push(command_encode(CMD_CLOSE_PATH, 1));
        true
    }

    /// Emit a polygon. Holes are dropped individually when degenerate; a
    /// degenerate exterior drops the whole polygon.
    pub fn make_polygon(&mut self, polygon: &Polygon<i32>) {
        if !self.make_ring(polygon.exterior(), true) {
            return;
        }
        for hole in polygon.interiors() {
            self.make_ring(hole, false);
        }
    }

    pub fn make_multi_polygon(&mut self, polygons: &MultiPolygon<i32>) {
        for polygon in &polygons.0 {
            self.make_polygon(polygon);
        }
    }

    /// Encode a pixel-space geometry as a fresh feature.
    pub fn encode(&mut self, geometry: &Geometry<i32>) -> Result<GeomType> {
        self.refresh();
        match geometry {
            Geometry::Point(p) => self.make_point(p),
            Geometry::MultiPoint(mp) => self.make_multi_point(mp),
            Geometry::LineString(ls) => self.make_line(ls),
            Geometry::Line(line) => self.make_line(&LineString::from(*line)),
            Geometry::MultiLineString(mls) => self.make_multi_line(mls),
            Geometry::Polygon(p) => self.make_polygon(p),
            Geometry::MultiPolygon(mp) => self.make_multi_polygon(mp),
            Geometry::Rect(r) => self.make_polygon(&r.to_polygon()),
            Geometry::Triangle(t) => self.make_polygon(&t.to_polygon()),
            Geometry::GeometryCollection(_) => {
                return Err(Error::MvtEncoding(
                    "geometry collections cannot be encoded".to_string(),
                ))
            }
        }
        Ok(GeomType::of(geometry))
    }

    /// Encode a lng/lat geometry, projecting it into this tile first.
    pub fn encode_lng_lat(&mut self, geometry: &Geometry<f64>) -> Result<GeomType> {
        let pixels = geometry.map_coords(|c| {
            let (x, y) = self.project(c.x, c.y);
            Coord { x, y }
        });
        self.encode(&pixels)
    }

    /// Encode a geometry already in pixel space, rounding to integers.
    pub fn encode_pixels(&mut self, geometry: &Geometry<f64>) -> Result<GeomType> {
        let pixels = geometry.map_coords(|c| Coord {
            x: c.x.round() as i32,
            y: c.y.round() as i32,
        });
        self.encode(&pixels)
    }
}

/// Twice the signed shoelace area of an open ring in y-down pixel space.
fn pixel_ring_area(points: &[Pixel]) -> i64 {
    let n = points.len();
    (0..n)
        .map(|i| {
            let (x1, y1) = points[i];
            let (x2, y2) = points[(i + 1) % n];
            x1 as i64 * y2 as i64 - x2 as i64 * y1 as i64
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};

    fn cursor() -> Cursor {
        Cursor::new(TileCoord::new(0, 0, 0), 4096)
    }

    // ------------------------------------------------------------------------
    // Points and lines
    // ------------------------------------------------------------------------

    #[test]
    fn test_point() {
        let mut c = cursor();
        c.encode(&Geometry::Point(point!(x: 25, y: 17))).unwrap();
        assert_eq!(c.geometry(), &[9, 50, 34]);
    }

    #[test]
    fn test_multi_point() {
        let mut c = cursor();
        let mp = MultiPoint::from(vec![(5, 7), (3, 2)]);
        assert_eq!(c.encode(&Geometry::MultiPoint(mp)).unwrap(), GeomType::Point);
        assert_eq!(c.geometry(), &[17, 10, 14, 3, 9]);
    }

    #[test]
    fn test_line() {
        let mut c = cursor();
        let ls = line_string![(x: 2, y: 2), (x: 2, y: 10), (x: 10, y: 10)];
        assert_eq!(c.encode(&Geometry::LineString(ls)).unwrap(), GeomType::LineString);
        assert_eq!(c.geometry(), &[9, 4, 4, 18, 0, 16, 16, 0]);
    }

    #[test]
    fn test_line_skips_zero_deltas() {
        let mut c = cursor();
        let ls = line_string![(x: 2, y: 2), (x: 2, y: 2), (x: 3, y: 2)];
        c.encode(&Geometry::LineString(ls)).unwrap();
        assert_eq!(c.geometry(), &[9, 4, 4, 10, 2, 0]);
    }

    #[test]
    fn test_degenerate_line() {
        let mut c = cursor();
        let ls = line_string![(x: 7, y: 7), (x: 7, y: 7), (x: 7, y: 7)];
        c.encode(&Geometry::LineString(ls)).unwrap();
        assert_eq!(c.geometry(), &[9, 14, 14, command_encode(CMD_LINE_TO, 0)]);
    }

    #[test]
    fn test_refresh_between_features() {
        let mut c = cursor();
        c.encode(&Geometry::Point(point!(x: 100, y: 100))).unwrap();
        c.encode(&Geometry::Point(point!(x: 1, y: 1))).unwrap();
        assert_eq!(c.geometry(), &[9, 2, 2]);
    }

    // ------------------------------------------------------------------------
    // Polygons
    // ------------------------------------------------------------------------

    #[test]
    fn test_polygon_spec_example() {
        let mut c = cursor();
        let p = polygon![(x: 3, y: 6), (x: 8, y: 12), (x: 20, y: 34), (x: 3, y: 6)];
        assert_eq!(c.encode(&Geometry::Polygon(p)).unwrap(), GeomType::Polygon);
        assert_eq!(c.geometry(), &[9, 6, 12, 18, 10, 12, 24, 44, 15]);
    }

    #[test]
    fn test_polygon_is_reoriented() {
        // Counter-clockwise on screen: negative area, must be reversed.
        let p = polygon![(x: 0, y: 0), (x: 0, y: 10), (x: 10, y: 10), (x: 10, y: 0), (x: 0, y: 0)];
        let mut c = cursor();
        c.encode(&Geometry::Polygon(p)).unwrap();
        // Reversed ring starts at (10, 0) and heads to (10, 10).
        assert_eq!(&c.geometry()[..6], &[9, 20, 0, command_encode(CMD_LINE_TO, 3), 0, 20]);
    }

    #[test]
    fn test_hole_orientation() {
        let p = polygon!(
            exterior: [(x: 0, y: 0), (x: 10, y: 0), (x: 10, y: 10), (x: 0, y: 10), (x: 0, y: 0)],
            interiors: [[(x: 2, y: 2), (x: 4, y: 2), (x: 4, y: 4), (x: 2, y: 4), (x: 2, y: 2)]],
        );
        let mut c = cursor();
        c.encode(&Geometry::Polygon(p)).unwrap();
        let g = c.geometry();
        // Two rings: 1 + 2 + 1 + 6 + 1 each
        assert_eq!(g.len(), 22);
        // Reversed hole starts at (2, 4), relative to the exterior's last vertex (0, 10).
        assert_eq!(&g[11..16], &[9, 4, 11, command_encode(CMD_LINE_TO, 3), 4]);
    }

    #[test]
    fn test_degenerate_exterior_drops_polygon() {
        let p = polygon![(x: 0, y: 0), (x: 5, y: 0), (x: 0, y: 0)];
        let mut c = cursor();
        c.encode(&Geometry::Polygon(p)).unwrap();
        assert!(c.geometry().is_empty());
    }

    #[test]
    fn test_clamp_to_extent() {
        let mut c = Cursor::new(TileCoord::new(0, 0, 0), 4096).with_clamp(true);
        c.encode(&Geometry::Point(point!(x: -20, y: 5000))).unwrap();
        assert_eq!(c.geometry(), &[9, 0, zigzag_encode(4096)]);
    }

    #[test]
    fn test_encode_lng_lat() {
        let mut c = cursor();
        c.encode_lng_lat(&Geometry::Point(point!(x: 0.0, y: 0.0))).unwrap();
        assert_eq!(c.geometry(), &[9, zigzag_encode(2048), zigzag_encode(2048)]);
    }

    #[test]
    fn test_geometry_collection_is_rejected() {
        let mut c = cursor();
        let gc = Geometry::GeometryCollection(geo::GeometryCollection(vec![]));
        assert!(matches!(c.encode(&gc), Err(Error::MvtEncoding(_))));
    }
}
