//! Zoom-pyramid clipping of single lng/lat features.
//!
//! Where the tiler rebuilds a pyramid from GeoJSON, these functions take one
//! already-built [`Feature`] and cut it down to a deeper zoom by repeated
//! quadrant bisection along tile midpoints. There is no buffer: a child holds
//! exactly the part of its parent inside the child's bounds.
//!
//! A polygon that exactly covers a tile (a single rectangular ring matching the
//! tile bounds within [`BOUNDS_EPSILON`]) is not clipped. Each child gets the
//! square of its own bounds instead, which again matches on the next level.

use std::collections::HashMap;

use geo::{
    BoundingRect, Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon,
};
use rayon::prelude::*;

use crate::clip::{clip_line, clip_lines, clip_points, Axis};
use crate::mvt::Feature;
use crate::tile::{lng_lat_to_tile, TileBounds, TileCoord};

/// Tolerance in degrees when comparing bounds and ring endpoints.
pub const BOUNDS_EPSILON: f64 = 1e-7;

/// Deepest zoom [`first_zoom`] descends to.
pub const MAX_PYRAMID_ZOOM: u8 = 30;

/// True if all four edges of `a` and `b` are within [`BOUNDS_EPSILON`].
pub fn delta_bounds(a: &TileBounds, b: &TileBounds) -> bool {
    (a.lng_min - b.lng_min).abs() < BOUNDS_EPSILON
        && (a.lat_min - b.lat_min).abs() < BOUNDS_EPSILON
        && (a.lng_max - b.lng_max).abs() < BOUNDS_EPSILON
        && (a.lat_max - b.lat_max).abs() < BOUNDS_EPSILON
}

fn nearly_equal(a: &Coord<f64>, b: &Coord<f64>) -> bool {
    (a.x - b.x).abs() <= BOUNDS_EPSILON && (a.y - b.y).abs() <= BOUNDS_EPSILON
}

/// Close a ring before clipping. A ring whose ends already meet within
/// [`BOUNDS_EPSILON`] gets its last point snapped onto the first; otherwise
/// the first point is appended.
pub fn lint_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords = ring.0.clone();
    let Some(&first) = coords.first() else {
        return coords;
    };
    let last = coords.len() - 1;
    if nearly_equal(&first, &coords[last]) {
        coords[last] = first;
    } else {
        coords.push(first);
    }
    coords
}

/// [`lint_ring`] applied to every ring of a polygon, exterior first.
pub fn lint_polygon(polygon: &Polygon<f64>) -> Vec<Vec<Coord<f64>>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(lint_ring)
        .collect()
}

/// The square covering `bounds`, wound counter-clockwise from the north-east corner.
pub fn tile_square(bounds: &TileBounds) -> Polygon<f64> {
    let (w, s, e, n) = (bounds.lng_min, bounds.lat_min, bounds.lng_max, bounds.lat_max);
    Polygon::new(
        LineString::from(vec![(e, n), (w, n), (w, s), (e, s), (e, n)]),
        Vec::new(),
    )
}

/// True if `geometry` is a plain rectangle covering exactly `bounds`.
fn covers_exactly(geometry: &Geometry<f64>, bounds: &TileBounds) -> bool {
    let Geometry::Polygon(polygon) = geometry else {
        return false;
    };
    if !polygon.interiors().is_empty() || !(4..=5).contains(&polygon.exterior().0.len()) {
        return false;
    }
    polygon
        .bounding_rect()
        .is_some_and(|rect| delta_bounds(&TileBounds::from(rect), bounds))
}

// ============================================================================
// Axis clipping of geo geometries
// ============================================================================

fn lines_geometry(mut lines: Vec<Vec<Coord<f64>>>) -> Option<Geometry<f64>> {
    match lines.len() {
        0 => None,
        1 => lines.pop().map(|l| Geometry::LineString(LineString::new(l))),
        _ => Some(Geometry::MultiLineString(MultiLineString::new(
            lines.into_iter().map(LineString::new).collect(),
        ))),
    }
}

fn clip_polygon_rings(polygon: &Polygon<f64>, k1: f64, k2: f64, axis: Axis) -> Option<Polygon<f64>> {
    let rings = lint_polygon(polygon);
    let (exterior, interiors) = rings.split_first()?;
    let mut exterior = clip_line(exterior, k1, k2, axis, true);
    let exterior = exterior.pop()?;
    let interiors = clip_lines(interiors, k1, k2, axis, true)
        .into_iter()
        .map(LineString::new)
        .collect();
    Some(Polygon::new(LineString::new(exterior), interiors))
}

/// Keep the part of `geometry` whose `axis` coordinate lies in `[k1, k2]`.
///
/// Results are collapsed to the simplest type: a line clipped into one piece
/// stays a `LineString`, a multi-polygon left with one member becomes a
/// `Polygon`. `None` means nothing is left.
pub fn clip_axis(geometry: &Geometry<f64>, k1: f64, k2: f64, axis: Axis) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(p) => {
            let kept = clip_points(&[p.0], k1, k2, axis);
            kept.first().map(|c| Geometry::Point(Point(*c)))
        }
        Geometry::MultiPoint(points) => {
            let coords: Vec<Coord<f64>> = points.iter().map(|p| p.0).collect();
            let kept = clip_points(&coords, k1, k2, axis);
            (!kept.is_empty()).then(|| {
                Geometry::MultiPoint(MultiPoint::new(kept.into_iter().map(Point).collect()))
            })
        }
        Geometry::Line(line) => {
            lines_geometry(clip_line(&[line.start, line.end], k1, k2, axis, false))
        }
        Geometry::LineString(line) => lines_geometry(clip_line(&line.0, k1, k2, axis, false)),
        Geometry::MultiLineString(lines) => {
            let lines: Vec<Vec<Coord<f64>>> = lines.iter().map(|l| l.0.clone()).collect();
            lines_geometry(clip_lines(&lines, k1, k2, axis, false))
        }
        Geometry::Polygon(polygon) => {
            clip_polygon_rings(polygon, k1, k2, axis).map(Geometry::Polygon)
        }
        Geometry::MultiPolygon(polygons) => {
            let mut clipped: Vec<Polygon<f64>> = polygons
                .iter()
                .filter_map(|p| clip_polygon_rings(p, k1, k2, axis))
                .collect();
            match clipped.len() {
                0 => None,
                1 => clipped.pop().map(Geometry::Polygon),
                _ => Some(Geometry::MultiPolygon(MultiPolygon::new(clipped))),
            }
        }
        Geometry::Rect(rect) => clip_axis(&Geometry::Polygon(rect.to_polygon()), k1, k2, axis),
        Geometry::Triangle(triangle) => {
            clip_axis(&Geometry::Polygon(triangle.to_polygon()), k1, k2, axis)
        }
        Geometry::GeometryCollection(collection) => {
            let members: Vec<Geometry<f64>> = collection
                .iter()
                .filter_map(|g| clip_axis(g, k1, k2, axis))
                .collect();
            (!members.is_empty()).then(|| Geometry::GeometryCollection(GeometryCollection(members)))
        }
    }
}

/// Clip `geometry` to `bounds`, x first.
pub fn clip_to_bounds(geometry: &Geometry<f64>, bounds: &TileBounds) -> Option<Geometry<f64>> {
    let clipped = clip_axis(geometry, bounds.lng_min, bounds.lng_max, Axis::X)?;
    clip_axis(&clipped, bounds.lat_min, bounds.lat_max, Axis::Y)
}

// ============================================================================
// Points
// ============================================================================

fn point_coords(geometry: &Geometry<f64>) -> Option<Vec<Coord<f64>>> {
    match geometry {
        Geometry::Point(p) => Some(vec![p.0]),
        Geometry::MultiPoint(points) => Some(points.iter().map(|p| p.0).collect()),
        _ => None,
    }
}

fn points_geometry(mut coords: Vec<Coord<f64>>) -> Geometry<f64> {
    if coords.len() == 1 {
        if let Some(c) = coords.pop() {
            return Geometry::Point(Point(c));
        }
    }
    Geometry::MultiPoint(MultiPoint::new(coords.into_iter().map(Point).collect()))
}

/// Keep the points of a point or multi-point feature that fall in `tile`.
///
/// A multi-point left with one member becomes a point. `None` if no point is
/// in the tile or the feature has no point geometry.
pub fn point_clip_about_tile(feature: &Feature, tile: TileCoord) -> Option<Feature> {
    let kept: Vec<Coord<f64>> = point_coords(&feature.geometry)?
        .into_iter()
        .filter(|c| lng_lat_to_tile(c.x, c.y, tile.z) == tile)
        .collect();
    if kept.is_empty() {
        return None;
    }
    Some(Feature::new(
        feature.id,
        points_geometry(kept),
        feature.properties.clone(),
    ))
}

/// Bucket the points of a point or multi-point feature by their tile at `zoom`.
pub fn point_clip_about_zoom(feature: &Feature, zoom: u8) -> HashMap<TileCoord, Feature> {
    let Some(coords) = point_coords(&feature.geometry) else {
        return HashMap::new();
    };
    let mut buckets: HashMap<TileCoord, Vec<Coord<f64>>> = HashMap::new();
    for c in coords {
        buckets
            .entry(lng_lat_to_tile(c.x, c.y, zoom))
            .or_default()
            .push(c);
    }
    buckets
        .into_iter()
        .map(|(tile, coords)| {
            let geometry = points_geometry(coords);
            (tile, Feature::new(feature.id, geometry, feature.properties.clone()))
        })
        .collect()
}

// ============================================================================
// Pyramid
// ============================================================================

/// Clip a feature to the bounds of `tile`.
pub fn clip_tile(feature: &Feature, tile: TileCoord) -> Option<Feature> {
    if point_coords(&feature.geometry).is_some() {
        return point_clip_about_tile(feature, tile);
    }
    let geometry = clip_to_bounds(&feature.geometry, &tile.bounds())?;
    Some(Feature::new(feature.id, geometry, feature.properties.clone()))
}

/// Split a geometry lying in `tile` into its four children.
///
/// Children the geometry does not reach are absent from the result.
pub fn clip_down_tile(geometry: &Geometry<f64>, tile: TileCoord) -> HashMap<TileCoord, Geometry<f64>> {
    let bounds = tile.bounds();
    let children = tile.children();

    if covers_exactly(geometry, &bounds) {
        return children
            .iter()
            .map(|child| (*child, Geometry::Polygon(tile_square(&child.bounds()))))
            .collect();
    }

    // The top-left child's south-east corner is the tile midpoint.
    let mid = children[0].bounds();
    let (mx, my) = (mid.lng_max, mid.lat_min);

    let halves = |half: Option<Geometry<f64>>| match half {
        Some(g) => (
            clip_axis(&g, my, bounds.lat_max, Axis::Y),
            clip_axis(&g, bounds.lat_min, my, Axis::Y),
        ),
        None => (None, None),
    };
    let ((top_left, bottom_left), (top_right, bottom_right)) = rayon::join(
        || halves(clip_axis(geometry, bounds.lng_min, mx, Axis::X)),
        || halves(clip_axis(geometry, mx, bounds.lng_max, Axis::X)),
    );

    let [tl, tr, br, bl] = children;
    [(tl, top_left), (tr, top_right), (br, bottom_right), (bl, bottom_left)]
        .into_iter()
        .filter_map(|(child, g)| g.map(|g| (child, g)))
        .collect()
}

/// The deepest tile containing all four corners of `bounds`.
pub fn first_zoom(bounds: &TileBounds) -> TileCoord {
    let corner = |z: u8| lng_lat_to_tile(bounds.lng_max, bounds.lat_max, z);
    for z in 1..=MAX_PYRAMID_ZOOM {
        let ne = corner(z);
        let others = [
            lng_lat_to_tile(bounds.lng_max, bounds.lat_min, z),
            lng_lat_to_tile(bounds.lng_min, bounds.lat_max, z),
            lng_lat_to_tile(bounds.lng_min, bounds.lat_min, z),
        ];
        if others.iter().any(|t| *t != ne) {
            return corner(z - 1);
        }
    }
    corner(MAX_PYRAMID_ZOOM)
}

/// Clip a feature into every tile it touches at `end_zoom`.
///
/// Clipping starts at the deepest tile containing the whole feature and
/// bisects one zoom at a time. With `keep_parents` the tiles of every
/// intermediate zoom, starting tile included, stay in the result. A feature
/// that fits in one tile at `end_zoom` or deeper is returned unclipped under
/// its ancestor at `end_zoom`.
pub fn clip_feature(feature: &Feature, end_zoom: u8, keep_parents: bool) -> HashMap<TileCoord, Feature> {
    if point_coords(&feature.geometry).is_some() {
        return point_clip_about_zoom(feature, end_zoom);
    }
    let Some(rect) = feature.geometry.bounding_rect() else {
        return HashMap::new();
    };

    let start = first_zoom(&TileBounds::from(rect));
    let make = |geometry: Geometry<f64>| Feature::new(feature.id, geometry, feature.properties.clone());

    if start.z >= end_zoom {
        return start
            .ancestor_at(end_zoom)
            .map(|tile| (tile, feature.clone()))
            .into_iter()
            .collect();
    }

    let mut out = HashMap::new();
    if keep_parents {
        out.insert(start, feature.clone());
    }

    let mut level: Vec<(TileCoord, Geometry<f64>)> = vec![(start, feature.geometry.clone())];
    for z in start.z..end_zoom {
        level = level
            .par_iter()
            .flat_map_iter(|(tile, geometry)| clip_down_tile(geometry, *tile))
            .collect();
        log::trace!("Clipped feature into {} tiles at zoom {}", level.len(), z + 1);
        if keep_parents || z + 1 == end_zoom {
            out.extend(level.iter().map(|(tile, g)| (*tile, make(g.clone()))));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::{Properties, PropertyValue};
    use geo::{line_string, point, polygon};

    fn feature(geometry: Geometry<f64>) -> Feature {
        let mut properties = Properties::new();
        properties.insert("name".to_string(), PropertyValue::from("f"));
        Feature::new(Some(9), geometry, properties)
    }

    fn assert_within(geometry: &Geometry<f64>, bounds: &TileBounds) {
        let rect = geometry.bounding_rect().unwrap();
        assert!(rect.min().x >= bounds.lng_min - 1e-9);
        assert!(rect.max().x <= bounds.lng_max + 1e-9);
        assert!(rect.min().y >= bounds.lat_min - 1e-9);
        assert!(rect.max().y <= bounds.lat_max + 1e-9);
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    #[test]
    fn test_delta_bounds() {
        let a = TileCoord::new(3, 5, 4).bounds();
        let mut b = a;
        b.lng_min += 5e-8;
        assert!(delta_bounds(&a, &b));
        b.lat_max += 1e-6;
        assert!(!delta_bounds(&a, &b));
    }

    #[test]
    fn test_lint_ring() {
        let open = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let linted = lint_ring(&open);
        assert_eq!(linted.len(), 4);
        assert_eq!(linted[0], linted[3]);

        let nearly = line_string![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 5e-8),
        ];
        let linted = lint_ring(&nearly);
        assert_eq!(linted.len(), 4);
        assert_eq!(linted[3], Coord { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_first_zoom() {
        let bounds = TileCoord::new(5, 3, 4).bounds();
        let inner = TileBounds::new(
            bounds.lng_min + 0.1,
            bounds.lat_min + 0.1,
            bounds.lng_max - 0.1,
            bounds.lat_max - 0.1,
        );
        assert_eq!(first_zoom(&inner), TileCoord::new(5, 3, 4));

        // Straddles the prime meridian and the equator.
        let world = TileBounds::new(-1.0, -1.0, 1.0, 1.0);
        assert_eq!(first_zoom(&world), TileCoord::new(0, 0, 0));
    }

    // ------------------------------------------------------------------------
    // Clipping
    // ------------------------------------------------------------------------

    #[test]
    fn test_clip_axis_splits_line() {
        let line = Geometry::LineString(line_string![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ]);
        match clip_axis(&line, 0.0, 5.0, Axis::X) {
            Some(Geometry::MultiLineString(lines)) => assert_eq!(lines.0.len(), 2),
            other => panic!("expected two lines, got {:?}", other),
        }
        assert!(clip_axis(&line, 20.0, 30.0, Axis::X).is_none());
    }

    #[test]
    fn test_clip_axis_keeps_ring_closed() {
        let square = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]);
        match clip_axis(&square, 0.25, 0.75, Axis::X) {
            Some(Geometry::Polygon(p)) => {
                let ring = &p.exterior().0;
                assert_eq!(ring.len(), 5);
                assert_eq!(ring.first(), ring.last());
                assert!(ring.iter().all(|c| c.x >= 0.25 && c.x <= 0.75));
            }
            other => panic!("expected a polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_clip_tile_polygon() {
        let tile = TileCoord::new(0, 0, 1);
        let polygon = Geometry::Polygon(polygon![
            (x: -100.0, y: -10.0),
            (x: 10.0, y: -10.0),
            (x: 10.0, y: 40.0),
            (x: -100.0, y: 40.0),
        ]);
        let clipped = clip_tile(&feature(polygon), tile).unwrap();
        assert_eq!(clipped.id, Some(9));
        assert_within(&clipped.geometry, &tile.bounds());
        let rect = clipped.geometry.bounding_rect().unwrap();
        assert!((rect.max().x - 0.0).abs() < 1e-9);
        assert!((rect.min().y - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_clip_about_tile() {
        let tile = lng_lat_to_tile(10.0, 10.0, 3);
        let points = Geometry::MultiPoint(MultiPoint::new(vec![
            point!(x: 10.0, y: 10.0),
            point!(x: -120.0, y: -40.0),
        ]));
        let clipped = point_clip_about_tile(&feature(points.clone()), tile).unwrap();
        assert_eq!(clipped.geometry, Geometry::Point(point!(x: 10.0, y: 10.0)));

        let elsewhere = lng_lat_to_tile(100.0, 60.0, 3);
        assert!(point_clip_about_tile(&feature(points), elsewhere).is_none());
    }

    #[test]
    fn test_point_clip_about_zoom() {
        let points = Geometry::MultiPoint(MultiPoint::new(vec![
            point!(x: 10.0, y: 10.0),
            point!(x: 10.1, y: 10.1),
            point!(x: -120.0, y: -40.0),
        ]));
        let buckets = point_clip_about_zoom(&feature(points), 2);
        assert_eq!(buckets.len(), 2);
        match &buckets[&lng_lat_to_tile(10.0, 10.0, 2)].geometry {
            Geometry::MultiPoint(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected a multi-point, got {:?}", other),
        }
        assert!(matches!(
            buckets[&lng_lat_to_tile(-120.0, -40.0, 2)].geometry,
            Geometry::Point(_)
        ));
    }

    // ------------------------------------------------------------------------
    // Pyramid
    // ------------------------------------------------------------------------

    #[test]
    fn test_clip_down_tile_quadrants() {
        let tile = TileCoord::new(0, 0, 0);
        let line = Geometry::LineString(line_string![(x: -90.0, y: 45.0), (x: 90.0, y: 45.0)]);
        let children = clip_down_tile(&line, tile);
        assert_eq!(children.len(), 2);
        assert!(children.contains_key(&TileCoord::new(0, 0, 1)));
        assert!(children.contains_key(&TileCoord::new(1, 0, 1)));
        for (child, geometry) in &children {
            assert_within(geometry, &child.bounds());
        }
    }

    #[test]
    fn test_clip_down_full_tile_square() {
        let tile = TileCoord::new(2, 1, 2);
        let square = Geometry::Polygon(tile_square(&tile.bounds()));
        let children = clip_down_tile(&square, tile);
        assert_eq!(children.len(), 4);
        for (child, geometry) in &children {
            assert_eq!(geometry, &Geometry::Polygon(tile_square(&child.bounds())));
        }
    }

    #[test]
    fn test_clip_feature_to_end_zoom() {
        let line = Geometry::LineString(line_string![(x: 1.0, y: 1.0), (x: 30.0, y: 20.0)]);
        let tiles = clip_feature(&feature(line), 4, false);
        assert!(!tiles.is_empty());
        for (tile, clipped) in &tiles {
            assert_eq!(tile.z, 4);
            assert_eq!(clipped.properties.get("name"), Some(&PropertyValue::from("f")));
            assert_within(&clipped.geometry, &tile.bounds());
        }
    }

    #[test]
    fn test_clip_feature_keep_parents() {
        let line = Geometry::LineString(line_string![(x: 1.0, y: 1.0), (x: 30.0, y: 20.0)]);
        let tiles = clip_feature(&feature(line), 4, true);
        let start = tiles.keys().map(|t| t.z).min().unwrap();
        for z in start..=4 {
            assert!(tiles.keys().any(|t| t.z == z));
        }
    }

    #[test]
    fn test_clip_feature_shallower_than_first_zoom() {
        let line = Geometry::LineString(line_string![(x: 1.0, y: 1.0), (x: 1.001, y: 1.001)]);
        let tiles = clip_feature(&feature(line.clone()), 3, false);
        assert_eq!(tiles.len(), 1);
        let (tile, clipped) = tiles.into_iter().next().unwrap();
        assert_eq!(tile, lng_lat_to_tile(1.0, 1.0, 3));
        assert_eq!(clipped.geometry, line);
    }
}
