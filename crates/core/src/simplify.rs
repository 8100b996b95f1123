//! Importance-weighted Douglas-Peucker simplification.
//!
//! Instead of deleting vertices, the simplifier records on every retained vertex
//! the squared distance at which it was kept (its *importance*). A tile at any zoom
//! can then drop vertices with a single comparison against that zoom's squared
//! tolerance, without re-running the algorithm.
//!
//! # Tie-breaking
//!
//! When several vertices share the maximum distance from the chord, the one whose
//! index is closest to the middle of the index range wins. The same rule applies to
//! the tiler and to [`simplify_geometry`], so re-simplifying decoded tile geometry
//! keeps the same vertices the tiler would.

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPolygon, Polygon};

use crate::geometry::TilePoint;

/// Squared distance from `(px, py)` to the segment `a`-`b`.
#[inline]
pub fn sq_seg_dist(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let mut x = ax;
    let mut y = ay;
    let dx = bx - ax;
    let dy = by - ay;

    if dx != 0.0 || dy != 0.0 {
        let t = ((px - ax) * dx + (py - ay) * dy) / (dx * dx + dy * dy);
        if t > 1.0 {
            x = bx;
            y = by;
        } else if t > 0.0 {
            x += dx * t;
            y += dy * t;
        }
    }

    let dx = px - x;
    let dy = py - y;
    dx * dx + dy * dy
}

/// Run Douglas-Peucker over `points[first..=last]`, writing importances.
///
/// Vertices that are never retained keep whatever importance they had (zero for
/// freshly converted lines). Endpoints are not touched; see [`simplify_line`].
pub fn simplify(points: &mut [TilePoint], first: usize, last: usize, sq_tolerance: f64) {
    let mut ranges = vec![(first, last)];

    while let Some((first, last)) = ranges.pop() {
        if last <= first + 1 {
            continue;
        }

        let (ax, ay) = (points[first].x, points[first].y);
        let (bx, by) = (points[last].x, points[last].y);
        let mid = (first + last) / 2;

        let mut max_sq_dist = sq_tolerance;
        let mut index = None;
        let mut best_to_mid = usize::MAX;

        for (i, p) in points.iter().enumerate().take(last).skip(first + 1) {
            let d = sq_seg_dist(p.x, p.y, ax, ay, bx, by);
            let to_mid = i.abs_diff(mid);

            if d > max_sq_dist {
                index = Some(i);
                max_sq_dist = d;
                best_to_mid = to_mid;
            } else if d == max_sq_dist && index.is_some() && to_mid < best_to_mid {
                index = Some(i);
                best_to_mid = to_mid;
            }
        }

        if let Some(index) = index {
            points[index].importance = max_sq_dist;
            ranges.push((first, index));
            ranges.push((index, last));
        }
    }
}

/// Mark both endpoints as required and simplify the whole line.
pub fn simplify_line(points: &mut [TilePoint], sq_tolerance: f64) {
    let Some(last) = points.len().checked_sub(1) else {
        return;
    };
    points[0].importance = 1.0;
    points[last].importance = 1.0;
    simplify(points, 0, last, sq_tolerance);
}

/// Whether a vertex survives at `sq_tolerance`. A zero tolerance keeps everything.
#[inline]
pub fn is_retained(point: &TilePoint, tolerance: f64, sq_tolerance: f64) -> bool {
    tolerance == 0.0 || point.importance > sq_tolerance
}

// ============================================================================
// Re-simplification of decoded geometry
// ============================================================================

/// Simplify a geometry given in tile pixel coordinates with `tolerance` pixels.
///
/// Endpoints of lines and the closing vertex of rings are always kept. Rings that
/// collapse below four vertices are dropped; a polygon whose exterior collapses is
/// dropped entirely, in which case `None` is returned for a single polygon.
pub fn simplify_geometry(geometry: &Geometry<f64>, tolerance: f64) -> Option<Geometry<f64>> {
    let sq_tolerance = tolerance * tolerance;
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => Some(geometry.clone()),
        Geometry::LineString(line) => {
            simplify_coords(&line.0, sq_tolerance).map(|c| Geometry::LineString(LineString::new(c)))
        }
        Geometry::MultiLineString(lines) => {
            let lines: Vec<LineString<f64>> = lines
                .iter()
                .filter_map(|line| simplify_coords(&line.0, sq_tolerance).map(LineString::new))
                .collect();
            (!lines.is_empty()).then(|| Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        Geometry::Polygon(polygon) => {
            simplify_polygon(polygon, sq_tolerance).map(Geometry::Polygon)
        }
        Geometry::MultiPolygon(polygons) => {
            let polygons: Vec<Polygon<f64>> = polygons
                .iter()
                .filter_map(|polygon| simplify_polygon(polygon, sq_tolerance))
                .collect();
            (!polygons.is_empty()).then(|| Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
        other => Some(other.clone()),
    }
}

fn simplify_polygon(polygon: &Polygon<f64>, sq_tolerance: f64) -> Option<Polygon<f64>> {
    let exterior = simplify_ring(&polygon.exterior().0, sq_tolerance)?;
    let interiors = polygon
        .interiors()
        .iter()
        .filter_map(|ring| simplify_ring(&ring.0, sq_tolerance))
        .collect();
    Some(Polygon::new(exterior, interiors))
}

fn simplify_ring(coords: &[Coord<f64>], sq_tolerance: f64) -> Option<LineString<f64>> {
    let kept = simplify_coords(coords, sq_tolerance)?;
    (kept.len() >= 4).then(|| LineString::new(kept))
}

fn simplify_coords(coords: &[Coord<f64>], sq_tolerance: f64) -> Option<Vec<Coord<f64>>> {
    if coords.len() < 2 {
        return None;
    }

    let mut points: Vec<TilePoint> = coords
        .iter()
        .map(|c| TilePoint::new(c.x, c.y, 0.0))
        .collect();
    simplify_line(&mut points, sq_tolerance);

    let last = points.len() - 1;
    Some(
        points
            .iter()
            .enumerate()
            .filter(|(i, p)| *i == 0 || *i == last || p.importance > sq_tolerance)
            .map(|(_, p)| Coord { x: p.x, y: p.y })
            .collect(),
    )
}
