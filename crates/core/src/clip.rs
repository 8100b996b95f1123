//! Axis-interval clipping.
//!
//! Every clip in the crate is a 1-D operation: keep the part of a geometry whose
//! x (or y) coordinate lies in `[k1, k2]`. A rectangular clip is two of these in a
//! row. The same routines serve two callers:
//!
//! - the tiler, which slices [`TileFeature`]s in projected world space with a
//!   buffer margin around each child tile, and
//! - the zoom-pyramid clipper, which cuts lng/lat `geo` geometries along tile
//!   midpoints with no buffer.
//!
//! Both go through the [`AxisPoint`] trait so the interpolation logic exists once.
//!
//! # Behaviour
//!
//! - Intersection points are inserted exactly on the interval boundary.
//! - Lines that leave and re-enter the interval are split into several lines.
//! - Polygon rings are never split; if clipping opens a ring it is closed again
//!   by repeating its first point.

use geo::Coord;

use crate::geometry::{TileFeature, TileGeometry, TileLine, TilePoint};

/// The coordinate axis a clip operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// A coordinate type the interval clipper can slice.
pub trait AxisPoint: Copy + PartialEq {
    /// The coordinate along `axis`.
    fn coord(&self, axis: Axis) -> f64;

    /// The point on segment `a`-`b` whose `axis` coordinate equals `k`.
    ///
    /// Implementations must not divide by zero when the segment has no extent
    /// along `axis`; the boundary point at `a` is returned instead.
    fn intersect(a: &Self, b: &Self, k: f64, axis: Axis) -> Self;
}

/// Interpolate the coordinate on the other axis where the segment crosses `k`.
#[inline]
fn interpolate(a_on: f64, a_off: f64, b_on: f64, b_off: f64, k: f64) -> f64 {
    let span = b_on - a_on;
    if span == 0.0 {
        return a_off;
    }
    let t = (k - a_on) / span;
    a_off + (b_off - a_off) * t
}

impl AxisPoint for TilePoint {
    #[inline]
    fn coord(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    /// Intersections are never simplified away, so they get importance 1.
    fn intersect(a: &Self, b: &Self, k: f64, axis: Axis) -> Self {
        match axis {
            Axis::X => TilePoint::new(k, interpolate(a.x, a.y, b.x, b.y, k), 1.0),
            Axis::Y => TilePoint::new(interpolate(a.y, a.x, b.y, b.x, k), k, 1.0),
        }
    }
}

impl AxisPoint for Coord<f64> {
    #[inline]
    fn coord(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    fn intersect(a: &Self, b: &Self, k: f64, axis: Axis) -> Self {
        match axis {
            Axis::X => Coord {
                x: k,
                y: interpolate(a.x, a.y, b.x, b.y, k),
            },
            Axis::Y => Coord {
                x: interpolate(a.y, a.x, b.y, b.x, k),
                y: k,
            },
        }
    }
}

// ============================================================================
// Coordinate Sequence Clipping
// ============================================================================

/// Keep the points whose `axis` coordinate lies in `[k1, k2]`.
pub fn clip_points<P: AxisPoint>(points: &[P], k1: f64, k2: f64, axis: Axis) -> Vec<P> {
    points
        .iter()
        .filter(|p| {
            let a = p.coord(axis);
            a >= k1 && a <= k2
        })
        .copied()
        .collect()
}

/// Clip a line or ring to `[k1, k2]` along `axis`.
///
/// Returns zero or more lines for open lines, and at most one ring for polygons.
pub fn clip_line<P: AxisPoint>(
    line: &[P],
    k1: f64,
    k2: f64,
    axis: Axis,
    is_polygon: bool,
) -> Vec<Vec<P>> {
    let mut out = Vec::new();
    let Some(last_point) = line.last() else {
        return out;
    };

    let mut slice: Vec<P> = Vec::with_capacity(line.len());

    for pair in line.windows(2) {
        let (a_point, b_point) = (&pair[0], &pair[1]);
        let a = a_point.coord(axis);
        let b = b_point.coord(axis);
        let mut exited = false;

        if a < k1 {
            // ---|-->  |
            if b > k1 {
                slice.push(P::intersect(a_point, b_point, k1, axis));
            }
        } else if a > k2 {
            // |  <--|---
            if b < k2 {
                slice.push(P::intersect(a_point, b_point, k2, axis));
            }
        } else {
            slice.push(*a_point);
        }

        if b < k1 && a >= k1 {
            // <--|---  |
            slice.push(P::intersect(a_point, b_point, k1, axis));
            exited = true;
        }
        if b > k2 && a <= k2 {
            // |  ---|-->
            slice.push(P::intersect(a_point, b_point, k2, axis));
            exited = true;
        }

        if !is_polygon && exited {
            out.push(std::mem::take(&mut slice));
        }
    }

    let a = last_point.coord(axis);
    if a >= k1 && a <= k2 {
        slice.push(*last_point);
    }

    if is_polygon {
        if let (Some(first), Some(last)) = (slice.first().copied(), slice.last().copied()) {
            if first != last {
                slice.push(first);
            }
        }
    }

    if !slice.is_empty() {
        out.push(slice);
    }
    out
}

/// Clip every line of a multi-line (or every ring of a polygon), flattening the result.
pub fn clip_lines<P: AxisPoint>(
    lines: &[Vec<P>],
    k1: f64,
    k2: f64,
    axis: Axis,
    is_polygon: bool,
) -> Vec<Vec<P>> {
    lines
        .iter()
        .flat_map(|line| clip_line(line, k1, k2, axis, is_polygon))
        .collect()
}

/// Clip a polygon's rings. The polygon disappears if its exterior does.
pub fn clip_polygon<P: AxisPoint>(rings: &[Vec<P>], k1: f64, k2: f64, axis: Axis) -> Option<Vec<Vec<P>>> {
    let (exterior, interiors) = rings.split_first()?;
    let mut clipped = clip_line(exterior, k1, k2, axis, true);
    if clipped.is_empty() {
        return None;
    }
    clipped.extend(clip_lines(interiors, k1, k2, axis, true));
    Some(clipped)
}

// ============================================================================
// Tiler Geometry Clipping
// ============================================================================

/// Clip a tiler geometry, collapsing single-member multi-geometries.
pub fn clip_geometry(geometry: &TileGeometry, k1: f64, k2: f64, axis: Axis) -> Option<TileGeometry> {
    match geometry {
        TileGeometry::Point(p) => {
            let a = p.coord(axis);
            (a >= k1 && a <= k2).then_some(TileGeometry::Point(*p))
        }
        TileGeometry::MultiPoint(points) => {
            let mut kept = clip_points(points, k1, k2, axis);
            match kept.len() {
                0 => None,
                1 => kept.pop().map(TileGeometry::Point),
                _ => Some(TileGeometry::MultiPoint(kept)),
            }
        }
        TileGeometry::LineString(line) => lines_geometry(clip_line(line, k1, k2, axis, false)),
        TileGeometry::MultiLineString(lines) => {
            lines_geometry(clip_lines(lines, k1, k2, axis, false))
        }
        TileGeometry::Polygon(rings) => {
            clip_polygon(rings, k1, k2, axis).map(TileGeometry::Polygon)
        }
        TileGeometry::MultiPolygon(polygons) => {
            let mut kept: Vec<Vec<TileLine>> = polygons
                .iter()
                .filter_map(|rings| clip_polygon(rings, k1, k2, axis))
                .collect();
            match kept.len() {
                0 => None,
                1 => kept.pop().map(TileGeometry::Polygon),
                _ => Some(TileGeometry::MultiPolygon(kept)),
            }
        }
    }
}

fn lines_geometry(mut lines: Vec<TileLine>) -> Option<TileGeometry> {
    match lines.len() {
        0 => None,
        1 => lines.pop().map(TileGeometry::LineString),
        _ => Some(TileGeometry::MultiLineString(lines)),
    }
}

/// Clip a feature set to `[k1, k2] / scale` along `axis`.
///
/// `min_all` / `max_all` bound the whole set along `axis`; when the set lies
/// entirely inside or outside the interval the per-feature work is skipped.
/// Features are checked against their own bbox the same way before any
/// geometry is touched.
pub fn clip_features(
    features: &[TileFeature],
    scale: f64,
    k1: f64,
    k2: f64,
    axis: Axis,
    min_all: f64,
    max_all: f64,
) -> Vec<TileFeature> {
    let k1 = k1 / scale;
    let k2 = k2 / scale;

    if min_all >= k1 && max_all < k2 {
        return features.to_vec();
    }
    if max_all < k1 || min_all >= k2 {
        return Vec::new();
    }

    features
        .iter()
        .filter_map(|feature| {
            let bbox = feature.bbox();
            let (min, max) = match axis {
                Axis::X => (bbox.min_x, bbox.max_x),
                Axis::Y => (bbox.min_y, bbox.max_y),
            };

            if min >= k1 && max < k2 {
                return Some(feature.clone());
            }
            if max < k1 || min >= k2 {
                return None;
            }

            clip_geometry(feature.geometry(), k1, k2, axis).map(|g| feature.with_geometry(g))
        })
        .collect()
}

// ============================================================================
// Antimeridian Wrapping
// ============================================================================

/// Duplicate features that cross the antimeridian onto the other side of the world.
///
/// Features whose bbox stays inside `[0, 1]` pass through untouched. Each crossing
/// feature is replaced by its part inside `[-buffer, 1 + buffer]`, plus its part
/// in `[-1 - buffer, buffer]` shifted east by one world and its part in
/// `[1 - buffer, 2 + buffer]` shifted west by one world. `buffer` is in world units.
pub fn wrap(features: Vec<TileFeature>, buffer: f64) -> Vec<TileFeature> {
    let (crossing, mut inside): (Vec<TileFeature>, Vec<TileFeature>) = features
        .into_iter()
        .partition(|f| f.bbox().min_x < 0.0 || f.bbox().max_x > 1.0);

    if crossing.is_empty() {
        return inside;
    }

    log::debug!(
        "Wrapping {} features across the antimeridian",
        crossing.len()
    );

    let left = clip_features(&crossing, 1.0, -1.0 - buffer, buffer, Axis::X, -1.0, 2.0);
    let right = clip_features(&crossing, 1.0, 1.0 - buffer, 2.0 + buffer, Axis::X, -1.0, 2.0);

    inside.extend(clip_features(
        &crossing,
        1.0,
        -buffer,
        1.0 + buffer,
        Axis::X,
        -1.0,
        2.0,
    ));
    inside.extend(shift_features(&left, 1.0));
    inside.extend(shift_features(&right, -1.0));
    inside
}

fn shift_features(features: &[TileFeature], dx: f64) -> impl Iterator<Item = TileFeature> + '_ {
    features.iter().map(move |feature| {
        let mut geometry = feature.geometry().clone();
        geometry.translate_x(dx);
        feature.with_geometry(geometry)
    })
}
