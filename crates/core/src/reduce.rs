//! Feature reduction for crowded tiles.
//!
//! Applied while writing a layer: points that fall into an already occupied
//! sub-tile eight zoom levels below the target tile are dropped, multi-points
//! are collapsed to their centroid, and lines or polygons too small to see at
//! this zoom are discarded.

use std::collections::HashSet;

use geo::{BoundingRect, Centroid, Geometry, Point};

use crate::tile::{lng_lat_to_tile, TileBounds, TileCoord};

/// Zoom levels below the tile at which point occupancy is tracked.
const POINT_GRID_DEPTH: u8 = 8;

/// Minimum bbox span of a line or polygon, as a fraction of the tile.
const MIN_SIZE_FRACTION: f64 = 0.005;

/// What to do with one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Reduction {
    Keep,
    /// Replace the geometry with this point.
    Collapse(Point<f64>),
    Drop,
}

/// Per-layer reduction state.
#[derive(Debug, Clone)]
pub struct ReduceConfig {
    grid_zoom: u8,
    occupied: HashSet<TileCoord>,
    min_width: f64,
    min_height: f64,
}

impl ReduceConfig {
    pub fn new(tile: TileCoord) -> Self {
        let bounds: TileBounds = tile.bounds();
        Self {
            grid_zoom: tile.z.saturating_add(POINT_GRID_DEPTH).min(31),
            occupied: HashSet::new(),
            min_width: bounds.width() * MIN_SIZE_FRACTION,
            min_height: bounds.height() * MIN_SIZE_FRACTION,
        }
    }

    fn claim(&mut self, point: &Point<f64>) -> bool {
        self.occupied
            .insert(lng_lat_to_tile(point.x(), point.y(), self.grid_zoom))
    }

    /// Decide the fate of a lng/lat geometry.
    pub fn filter(&mut self, geometry: &Geometry<f64>) -> Reduction {
        match geometry {
            Geometry::Point(p) => {
                if self.claim(p) {
                    Reduction::Keep
                } else {
                    Reduction::Drop
                }
            }
            Geometry::MultiPoint(mp) => match mp.centroid() {
                Some(c) if self.claim(&c) => Reduction::Collapse(c),
                _ => Reduction::Drop,
            },
            other => match other.bounding_rect() {
                Some(r) if r.width() > self.min_width || r.height() > self.min_height => {
                    Reduction::Keep
                }
                _ => Reduction::Drop,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, MultiPoint};

    #[test]
    fn test_duplicate_points_are_dropped() {
        let mut reduce = ReduceConfig::new(TileCoord::new(0, 0, 0));
        let a = Geometry::Point(point!(x: 10.0, y: 10.0));
        let b = Geometry::Point(point!(x: 10.01, y: 10.01));
        let c = Geometry::Point(point!(x: -40.0, y: 20.0));
        assert_eq!(reduce.filter(&a), Reduction::Keep);
        assert_eq!(reduce.filter(&b), Reduction::Drop);
        assert_eq!(reduce.filter(&c), Reduction::Keep);
    }

    #[test]
    fn test_multi_point_collapses_to_centroid() {
        let mut reduce = ReduceConfig::new(TileCoord::new(0, 0, 0));
        let mp = Geometry::MultiPoint(MultiPoint::from(vec![(0.0, 0.0), (20.0, 0.0)]));
        assert_eq!(reduce.filter(&mp), Reduction::Collapse(point!(x: 10.0, y: 0.0)));
        // Same centroid cell again
        assert_eq!(reduce.filter(&mp), Reduction::Drop);
    }

    #[test]
    fn test_small_lines_and_polygons_are_dropped() {
        let mut reduce = ReduceConfig::new(TileCoord::new(0, 0, 0));
        let tiny = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 0.1, y: 0.1)]);
        let long = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.1)]);
        assert_eq!(reduce.filter(&tiny), Reduction::Drop);
        assert_eq!(reduce.filter(&long), Reduction::Keep);

        let square = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 0.0)
        ]);
        assert_eq!(reduce.filter(&square), Reduction::Keep);
    }

    #[test]
    fn test_threshold_scales_with_zoom() {
        let mut reduce = ReduceConfig::new(TileCoord::new(0, 0, 10));
        let line = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 0.1, y: 0.0)]);
        assert_eq!(reduce.filter(&line), Reduction::Keep);
    }
}
