//! Tile coordinate math and utilities
//!
//! This module provides functions for converting between geographic coordinates (lat/lng)
//! and tile coordinates (x/y/z) using Web Mercator projection, plus the quad-tree
//! relationships (parent, children, ancestry) the tiler and the pyramid clipper walk.

use std::f64::consts::PI;
use std::fmt;

use geo::Rect;

/// Tile coordinates: x, y, and zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    /// Create a new tile coordinate
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Whether x and y address a tile that exists at this zoom
    pub fn is_valid(&self) -> bool {
        if self.z > 31 {
            return false;
        }
        let n = 1u64 << self.z;
        (self.x as u64) < n && (self.y as u64) < n
    }

    /// The tile one zoom level up. The root tile is its own parent.
    pub fn parent(&self) -> TileCoord {
        if self.z == 0 {
            return *self;
        }
        TileCoord::new(self.x >> 1, self.y >> 1, self.z - 1)
    }

    /// The four tiles one zoom level down, ordered top-left, top-right,
    /// bottom-right, bottom-left.
    pub fn children(&self) -> [TileCoord; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.z + 1);
        [
            TileCoord::new(x, y, z),
            TileCoord::new(x + 1, y, z),
            TileCoord::new(x + 1, y + 1, z),
            TileCoord::new(x, y + 1, z),
        ]
    }

    /// The ancestor of this tile at `zoom`, or `None` if `zoom` is deeper than the tile.
    pub fn ancestor_at(&self, zoom: u8) -> Option<TileCoord> {
        if zoom > self.z {
            return None;
        }
        let dz = self.z - zoom;
        Some(TileCoord::new(self.x >> dz, self.y >> dz, zoom))
    }

    /// True if `other` is this tile or lies anywhere below it in the quad-tree.
    pub fn contains(&self, other: &TileCoord) -> bool {
        other.ancestor_at(self.z) == Some(*self)
    }

    /// Get the bounding box of this tile in geographic coordinates (lng/lat)
    pub fn bounds(&self) -> TileBounds {
        let n = 2_f64.powi(self.z as i32);
        let lng_min = (self.x as f64) / n * 360.0 - 180.0;
        let lng_max = (self.x as f64 + 1.0) / n * 360.0 - 180.0;

        let lat_rad = |y: f64| {
            let y_rad = PI * (1.0 - 2.0 * y / n);
            y_rad.sinh().atan().to_degrees()
        };

        let lat_max = lat_rad(self.y as f64);
        let lat_min = lat_rad(self.y as f64 + 1.0);

        TileBounds {
            lng_min,
            lat_min,
            lng_max,
            lat_max,
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Geographic bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    pub lng_min: f64,
    pub lat_min: f64,
    pub lng_max: f64,
    pub lat_max: f64,
}

impl TileBounds {
    /// Create a new bounding box
    pub fn new(lng_min: f64, lat_min: f64, lng_max: f64, lat_max: f64) -> Self {
        Self {
            lng_min,
            lat_min,
            lng_max,
            lat_max,
        }
    }

    /// Get the width in degrees
    pub fn width(&self) -> f64 {
        self.lng_max - self.lng_min
    }

    /// Get the height in degrees
    pub fn height(&self) -> f64 {
        self.lat_max - self.lat_min
    }
}

impl From<Rect<f64>> for TileBounds {
    fn from(rect: Rect<f64>) -> Self {
        TileBounds::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// Convert longitude/latitude to tile coordinates at a given zoom level
///
/// Uses Web Mercator projection (EPSG:3857). Points on or beyond the
/// east/south edges of the world are clamped into the last row/column.
///
/// # Arguments
///
/// * `lng` - Longitude in degrees (-180 to 180)
/// * `lat` - Latitude in degrees (-85.0511 to 85.0511, Web Mercator bounds)
/// * `zoom` - Zoom level (0-30)
///
/// # Returns
///
/// TileCoord with x, y, and zoom
pub fn lng_lat_to_tile(lng: f64, lat: f64, zoom: u8) -> TileCoord {
    let n = 2_f64.powi(zoom as i32);
    let max_index = n - 1.0;

    // Convert longitude to tile x
    let x = ((lng + 180.0) / 360.0 * n).floor().clamp(0.0, max_index) as u32;

    // Convert latitude to tile y (Web Mercator)
    let lat_rad = lat.to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n)
        .floor()
        .clamp(0.0, max_index) as u32;

    TileCoord::new(x, y, zoom)
}
