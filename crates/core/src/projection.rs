//! Web Mercator projection into the unit square.
//!
//! The tiler works in a world space where longitude -180..180 maps to x 0..1
//! and latitude ~85.05..-85.05 maps to y 0..1 (y grows southward, like tile rows).
//! Tile pixel space is that world space scaled by `2^z * extent` and offset by the
//! tile's origin.

use std::f64::consts::PI;

use crate::tile::TileCoord;

/// Project a longitude in degrees to world x in `[0, 1]` for -180..180.
#[inline]
pub fn project_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Project a latitude in degrees to world y, clamped to `[0, 1]`.
///
/// Latitudes beyond the Mercator limit (including |lat| > 90) are not rejected;
/// they simply land on the top or bottom edge.
#[inline]
pub fn project_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

/// Inverse of [`project_x`].
#[inline]
pub fn unproject_x(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

/// Inverse of [`project_y`].
#[inline]
pub fn unproject_y(y: f64) -> f64 {
    (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees()
}

/// Transform a world-space coordinate into integer pixel space of `tile`.
///
/// Rounds half away from zero, matching `f64::round`.
#[inline]
pub fn world_to_pixel(x: f64, y: f64, tile: &TileCoord, extent: u32) -> (i32, i32) {
    let z2 = (1u64 << tile.z) as f64;
    let extent = extent as f64;
    (
        (extent * (x * z2 - tile.x as f64)).round() as i32,
        (extent * (y * z2 - tile.y as f64)).round() as i32,
    )
}

/// Transform a lng/lat coordinate straight into pixel space of `tile`.
#[inline]
pub fn lng_lat_to_pixel(lng: f64, lat: f64, tile: &TileCoord, extent: u32) -> (i32, i32) {
    world_to_pixel(project_x(lng), project_y(lat), tile, extent)
}

/// Transform a pixel coordinate of `tile` back to lng/lat.
#[inline]
pub fn pixel_to_lng_lat(px: f64, py: f64, tile: &TileCoord, extent: u32) -> (f64, f64) {
    let size = extent as f64 * (1u64 << tile.z) as f64;
    let x0 = extent as f64 * tile.x as f64;
    let y0 = extent as f64 * tile.y as f64;
    (
        unproject_x((px + x0) / size),
        unproject_y((py + y0) / size),
    )
}
