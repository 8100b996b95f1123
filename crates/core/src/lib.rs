//! Core library for turning GeoJSON into Mapbox Vector Tiles and reading them back.
//!
//! The crate is organised in the order data flows through it:
//!
//! - [`projection`] and [`tile`]: Web Mercator math and XYZ tile addressing
//! - [`convert`], [`simplify`], [`clip`]: projecting GeoJSON features into the
//!   unit square, ranking vertices by importance, slicing geometry along axes
//! - [`builder`] and [`tiler`]: the quad-tree splitter producing [`builder::Tile`]s
//! - [`pyramid`]: clipping an existing feature down a zoom pyramid
//! - [`mvt`]: the vector tile codec, for both the Mapbox and LK field dialects
//!
//! # Examples
//!
//! ```no_run
//! use geojson_tiles_core::convert::read_features;
//! use geojson_tiles_core::mvt::Dialect;
//! use geojson_tiles_core::tile::TileCoord;
//! use geojson_tiles_core::tiler::{tile_from_geojson, TilerConfig};
//!
//! # fn main() -> geojson_tiles_core::Result<()> {
//! let features = read_features(std::fs::File::open("input.geojson")?)?;
//! let config = TilerConfig::new(0, 14).with_layer_name("roads");
//!
//! let tile = tile_from_geojson(&features, TileCoord::new(0, 0, 0), &config)?;
//! let bytes = tile.encode(Dialect::Mapbox)?;
//! println!("{} features, {} bytes", tile.num_features(), bytes.len());
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod builder;
pub mod clip;
pub mod convert;
pub mod geometry;
pub mod mvt;
pub mod projection;
pub mod pyramid;
pub mod reduce;
pub mod simplify;
pub mod tile;
pub mod tiler;

pub use builder::Tile;
pub use tile::{TileBounds, TileCoord};
pub use tiler::{tile_from_geojson, TileIndex, TilerConfig};

/// Errors that can occur while tiling GeoJSON or reading and writing vector tiles
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to decode vector tile: {0}")]
    Decode(String),

    #[error("Malformed protobuf data: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("MVT encoding failed: {0}")]
    MvtEncoding(String),

    #[error("Invalid geometry at feature {feature_id}: {reason}")]
    InvalidGeometry { feature_id: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<geojson::Error> for Error {
    fn from(err: geojson::Error) -> Self {
        Error::GeoJson(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidGeometry {
            feature_id: 3,
            reason: "GeometryCollection is not supported".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid geometry at feature 3: GeometryCollection is not supported"
        );
    }

    #[test]
    fn test_decode_error_from_prost() {
        let mut buf: &[u8] = &[0xff];
        let err: Error = prost::encoding::decode_varint(&mut buf).unwrap_err().into();
        assert!(matches!(err, Error::Protobuf(_)));
    }
}
