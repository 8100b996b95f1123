//! Field numbering of the two supported wire dialects.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Wire dialect of an encoded tile.
///
/// Both dialects carry the same messages with different field numbers. A tile
/// read with the wrong dialect decodes to garbage or fails, so the dialect is
/// always passed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// The published Mapbox Vector Tile schema.
    #[default]
    Mapbox,
    /// The LK schema, which renumbers the layer and feature fields.
    Lk,
}

impl Dialect {
    pub fn proto(self) -> &'static Proto {
        match self {
            Dialect::Mapbox => &MAPBOX,
            Dialect::Lk => &LK,
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mapbox" | "mvt" => Ok(Dialect::Mapbox),
            "lk" => Ok(Dialect::Lk),
            other => Err(Error::InvalidConfig(format!("unknown dialect '{}'", other))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Mapbox => write!(f, "mapbox"),
            Dialect::Lk => write!(f, "lk"),
        }
    }
}

/// Field numbers of the tile, layer and feature messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proto {
    pub tile_layers: u32,

    pub layer_name: u32,
    pub layer_features: u32,
    pub layer_keys: u32,
    pub layer_values: u32,
    pub layer_extent: u32,
    pub layer_version: u32,

    pub feature_id: u32,
    pub feature_tags: u32,
    pub feature_type: u32,
    pub feature_geometry: u32,
}

pub(crate) const MAPBOX: Proto = Proto {
    tile_layers: 3,
    layer_name: 1,
    layer_features: 2,
    layer_keys: 3,
    layer_values: 4,
    layer_extent: 5,
    layer_version: 15,
    feature_id: 1,
    feature_tags: 2,
    feature_type: 3,
    feature_geometry: 4,
};

pub(crate) const LK: Proto = Proto {
    tile_layers: 2,
    layer_name: 1,
    layer_features: 2,
    layer_keys: 4,
    layer_values: 5,
    layer_extent: 6,
    layer_version: 15,
    feature_id: 1,
    feature_tags: 7,
    feature_type: 6,
    feature_geometry: 2,
};

// Value message fields, shared by both dialects.
pub(crate) const VALUE_STRING: u32 = 1;
pub(crate) const VALUE_FLOAT: u32 = 2;
pub(crate) const VALUE_DOUBLE: u32 = 3;
pub(crate) const VALUE_INT: u32 = 4;
pub(crate) const VALUE_UINT: u32 = 5;
pub(crate) const VALUE_SINT: u32 = 6;
pub(crate) const VALUE_BOOL: u32 = 7;
