//! MVT (Mapbox Vector Tile) codec.
//!
//! This module reads and writes vector tiles in two wire dialects that share the
//! same messages but number their fields differently (see [`Dialect`]). Key
//! components:
//!
//! - **Zigzag encoding**: Efficiently encode signed integers as unsigned
//! - **Command encoding**: Pack geometry commands (MoveTo, LineTo, ClosePath)
//! - **Cursor**: Delta-encode one feature's coordinates into a command stream
//! - **LayerWriter**: Group features with deduplicated keys/values
//! - **VectorTile / Layer**: Lazily index a tile and decode features on demand
//! - **Operations**: Splice layers out of or into an encoded tile
//!
//! Reference: <https://github.com/mapbox/vector-tile-spec>

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use geo::{BoundingRect, Geometry, MapCoords};
use serde_json::Value as JsonValue;

use crate::projection::pixel_to_lng_lat;
use crate::tile::TileCoord;

mod cursor;
mod decode;
mod ops;
mod proto;
mod reader;
mod wire;
mod writer;

pub use cursor::Cursor;
pub use decode::{decode_geometry, ring_area, GeometryDecoder};
pub use ops::{add_features_to_layer, remove_layer};
pub use proto::{Dialect, Proto};
pub use reader::{read_raw_tile, read_tile, Layer, LazyFeature, VectorTile};
pub use writer::{write_layer, LayerConfig, LayerWriter};

/// Default tile extent (4096 as per MVT spec)
pub const DEFAULT_EXTENT: u32 = 4096;

/// Default layer version
pub const DEFAULT_VERSION: u32 = 2;

/// Property injected by bulk reads, naming the layer a feature came from.
pub const LAYER_PROPERTY: &str = "layer";

/// MVT command IDs
pub(crate) const CMD_MOVE_TO: u32 = 1;
pub(crate) const CMD_LINE_TO: u32 = 2;
pub(crate) const CMD_CLOSE_PATH: u32 = 7;

// ============================================================================
// Zigzag Encoding
// ============================================================================

/// Encode a signed integer using zigzag encoding.
///
/// Zigzag encoding maps signed integers to unsigned integers so that
/// small negative numbers have small encoded values:
/// - 0 → 0
/// - -1 → 1
/// - 1 → 2
/// - -2 → 3
#[inline]
pub fn zigzag_encode(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Decode a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

// ============================================================================
// Command Encoding
// ============================================================================

/// Pack a command with a repeat count.
///
/// MVT commands are packed as: `(command_id | (count << 3))`
/// - command_id: 1=MoveTo, 2=LineTo, 7=ClosePath
/// - count: number of times to repeat the command
#[inline]
pub fn command_encode(command_id: u32, count: u32) -> u32 {
    (command_id & 0x7) | (count << 3)
}

/// Unpack a command into (command_id, count).
#[inline]
pub fn command_decode(command: u32) -> (u32, u32) {
    (command & 0x7, command >> 3)
}

// ============================================================================
// Geometry Type
// ============================================================================

/// The `type` field of an encoded feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeomType {
    Unknown = 0,
    Point = 1,
    LineString = 2,
    Polygon = 3,
}

impl GeomType {
    pub fn from_u64(value: u64) -> GeomType {
        match value {
            1 => GeomType::Point,
            2 => GeomType::LineString,
            3 => GeomType::Polygon,
            _ => GeomType::Unknown,
        }
    }

    /// The encoded type for a geometry; collections have none.
    pub fn of<T: geo::CoordNum>(geometry: &Geometry<T>) -> GeomType {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeomType::Point,
            Geometry::LineString(_) | Geometry::MultiLineString(_) | Geometry::Line(_) => {
                GeomType::LineString
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => GeomType::Polygon,
            Geometry::GeometryCollection(_) => GeomType::Unknown,
        }
    }
}

// ============================================================================
// Property Values
// ============================================================================

/// A property value that can be encoded in MVT.
///
/// Equality and hashing compare floats by bit pattern and never equate
/// different variants, so `UInt(5)` and `Int(5)` are distinct dictionary
/// entries.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    String(String),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    SInt(i64),
    Bool(bool),
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        use PropertyValue::*;
        match (self, other) {
            (String(a), String(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            (SInt(a), SInt(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropertyValue {}

impl Hash for PropertyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            PropertyValue::String(s) => s.hash(state),
            PropertyValue::Float(f) => f.to_bits().hash(state),
            PropertyValue::Double(d) => d.to_bits().hash(state),
            PropertyValue::Int(i) | PropertyValue::SInt(i) => i.hash(state),
            PropertyValue::UInt(u) => u.hash(state),
            PropertyValue::Bool(b) => b.hash(state),
        }
    }
}

impl PropertyValue {
    /// Convert a GeoJSON property value.
    ///
    /// Non-negative integers become `UInt`, negative integers `Int`, other
    /// numbers `Double`. Arrays and objects are stored as their JSON text.
    /// `null` has no MVT representation and yields `None`.
    pub fn from_json(value: &JsonValue) -> Option<PropertyValue> {
        match value {
            JsonValue::Null => None,
            JsonValue::Bool(b) => Some(PropertyValue::Bool(*b)),
            JsonValue::String(s) => Some(PropertyValue::String(s.clone())),
            JsonValue::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Some(PropertyValue::UInt(u))
                } else if let Some(i) = n.as_i64() {
                    Some(PropertyValue::Int(i))
                } else {
                    n.as_f64().map(PropertyValue::Double)
                }
            }
            JsonValue::Array(_) | JsonValue::Object(_) => {
                Some(PropertyValue::String(value.to_string()))
            }
        }
    }

    /// Convert to a GeoJSON property value. Non-finite floats become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            PropertyValue::String(s) => JsonValue::String(s.clone()),
            PropertyValue::Float(f) => serde_json::Number::from_f64(*f as f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            PropertyValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            PropertyValue::Int(i) | PropertyValue::SInt(i) => JsonValue::from(*i),
            PropertyValue::UInt(u) => JsonValue::from(*u),
            PropertyValue::Bool(b) => JsonValue::Bool(*b),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<f64> for PropertyValue {
    fn from(d: f64) -> Self {
        PropertyValue::Double(d)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Int(i)
    }
}

impl From<u64> for PropertyValue {
    fn from(u: u64) -> Self {
        PropertyValue::UInt(u)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

/// Feature properties keyed by name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Convert a GeoJSON property map, skipping `null`s.
pub fn properties_from_json(map: &serde_json::Map<String, JsonValue>) -> Properties {
    map.iter()
        .filter_map(|(k, v)| PropertyValue::from_json(v).map(|v| (k.clone(), v)))
        .collect()
}

// ============================================================================
// Decoded Feature
// ============================================================================

/// A feature as read from or written to a tile.
///
/// Depending on where it came from the geometry is in tile pixel coordinates
/// ([`read_raw_tile`], [`LayerWriter::add_tile_feature`]) or in lng/lat degrees
/// ([`read_tile`], [`LayerWriter::add_feature`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<u64>,
    pub geometry: Geometry<f64>,
    pub properties: Properties,
}

impl Feature {
    pub fn new(id: Option<u64>, geometry: Geometry<f64>, properties: Properties) -> Self {
        Self {
            id,
            geometry,
            properties,
        }
    }

    /// Reproject a pixel-space feature of `tile` to lng/lat.
    pub fn to_lng_lat(&self, tile: &TileCoord, extent: u32) -> Feature {
        let geometry = self.geometry.map_coords(|c| {
            let (lng, lat) = pixel_to_lng_lat(c.x, c.y, tile, extent);
            geo::Coord { x: lng, y: lat }
        });
        Feature::new(self.id, geometry, self.properties.clone())
    }

    /// Convert to a GeoJSON feature.
    pub fn to_geojson(&self) -> geojson::Feature {
        let properties: serde_json::Map<String, JsonValue> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        geojson::Feature {
            bbox: self.geometry.bounding_rect().map(|r| {
                vec![r.min().x, r.min().y, r.max().x, r.max().y]
            }),
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&self.geometry))),
            id: self
                .id
                .map(|id| geojson::feature::Id::Number(serde_json::Number::from(id))),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    // ------------------------------------------------------------------------
    // Zigzag Encoding Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_zigzag_encode_small_values() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        assert_eq!(zigzag_encode(2), 4);
    }

    #[test]
    fn test_zigzag_encode_extremes() {
        assert_eq!(zigzag_encode(i32::MAX), u32::MAX - 1);
        assert_eq!(zigzag_encode(i32::MIN), u32::MAX);
    }

    #[test]
    fn test_zigzag_roundtrip() {
        for v in [i32::MIN, i32::MIN + 1, -4096, -1, 0, 1, 4096, i32::MAX - 1, i32::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v, "failed for {}", v);
        }
    }

    // ------------------------------------------------------------------------
    // Command Encoding Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_command_encode() {
        assert_eq!(command_encode(CMD_MOVE_TO, 1), 9);
        assert_eq!(command_encode(CMD_LINE_TO, 3), 26);
        assert_eq!(command_encode(CMD_CLOSE_PATH, 1), 15);
    }

    #[test]
    fn test_command_roundtrip() {
        for (id, count) in [(CMD_MOVE_TO, 1), (CMD_LINE_TO, 0), (CMD_LINE_TO, 4095), (CMD_CLOSE_PATH, 1)] {
            assert_eq!(command_decode(command_encode(id, count)), (id, count));
        }
    }

    // ------------------------------------------------------------------------
    // Property Value Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_property_value_types_are_distinct() {
        assert_ne!(PropertyValue::UInt(5), PropertyValue::Int(5));
        assert_ne!(PropertyValue::Int(5), PropertyValue::SInt(5));
        assert_ne!(PropertyValue::Float(1.0), PropertyValue::Double(1.0));
        assert_eq!(PropertyValue::Double(f64::NAN), PropertyValue::Double(f64::NAN));
    }

    #[test]
    fn test_property_value_from_json() {
        assert_eq!(
            PropertyValue::from_json(&serde_json::json!(12)),
            Some(PropertyValue::UInt(12))
        );
        assert_eq!(
            PropertyValue::from_json(&serde_json::json!(-12)),
            Some(PropertyValue::Int(-12))
        );
        assert_eq!(
            PropertyValue::from_json(&serde_json::json!(1.5)),
            Some(PropertyValue::Double(1.5))
        );
        assert_eq!(PropertyValue::from_json(&serde_json::json!(null)), None);
        assert_eq!(
            PropertyValue::from_json(&serde_json::json!([1, 2])),
            Some(PropertyValue::String("[1,2]".to_string()))
        );
    }

    #[test]
    fn test_property_value_to_json() {
        assert_eq!(PropertyValue::from("a").to_json(), serde_json::json!("a"));
        assert_eq!(PropertyValue::SInt(-3).to_json(), serde_json::json!(-3));
        assert_eq!(PropertyValue::Double(f64::INFINITY).to_json(), JsonValue::Null);
    }

    #[test]
    fn test_geom_type_of() {
        let geometry: Geometry<f64> = Geometry::Point(point!(x: 1.0, y: 2.0));
        assert_eq!(GeomType::of(&geometry), GeomType::Point);
        assert_eq!(GeomType::from_u64(3), GeomType::Polygon);
        assert_eq!(GeomType::from_u64(9), GeomType::Unknown);
    }

    #[test]
    fn test_feature_to_geojson() {
        let mut properties = Properties::new();
        properties.insert("name".to_string(), PropertyValue::from("x"));
        let feature = Feature::new(
            Some(4),
            Geometry::Point(point!(x: 10.0, y: 20.0)),
            properties,
        );
        let gj = feature.to_geojson();
        assert_eq!(gj.property("name"), Some(&serde_json::json!("x")));
        assert_eq!(
            gj.id,
            Some(geojson::feature::Id::Number(serde_json::Number::from(4u64)))
        );
        assert_eq!(gj.bbox, Some(vec![10.0, 20.0, 10.0, 20.0]));
    }
}
