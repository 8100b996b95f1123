//! Tile decoding.
//!
//! [`VectorTile`] indexes a tile without decoding any feature: each [`Layer`]
//! keeps its dictionaries and the byte ranges of its feature records, and
//! features are parsed only when asked for. The bulk readers
//! [`read_raw_tile`] and [`read_tile`] are built on the same path.

use std::ops::Range;

use bytes::Bytes;
use prost::encoding::WireType;

use super::decode::GeometryDecoder;
use super::wire::{decode_packed_u32, expect_wire_type, read_value, WireReader};
use super::{Dialect, Feature, GeomType, Properties, PropertyValue, DEFAULT_EXTENT, DEFAULT_VERSION, LAYER_PROPERTY};
use crate::tile::TileCoord;
use crate::{Error, Result};

/// An indexed tile buffer.
#[derive(Debug, Clone)]
pub struct VectorTile {
    data: Bytes,
    dialect: Dialect,
    layers: Vec<Layer>,
}

impl VectorTile {
    pub fn new(data: impl Into<Bytes>, dialect: Dialect) -> Result<Self> {
        let data: Bytes = data.into();
        let proto = dialect.proto();
        let mut reader = WireReader::new(&data);
        let mut layers = Vec::new();

        while reader.has_remaining() {
            let start = reader.position();
            let (field, wire_type) = reader.read_key()?;
            if field != proto.tile_layers {
                reader.skip(wire_type)?;
                continue;
            }
            expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
            let payload = reader.read_bytes()?;
            let span = start..payload.end;
            layers.push(Layer::parse(data.slice(payload), span, dialect)?);
        }

        log::trace!("indexed tile with {} layers", layers.len());
        Ok(Self {
            data,
            dialect,
            layers,
        })
    }

    pub fn from_slice(data: &[u8], dialect: Dialect) -> Result<Self> {
        Self::new(Bytes::copy_from_slice(data), dialect)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.name == name)
    }

    /// Re-emit the parsed layers as a tile buffer. Unknown tile-level fields
    /// are not carried over.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len());
        for layer in &self.layers {
            out.extend_from_slice(&self.data[layer.span.clone()]);
        }
        out
    }
}

/// A lazily decoded layer.
#[derive(Debug, Clone)]
pub struct Layer {
    name: String,
    extent: u32,
    version: u32,
    keys: Vec<String>,
    values: Vec<PropertyValue>,
    features: Vec<Range<usize>>,
    data: Bytes,
    span: Range<usize>,
    dialect: Dialect,
    position: usize,
}

impl Layer {
    fn parse(data: Bytes, span: Range<usize>, dialect: Dialect) -> Result<Self> {
        let proto = dialect.proto();
        let mut reader = WireReader::new(&data);
        let mut name = None;
        let mut extent = DEFAULT_EXTENT;
        let mut version = DEFAULT_VERSION;
        let mut keys = Vec::new();
        let mut values = Vec::new();
        let mut features = Vec::new();

        while reader.has_remaining() {
            let (field, wire_type) = reader.read_key()?;
            if field == proto.layer_name {
                expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                name = Some(reader.read_string()?);
            } else if field == proto.layer_features {
                expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                features.push(reader.read_bytes()?);
            } else if field == proto.layer_keys {
                expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                keys.push(reader.read_string()?);
            } else if field == proto.layer_values {
                expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                let range = reader.read_bytes()?;
                values.push(read_value(&data[range])?);
            } else if field == proto.layer_extent {
                expect_wire_type(field, wire_type, WireType::Varint)?;
                extent = reader.read_varint()? as u32;
            } else if field == proto.layer_version {
                expect_wire_type(field, wire_type, WireType::Varint)?;
                version = reader.read_varint()? as u32;
            } else {
                reader.skip(wire_type)?;
            }
        }

        let name = name.ok_or_else(|| Error::Decode("layer has no name".to_string()))?;
        Ok(Self {
            name,
            extent,
            version,
            keys,
            values,
            features,
            data,
            span,
            dialect,
            position: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extent(&self) -> u32 {
        self.extent
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn values(&self) -> &[PropertyValue] {
        &self.values
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Byte range of this layer's record, key and length prefix included,
    /// within the tile it was read from.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The encoded feature message at `index`.
    pub(crate) fn raw_feature(&self, index: usize) -> Option<&[u8]> {
        self.features.get(index).map(|r| &self.data[r.clone()])
    }

    /// Parse the id and tags of the feature at `index`. Geometry is decoded
    /// later, on [`GeometryDecoder::load_geometry`].
    pub fn feature(&self, index: usize) -> Option<Result<LazyFeature>> {
        let range = self.features.get(index)?.clone();
        Some(self.parse_feature(range))
    }

    fn parse_feature(&self, range: Range<usize>) -> Result<LazyFeature> {
        let proto = self.dialect.proto();
        let msg = self.data.slice(range);
        let mut reader = WireReader::new(&msg);
        let mut id = None;
        let mut tags = Vec::new();
        let mut geom_type = GeomType::Unknown;
        let mut geometry = Bytes::new();

        while reader.has_remaining() {
            let (field, wire_type) = reader.read_key()?;
            if field == proto.feature_id {
                expect_wire_type(field, wire_type, WireType::Varint)?;
                id = Some(reader.read_varint()?);
            } else if field == proto.feature_tags {
                expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                tags = reader.read_packed_u32()?;
            } else if field == proto.feature_type {
                expect_wire_type(field, wire_type, WireType::Varint)?;
                geom_type = GeomType::from_u64(reader.read_varint()?);
            } else if field == proto.feature_geometry {
                expect_wire_type(field, wire_type, WireType::LengthDelimited)?;
                geometry = msg.slice(reader.read_bytes()?);
            } else {
                reader.skip(wire_type)?;
            }
        }

        Ok(LazyFeature {
            id,
            geom_type,
            properties: self.resolve_tags(&tags)?,
            geometry,
            extent: self.extent,
        })
    }

    fn resolve_tags(&self, tags: &[u32]) -> Result<Properties> {
        if tags.len() % 2 != 0 {
            return Err(Error::Decode(format!(
                "odd number of tag indices ({}) in layer '{}'",
                tags.len(),
                self.name
            )));
        }
        tags.chunks_exact(2)
            .map(|pair| {
                let key = self.keys.get(pair[0] as usize).ok_or_else(|| {
                    Error::Decode(format!("key index {} out of range", pair[0]))
                })?;
                let value = self.values.get(pair[1] as usize).ok_or_else(|| {
                    Error::Decode(format!("value index {} out of range", pair[1]))
                })?;
                Ok((key.clone(), value.clone()))
            })
            .collect()
    }

    /// Iterate all features from the start, independent of [`Layer::next_feature`].
    pub fn features(&self) -> impl Iterator<Item = Result<LazyFeature>> + '_ {
        self.features.iter().map(|r| self.parse_feature(r.clone()))
    }

    /// The next feature of this layer's internal cursor.
    pub fn next_feature(&mut self) -> Option<Result<LazyFeature>> {
        let feature = self.feature(self.position)?;
        self.position += 1;
        Some(feature)
    }

    /// Rewind [`Layer::next_feature`] to the first feature.
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

/// A feature whose geometry has not been decoded yet.
#[derive(Debug, Clone)]
pub struct LazyFeature {
    id: Option<u64>,
    geom_type: GeomType,
    properties: Properties,
    geometry: Bytes,
    extent: u32,
}

impl LazyFeature {
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn extent(&self) -> u32 {
        self.extent
    }

    /// Decode into a feature with pixel coordinates.
    pub fn to_feature(&self) -> Result<Feature> {
        Ok(Feature::new(
            self.id,
            self.load_geometry()?,
            self.properties.clone(),
        ))
    }

    /// Decode into a feature with lng/lat coordinates for `tile`.
    pub fn to_lng_lat(&self, tile: &TileCoord) -> Result<Feature> {
        Ok(self.to_feature()?.to_lng_lat(tile, self.extent))
    }

    pub fn to_geojson(&self, tile: &TileCoord) -> Result<geojson::Feature> {
        Ok(self.to_lng_lat(tile)?.to_geojson())
    }
}

impl GeometryDecoder for LazyFeature {
    fn geom_type(&self) -> GeomType {
        self.geom_type
    }

    fn geometry_commands(&self) -> Result<Vec<u32>> {
        decode_packed_u32(&self.geometry)
    }
}

fn read_features<F>(data: &[u8], dialect: Dialect, mut convert: F) -> Result<Vec<Feature>>
where
    F: FnMut(&Layer, &LazyFeature) -> Result<Feature>,
{
    let tile = VectorTile::from_slice(data, dialect)?;
    let mut out = Vec::new();
    for layer in tile.layers() {
        for feature in layer.features() {
            let mut decoded = convert(layer, &feature?)?;
            decoded.properties.insert(
                LAYER_PROPERTY.to_string(),
                PropertyValue::String(layer.name().to_string()),
            );
            out.push(decoded);
        }
    }
    Ok(out)
}

/// Decode every feature of every layer in pixel coordinates.
///
/// Each feature gets a `layer` property naming its layer. A tile without
/// features yields an empty vector.
pub fn read_raw_tile(data: &[u8], dialect: Dialect) -> Result<Vec<Feature>> {
    read_features(data, dialect, |_, feature| feature.to_feature())
}

/// Decode every feature of every layer in lng/lat for `tile`.
pub fn read_tile(data: &[u8], tile: &TileCoord, dialect: Dialect) -> Result<Vec<Feature>> {
    read_features(data, dialect, |_, feature| feature.to_lng_lat(tile))
}
