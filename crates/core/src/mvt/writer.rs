//! Layer encoding.

use std::collections::HashMap;

use geo::Geometry;

use super::wire::{write_len_delimited, write_packed_u32, write_value, write_varint_field};
use super::{Cursor, Dialect, Feature, GeomType, Properties, PropertyValue, DEFAULT_EXTENT, DEFAULT_VERSION};
use crate::reduce::{ReduceConfig, Reduction};
use crate::tile::TileCoord;
use crate::Result;

/// Settings for writing one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfig {
    pub tile: TileCoord,
    pub name: String,
    pub extent: u32,
    pub version: u32,
    pub dialect: Dialect,
    /// Clamp pixel coordinates into `[0, extent]`.
    pub clamp_to_extent: bool,
    /// Thin out crowded points and tiny shapes, see [`crate::reduce`].
    pub reduce: bool,
}

impl LayerConfig {
    pub fn new(name: impl Into<String>, tile: TileCoord) -> Self {
        Self {
            tile,
            name: name.into(),
            extent: DEFAULT_EXTENT,
            version: DEFAULT_VERSION,
            dialect: Dialect::Mapbox,
            clamp_to_extent: true,
            reduce: false,
        }
    }

    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = extent;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp_to_extent = clamp;
        self
    }

    pub fn with_reduce(mut self, reduce: bool) -> Self {
        self.reduce = reduce;
        self
    }
}

/// Builder for a single encoded layer.
///
/// Keys and values are interned in first-seen order; an entry that is already
/// in the dictionary is never written twice. Each feature is encoded into a
/// scratch buffer and appended only once it is complete, so a failed feature
/// leaves the layer untouched.
pub struct LayerWriter {
    config: LayerConfig,
    keys: Vec<String>,
    key_index: HashMap<String, u32>,
    values: Vec<PropertyValue>,
    value_index: HashMap<PropertyValue, u32>,
    features: Vec<u8>,
    num_features: usize,
    cursor: Cursor,
    reducer: Option<ReduceConfig>,
}

impl LayerWriter {
    pub fn new(config: LayerConfig) -> Self {
        let cursor = Cursor::new(config.tile, config.extent).with_clamp(config.clamp_to_extent);
        let reducer = config.reduce.then(|| ReduceConfig::new(config.tile));
        Self {
            config,
            keys: Vec::new(),
            key_index: HashMap::new(),
            values: Vec::new(),
            value_index: HashMap::new(),
            features: Vec::new(),
            num_features: 0,
            cursor,
            reducer,
        }
    }

    /// A writer whose dictionaries start out as an existing layer's, so that
    /// the layer's encoded features can be copied over unchanged.
    pub(crate) fn with_dictionary(
        config: LayerConfig,
        keys: &[String],
        values: &[PropertyValue],
    ) -> Self {
        let mut writer = Self::new(config);
        for key in keys {
            let index = writer.keys.len() as u32;
            writer.keys.push(key.clone());
            writer.key_index.entry(key.clone()).or_insert(index);
        }
        for value in values {
            let index = writer.values.len() as u32;
            writer.values.push(value.clone());
            writer.value_index.entry(value.clone()).or_insert(index);
        }
        writer
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    pub fn add_key(&mut self, key: &str) -> u32 {
        if let Some(index) = self.key_index.get(key) {
            return *index;
        }
        let index = self.keys.len() as u32;
        self.keys.push(key.to_string());
        self.key_index.insert(key.to_string(), index);
        index
    }

    pub fn add_value(&mut self, value: &PropertyValue) -> u32 {
        if let Some(index) = self.value_index.get(value) {
            return *index;
        }
        let index = self.values.len() as u32;
        self.values.push(value.clone());
        self.value_index.insert(value.clone(), index);
        index
    }

    /// Interleaved key/value indices for a property map.
    pub fn tags(&mut self, properties: &Properties) -> Vec<u32> {
        let mut tags = Vec::with_capacity(properties.len() * 2);
        for (key, value) in properties {
            tags.push(self.add_key(key));
            tags.push(self.add_value(value));
        }
        tags
    }

    /// Add a feature with lng/lat geometry. Returns `false` when the feature
    /// was reduced away or its geometry collapsed in pixel space.
    pub fn add_feature(&mut self, feature: &Feature) -> Result<bool> {
        let mut geometry = &feature.geometry;
        let collapsed;
        if let Some(reducer) = self.reducer.as_mut() {
            match reducer.filter(geometry) {
                Reduction::Keep => {}
                Reduction::Collapse(point) => {
                    collapsed = Geometry::Point(point);
                    geometry = &collapsed;
                }
                Reduction::Drop => {
                    log::trace!("reduced away feature {:?}", feature.id);
                    return Ok(false);
                }
            }
        }
        let geom_type = self.cursor.encode_lng_lat(geometry)?;
        self.push_feature(feature.id, &feature.properties, geom_type)
    }

    /// Add a feature whose geometry is already in this tile's pixel space.
    pub fn add_tile_feature(&mut self, feature: &Feature) -> Result<bool> {
        let geom_type = self.cursor.encode_pixels(&feature.geometry)?;
        self.push_feature(feature.id, &feature.properties, geom_type)
    }

    /// Add a feature from an already-encoded command stream. An empty stream
    /// is dropped and reported as `false`.
    pub fn add_feature_raw(
        &mut self,
        id: Option<u64>,
        properties: &Properties,
        geom_type: GeomType,
        geometry: &[u32],
    ) -> Result<bool> {
        if geometry.is_empty() {
            log::trace!("dropping feature {:?}: empty command stream", id);
            return Ok(false);
        }
        let tags = self.tags(properties);
        self.append_feature(id, &tags, geom_type, geometry);
        Ok(true)
    }

    fn push_feature(
        &mut self,
        id: Option<u64>,
        properties: &Properties,
        geom_type: GeomType,
    ) -> Result<bool> {
        if self.cursor.geometry().is_empty() {
            log::trace!("dropping feature {:?}: geometry collapsed", id);
            return Ok(false);
        }
        let geometry = self.cursor.take_geometry();
        let tags = self.tags(properties);
        self.append_feature(id, &tags, geom_type, &geometry);
        Ok(true)
    }

    fn append_feature(&mut self, id: Option<u64>, tags: &[u32], geom_type: GeomType, geometry: &[u32]) {
        let proto = self.config.dialect.proto();
        let mut msg = Vec::with_capacity(geometry.len() * 2 + tags.len() + 8);
        if let Some(id) = id {
            write_varint_field(&mut msg, proto.feature_id, id);
        }
        if !tags.is_empty() {
            write_packed_u32(&mut msg, proto.feature_tags, tags);
        }
        write_varint_field(&mut msg, proto.feature_type, geom_type as u64);
        write_packed_u32(&mut msg, proto.feature_geometry, geometry);
        self.push_raw_feature(&msg);
    }

    /// Append an encoded feature message as-is. Its tag indices must refer to
    /// this writer's dictionaries.
    pub(crate) fn push_raw_feature(&mut self, msg: &[u8]) {
        write_len_delimited(&mut self.features, self.config.dialect.proto().layer_features, msg);
        self.num_features += 1;
    }

    pub fn len(&self) -> usize {
        self.num_features
    }

    pub fn is_empty(&self) -> bool {
        self.num_features == 0
    }

    /// The bare layer message.
    pub fn layer_message(&self) -> Vec<u8> {
        let proto = self.config.dialect.proto();
        let mut msg = Vec::with_capacity(self.features.len() + 64);
        write_len_delimited(&mut msg, proto.layer_name, self.config.name.as_bytes());
        msg.extend_from_slice(&self.features);
        for key in &self.keys {
            write_len_delimited(&mut msg, proto.layer_keys, key.as_bytes());
        }
        for value in &self.values {
            write_value(&mut msg, proto.layer_values, value);
        }
        write_varint_field(&mut msg, proto.layer_extent, self.config.extent as u64);
        write_varint_field(&mut msg, proto.layer_version, self.config.version as u64);
        msg
    }

    /// Finish the layer as a tile holding just this layer. Tiles are plain
    /// concatenations of these records.
    pub fn finish(self) -> Vec<u8> {
        log::debug!(
            "layer '{}' for tile {}: {} features, {} keys, {} values",
            self.config.name,
            self.config.tile,
            self.num_features,
            self.keys.len(),
            self.values.len()
        );
        let mut out = Vec::new();
        write_len_delimited(
            &mut out,
            self.config.dialect.proto().tile_layers,
            &self.layer_message(),
        );
        out
    }
}

/// Encode lng/lat features as a single-layer tile.
pub fn write_layer(features: &[Feature], config: &LayerConfig) -> Result<Vec<u8>> {
    let mut writer = LayerWriter::new(config.clone());
    for feature in features {
        writer.add_feature(feature)?;
    }
    Ok(writer.finish())
}
