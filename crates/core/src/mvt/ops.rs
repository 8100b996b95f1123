//! In-place edits of encoded tiles.
//!
//! Layers are spliced by byte range: the other layers of the tile are copied
//! through untouched, never decoded and re-encoded.

use super::{Dialect, Feature, LayerConfig, LayerWriter, VectorTile};
use crate::{Error, Result};

/// Remove the layer called `name` from a tile.
pub fn remove_layer(data: &[u8], name: &str, dialect: Dialect) -> Result<Vec<u8>> {
    let tile = VectorTile::from_slice(data, dialect)?;
    let layer = tile
        .layer(name)
        .ok_or_else(|| Error::LayerNotFound(name.to_string()))?;
    let span = layer.span();

    let mut out = Vec::with_capacity(data.len() - span.len());
    out.extend_from_slice(&data[..span.start]);
    out.extend_from_slice(&data[span.end..]);
    log::debug!("removed layer '{}' ({} bytes)", name, span.len());
    Ok(out)
}

/// Append lng/lat features to the layer named by `config`.
///
/// If the tile already has that layer, its encoded features and dictionaries
/// are carried over, new features are added after them, and the rebuilt layer
/// moves to the end of the tile. Otherwise a new layer is appended.
pub fn add_features_to_layer(
    data: &[u8],
    config: &LayerConfig,
    features: &[Feature],
) -> Result<Vec<u8>> {
    let tile = VectorTile::from_slice(data, config.dialect)?;

    let (mut writer, mut out) = match tile.layer(&config.name) {
        Some(layer) => {
            let layer_config = config
                .clone()
                .with_extent(layer.extent())
                .with_version(layer.version());
            let mut writer =
                LayerWriter::with_dictionary(layer_config, layer.keys(), layer.values());
            for index in 0..layer.len() {
                if let Some(raw) = layer.raw_feature(index) {
                    writer.push_raw_feature(raw);
                }
            }
            let span = layer.span();
            let mut rest = Vec::with_capacity(data.len());
            rest.extend_from_slice(&data[..span.start]);
            rest.extend_from_slice(&data[span.end..]);
            (writer, rest)
        }
        None => (LayerWriter::new(config.clone()), data.to_vec()),
    };

    for feature in features {
        writer.add_feature(feature)?;
    }
    out.extend(writer.finish());
    Ok(out)
}
