//! Quad-tree tiler.
//!
//! Converted features start in a single root tile. A tile is split by clipping
//! its features into left and right halves along x, then each half into top and
//! bottom along y, every cut widened by the configured buffer. Children with no
//! features are not created. The four children of a tile are clipped in
//! parallel and all of them are joined before the split returns.
//!
//! [`TileIndex`] splits eagerly down to the index depth and drills further on
//! demand; [`tile_from_geojson`] builds just the path to one requested tile.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::builder::Tile;
use crate::clip::{clip_features, wrap, Axis};
use crate::convert::convert_features;
use crate::geometry::{BBox, TileFeature};
use crate::tile::TileCoord;
use crate::{Error, Result};

/// Deepest zoom level the tiler accepts.
pub const MAX_ZOOM_LIMIT: u8 = 24;

/// Configuration for the tiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilerConfig {
    /// Minimum zoom level to generate
    pub min_zoom: u8,
    /// Maximum zoom level to generate; simplification is tuned for this zoom
    pub max_zoom: u8,
    /// Zoom down to which the index is split eagerly
    pub index_max_zoom: u8,
    /// Tiles below `index_max_zoom` with at most this many points are not split eagerly
    pub index_max_points: usize,
    /// Simplification tolerance in pixels
    pub tolerance: f64,
    /// Tile extent in pixels (default: 4096)
    pub extent: u32,
    /// Buffer in pixels around tile bounds (default: 64)
    pub buffer: u32,
    /// Layer name for the MVT output
    pub layer_name: String,
    /// Features beyond this count are left out when a tile is encoded
    pub max_features: usize,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 14,
            index_max_zoom: 5,
            index_max_points: 100_000,
            tolerance: 3.0,
            extent: 4096,
            buffer: 64,
            layer_name: "layer".to_string(),
            max_features: 50_000,
        }
    }
}

impl TilerConfig {
    /// Create a new config with custom zoom range.
    pub fn new(min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            min_zoom,
            max_zoom,
            ..Default::default()
        }
    }

    /// Set the layer name.
    pub fn with_layer_name(mut self, name: impl Into<String>) -> Self {
        self.layer_name = name.into();
        self
    }

    /// Set the tile extent.
    pub fn with_extent(mut self, extent: u32) -> Self {
        self.extent = extent;
        self
    }

    /// Set the buffer in pixels.
    pub fn with_buffer(mut self, buffer: u32) -> Self {
        self.buffer = buffer;
        self
    }

    /// Set the simplification tolerance in pixels.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the eager index depth and its point threshold.
    pub fn with_index(mut self, index_max_zoom: u8, index_max_points: usize) -> Self {
        self.index_max_zoom = index_max_zoom;
        self.index_max_points = index_max_points;
        self
    }

    /// Set the per-tile feature cap applied at encoding.
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = max_features;
        self
    }

    /// Buffer in world units at zoom 0.
    pub fn world_buffer(&self) -> f64 {
        self.buffer as f64 / self.extent as f64
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_zoom > MAX_ZOOM_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "max_zoom {} exceeds {}",
                self.max_zoom, MAX_ZOOM_LIMIT
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(Error::InvalidConfig(format!(
                "min_zoom {} is greater than max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.extent == 0 {
            return Err(Error::InvalidConfig("extent must be positive".to_string()));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Splitting
// ============================================================================

/// Clip a tile's features into its four children, ordered top-left,
/// top-right, bottom-right, bottom-left. Empty children are `None`.
pub fn split_children(tile: &Tile) -> [Option<Tile>; 4] {
    let config = tile.config();
    let coord = tile.coord();
    let bbox = *tile.bbox();

    let k1 = 0.5 * config.buffer as f64 / config.extent as f64;
    let k2 = 0.5 - k1;
    let k3 = 0.5 + k1;
    let k4 = 1.0 + k1;
    let z2 = (1u64 << coord.z) as f64;
    let x = coord.x as f64;
    let y = coord.y as f64;

    let vertical = |half: Vec<TileFeature>, top: TileCoord, bottom: TileCoord| {
        if half.is_empty() {
            return (None, None);
        }
        let half_bbox = features_bbox(&half);
        let make = |features: Vec<TileFeature>, child: TileCoord| {
            (!features.is_empty()).then(|| Tile::new(features, child, Arc::clone(config)))
        };
        rayon::join(
            || {
                make(
                    clip_features(&half, z2, y - k1, y + k3, Axis::Y, half_bbox.min_y, half_bbox.max_y),
                    top,
                )
            },
            || {
                make(
                    clip_features(&half, z2, y + k2, y + k4, Axis::Y, half_bbox.min_y, half_bbox.max_y),
                    bottom,
                )
            },
        )
    };

    let [tl, tr, br, bl] = coord.children();
    let ((tl_tile, bl_tile), (tr_tile, br_tile)) = rayon::join(
        || {
            let left = clip_features(tile.features(), z2, x - k1, x + k3, Axis::X, bbox.min_x, bbox.max_x);
            vertical(left, tl, bl)
        },
        || {
            let right = clip_features(tile.features(), z2, x + k2, x + k4, Axis::X, bbox.min_x, bbox.max_x);
            vertical(right, tr, br)
        },
    );
    [tl_tile, tr_tile, br_tile, bl_tile]
}

fn features_bbox(features: &[TileFeature]) -> BBox {
    let mut bbox = BBox::empty();
    for feature in features {
        bbox.union(feature.bbox());
    }
    bbox
}

/// Whether `tile` is a leaf of the current split.
fn stops(tile: &Tile, target: Option<TileCoord>) -> bool {
    let config = tile.config();
    let coord = tile.coord();
    if tile.is_empty() || coord.z >= config.max_zoom {
        return true;
    }
    match target {
        None => coord.z >= config.index_max_zoom && tile.num_points() <= config.index_max_points,
        Some(target) => coord.z >= target.z || !coord.contains(&target),
    }
}

/// A tile produced by a split, and whether it was split further.
type Node = (Tile, bool);

/// Split `tile` recursively. Without a target the stop rule of the index
/// applies; with a target only the branch containing it is descended, while
/// its siblings are kept as unsplit leaves.
fn split_tree(tile: Tile, target: Option<TileCoord>) -> Vec<Node> {
    if stops(&tile, target) {
        return vec![(tile, false)];
    }

    let children: Vec<Tile> = split_children(&tile).into_iter().flatten().collect();
    log::trace!("Split tile {} into {} children", tile.coord(), children.len());

    let (descend, leaves): (Vec<Tile>, Vec<Tile>) = children
        .into_iter()
        .partition(|child| target.map_or(true, |t| child.coord().contains(&t)));

    let mut out = vec![(tile, true)];
    out.extend(leaves.into_iter().map(|leaf| (leaf, false)));
    out.extend(split_all(descend, target));
    out
}

fn split_all(mut tiles: Vec<Tile>, target: Option<TileCoord>) -> Vec<Node> {
    match tiles.len() {
        0 => Vec::new(),
        1 => match tiles.pop() {
            Some(tile) => split_tree(tile, target),
            None => Vec::new(),
        },
        n => {
            let right = tiles.split_off(n / 2);
            let (mut a, b) = rayon::join(
                || split_all(tiles, target),
                || split_all(right, target),
            );
            a.extend(b);
            a
        }
    }
}

fn root_tile(features: &[geojson::Feature], config: &Arc<TilerConfig>) -> Result<Tile> {
    config.validate()?;
    let converted = convert_features(features, config)?;
    let wrapped = wrap(converted, config.world_buffer());
    Ok(Tile::new(wrapped, TileCoord::new(0, 0, 0), Arc::clone(config)))
}

fn check_coord(coord: &TileCoord, config: &TilerConfig) -> Result<()> {
    if !coord.is_valid() {
        return Err(Error::InvalidConfig(format!("invalid tile {}", coord)));
    }
    if coord.z > config.max_zoom {
        return Err(Error::InvalidConfig(format!(
            "tile {} is deeper than max_zoom {}",
            coord, config.max_zoom
        )));
    }
    Ok(())
}

// ============================================================================
// Index
// ============================================================================

/// A tile pyramid over a feature collection.
pub struct TileIndex {
    config: Arc<TilerConfig>,
    tiles: HashMap<TileCoord, Tile>,
    split: HashSet<TileCoord>,
}

impl TileIndex {
    /// Convert the features and split them down to the index depth.
    pub fn new(features: &[geojson::Feature], config: TilerConfig) -> Result<Self> {
        let config = Arc::new(config);
        let root = root_tile(features, &config)?;
        let mut index = Self {
            config,
            tiles: HashMap::new(),
            split: HashSet::new(),
        };
        index.insert(split_tree(root, None));
        log::debug!(
            "Built tile index: {} tiles, {} split",
            index.tiles.len(),
            index.split.len()
        );
        Ok(index)
    }

    fn insert(&mut self, nodes: Vec<Node>) {
        for (tile, was_split) in nodes {
            if was_split {
                self.split.insert(tile.coord());
            }
            self.tiles.insert(tile.coord(), tile);
        }
    }

    pub fn config(&self) -> &TilerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Every tile materialized so far.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// The tile at `coord`, drilling down from its nearest materialized
    /// ancestor if needed. `None` means no feature reaches the tile.
    pub fn get_tile(&mut self, coord: TileCoord) -> Result<Option<&Tile>> {
        check_coord(&coord, &self.config)?;

        if !self.tiles.contains_key(&coord) {
            let ancestor = (0..coord.z)
                .rev()
                .filter_map(|z| coord.ancestor_at(z))
                .find(|a| self.tiles.contains_key(a));

            match ancestor {
                Some(ancestor) if !self.split.contains(&ancestor) => {
                    log::debug!("Drilling down from {} to {}", ancestor, coord);
                    if let Some(tile) = self.tiles.get(&ancestor).cloned() {
                        let nodes = split_tree(tile, Some(coord));
                        self.insert(nodes);
                    }
                }
                _ => return Ok(None),
            }
        }
        Ok(self.tiles.get(&coord))
    }
}

/// Build the single tile at `coord`.
///
/// Splits from the root straight down to `coord`. If no feature reaches the
/// tile an empty tile is returned; an empty collection yields an empty root.
pub fn tile_from_geojson(
    features: &[geojson::Feature],
    coord: TileCoord,
    config: &TilerConfig,
) -> Result<Tile> {
    let config = Arc::new(config.clone());
    check_coord(&coord, &config)?;
    let root = root_tile(features, &config)?;
    let tile = split_tree(root, Some(coord))
        .into_iter()
        .map(|(tile, _)| tile)
        .find(|tile| tile.coord() == coord);
    Ok(tile.unwrap_or_else(|| Tile::empty(coord, config)))
}
