//! CLI for geojson-tiles - cut GeoJSON into vector tiles and read them back
//!
//! This is a thin wrapper around the geojson-tiles-core library.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use geojson::FeatureCollection;
use geojson_tiles_core::convert;
use geojson_tiles_core::mvt::{read_tile, remove_layer, Dialect, VectorTile, LAYER_PROPERTY};
use geojson_tiles_core::{tile_from_geojson, TileCoord, TilerConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "geojson-tiles",
    about = "Cut GeoJSON into Mapbox Vector Tiles and decode them back",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build one tile from a GeoJSON file
    Tile {
        /// Input GeoJSON file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        coord: CoordArgs,

        /// Output file (default: Z-X-Y.mvt)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Tile dialect (mapbox, lk)
        #[arg(long, default_value = "mapbox")]
        dialect: Dialect,

        /// JSON file with tiler settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum zoom level, overrides the config file
        #[arg(long)]
        max_zoom: Option<u8>,

        /// Layer name, overrides the config file
        #[arg(long)]
        layer: Option<String>,
    },

    /// Print the features of a tile as a GeoJSON FeatureCollection
    Decode {
        /// Input tile
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        coord: CoordArgs,

        /// Tile dialect (mapbox, lk)
        #[arg(long, default_value = "mapbox")]
        dialect: Dialect,

        /// Decode feature by feature instead of all at once
        #[arg(long)]
        lazy: bool,
    },

    /// Remove a layer from a tile
    RemoveLayer {
        /// Input tile
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Name of the layer to remove
        #[arg(value_name = "NAME")]
        name: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Tile dialect (mapbox, lk)
        #[arg(long, default_value = "mapbox")]
        dialect: Dialect,
    },
}

#[derive(ClapArgs, Debug)]
struct CoordArgs {
    /// Zoom level
    #[arg(short, long)]
    z: u8,

    /// Tile column
    #[arg(short, long)]
    x: u32,

    /// Tile row
    #[arg(short, long)]
    y: u32,
}

impl CoordArgs {
    fn coord(&self) -> Result<TileCoord> {
        let coord = TileCoord::new(self.x, self.y, self.z);
        if !coord.is_valid() {
            anyhow::bail!("Invalid tile {}", coord);
        }
        Ok(coord)
    }
}

fn read_features(path: &Path) -> Result<Vec<geojson::Feature>> {
    let file = fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    convert::read_features(io::BufReader::new(file))
        .with_context(|| format!("Failed to read GeoJSON from {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<TilerConfig> {
    let Some(path) = path else {
        return Ok(TilerConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn decode(data: &[u8], coord: &TileCoord, dialect: Dialect, lazy: bool) -> Result<Vec<geojson::Feature>> {
    if !lazy {
        let features = read_tile(data, coord, dialect).context("Failed to decode tile")?;
        return Ok(features.iter().map(|f| f.to_geojson()).collect());
    }

    let tile = VectorTile::from_slice(data, dialect).context("Failed to index tile")?;
    let mut out = Vec::new();
    for layer in tile.layers() {
        for (index, feature) in layer.features().enumerate() {
            let mut feature = feature
                .and_then(|f| f.to_geojson(coord))
                .with_context(|| format!("Failed to decode feature {} of layer '{}'", index, layer.name()))?;
            feature.set_property(LAYER_PROPERTY, layer.name());
            out.push(feature);
        }
    }
    Ok(out)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Tile {
            input,
            coord,
            output,
            dialect,
            config,
            max_zoom,
            layer,
        } => {
            let coord = coord.coord()?;
            let mut config = load_config(config.as_deref())?;
            if let Some(max_zoom) = max_zoom {
                config.max_zoom = max_zoom;
            }
            if let Some(layer) = layer {
                config.layer_name = layer;
            }

            let features = read_features(&input)?;
            log::info!("Read {} features from {}", features.len(), input.display());

            let tile = tile_from_geojson(&features, coord, &config)
                .with_context(|| format!("Failed to build tile {}", coord))?;
            let data = tile
                .encode(dialect)
                .with_context(|| format!("Failed to encode tile {}", coord))?;

            let output = output
                .unwrap_or_else(|| PathBuf::from(format!("{}-{}-{}.mvt", coord.z, coord.x, coord.y)));
            fs::write(&output, &data)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!(
                "✓ Wrote tile {} ({} features, {} bytes) to {}",
                coord,
                tile.num_features(),
                data.len(),
                output.display()
            );
        }

        Command::Decode {
            input,
            coord,
            dialect,
            lazy,
        } => {
            let coord = coord.coord()?;
            let data = fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let features = decode(&data, &coord, dialect, lazy)?;
            log::info!("Decoded {} features", features.len());

            let collection = FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            };
            println!("{}", serde_json::to_string_pretty(&collection)?);
        }

        Command::RemoveLayer {
            input,
            name,
            output,
            dialect,
        } => {
            let data = fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let stripped = remove_layer(&data, &name, dialect)
                .with_context(|| format!("Failed to remove layer '{}'", name))?;
            fs::write(&output, &stripped)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!(
                "✓ Removed layer '{}' ({} bytes) and wrote {}",
                name,
                data.len() - stripped.len(),
                output.display()
            );
        }
    }

    Ok(())
}
