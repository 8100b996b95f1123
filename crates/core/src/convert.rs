//! GeoJSON to tiler features and back.
//!
//! Features are projected into the unit square and every line and ring is run
//! through the importance simplifier once, at the tolerance of the deepest
//! zoom. Later zooms only filter vertices by their stored importance.

use std::io::Read;
use std::sync::Arc;

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use geojson::feature::Id;
use geojson::{GeoJson, Position, Value};

use crate::geometry::{TileFeature, TileGeometry, TileLine, TilePoint};
use crate::mvt::properties_from_json;
use crate::projection::{project_x, project_y, unproject_x, unproject_y};
use crate::simplify::simplify_line;
use crate::tiler::TilerConfig;
use crate::{Error, Result};

/// Squared simplification tolerance in world units for `config`.
pub fn conversion_tolerance(config: &TilerConfig) -> f64 {
    let tolerance = config.tolerance / ((1u64 << config.max_zoom) as f64 * config.extent as f64);
    tolerance * tolerance
}

fn project(position: &Position, feature_index: usize) -> Result<TilePoint> {
    match position.as_slice() {
        [lng, lat, ..] => Ok(TilePoint::new(project_x(*lng), project_y(*lat), 0.0)),
        _ => Err(Error::InvalidGeometry {
            feature_id: feature_index,
            reason: format!("position with {} coordinates", position.len()),
        }),
    }
}

fn convert_line(
    positions: &[Position],
    sq_tolerance: f64,
    is_ring: bool,
    feature_index: usize,
) -> Result<TileLine> {
    let mut line = positions
        .iter()
        .map(|p| project(p, feature_index))
        .collect::<Result<TileLine>>()?;

    if is_ring {
        if let (Some(first), Some(last)) = (line.first().copied(), line.last()) {
            if first.x != last.x || first.y != last.y {
                line.push(first);
            }
        }
    }
    simplify_line(&mut line, sq_tolerance);
    Ok(line)
}

fn convert_rings(
    rings: &[Vec<Position>],
    sq_tolerance: f64,
    feature_index: usize,
) -> Result<Vec<TileLine>> {
    rings
        .iter()
        .map(|ring| convert_line(ring, sq_tolerance, true, feature_index))
        .collect()
}

/// Project and simplify one GeoJSON geometry.
pub fn convert_geometry(value: &Value, sq_tolerance: f64, feature_index: usize) -> Result<TileGeometry> {
    Ok(match value {
        Value::Point(p) => TileGeometry::Point(project(p, feature_index)?),
        Value::MultiPoint(points) => TileGeometry::MultiPoint(
            points
                .iter()
                .map(|p| project(p, feature_index))
                .collect::<Result<_>>()?,
        ),
        Value::LineString(line) => {
            TileGeometry::LineString(convert_line(line, sq_tolerance, false, feature_index)?)
        }
        Value::MultiLineString(lines) => TileGeometry::MultiLineString(
            lines
                .iter()
                .map(|line| convert_line(line, sq_tolerance, false, feature_index))
                .collect::<Result<_>>()?,
        ),
        Value::Polygon(rings) => {
            TileGeometry::Polygon(convert_rings(rings, sq_tolerance, feature_index)?)
        }
        Value::MultiPolygon(polygons) => TileGeometry::MultiPolygon(
            polygons
                .iter()
                .map(|rings| convert_rings(rings, sq_tolerance, feature_index))
                .collect::<Result<_>>()?,
        ),
        Value::GeometryCollection(_) => {
            return Err(Error::InvalidGeometry {
                feature_id: feature_index,
                reason: "GeometryCollection is not supported".to_string(),
            })
        }
    })
}

/// Convert one GeoJSON feature. Features without geometry yield `None`.
pub fn convert_feature(
    feature: &geojson::Feature,
    feature_index: usize,
    sq_tolerance: f64,
) -> Result<Option<TileFeature>> {
    let Some(geometry) = feature.geometry.as_ref() else {
        log::warn!("Skipping feature {} without geometry", feature_index);
        return Ok(None);
    };
    let geometry = convert_geometry(&geometry.value, sq_tolerance, feature_index)?;
    let tags = feature
        .properties
        .as_ref()
        .map(properties_from_json)
        .unwrap_or_default();
    Ok(Some(TileFeature::new(feature.id.clone(), geometry, Arc::new(tags))))
}

/// Convert a feature collection for tiling with `config`.
pub fn convert_features(features: &[geojson::Feature], config: &TilerConfig) -> Result<Vec<TileFeature>> {
    let sq_tolerance = conversion_tolerance(config);
    let mut out = Vec::with_capacity(features.len());
    for (index, feature) in features.iter().enumerate() {
        if let Some(converted) = convert_feature(feature, index, sq_tolerance)? {
            out.push(converted);
        }
    }
    log::debug!("Converted {} of {} features", out.len(), features.len());
    Ok(out)
}

/// Read GeoJSON text and return its features. A bare feature or geometry is
/// returned as a one-element list.
pub fn read_features<R: Read>(mut reader: R) -> Result<Vec<geojson::Feature>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    })
}

/// Numeric feature id for the encoder; string ids have no MVT representation.
pub fn feature_id(id: Option<&Id>) -> Option<u64> {
    match id? {
        Id::Number(n) => n.as_u64(),
        Id::String(_) => None,
    }
}

// ----------------------------------------------------------------------------
// Reprojection
// ----------------------------------------------------------------------------

fn unproject(p: &TilePoint) -> Coord<f64> {
    Coord {
        x: unproject_x(p.x),
        y: unproject_y(p.y),
    }
}

fn unproject_line(line: &[TilePoint]) -> LineString<f64> {
    LineString::new(line.iter().map(unproject).collect())
}

fn unproject_polygon(rings: &[TileLine]) -> Polygon<f64> {
    let mut rings = rings.iter().map(|r| unproject_line(r));
    let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Polygon::new(exterior, rings.collect())
}

/// Reproject a world-space tiler geometry to lng/lat.
pub fn to_lng_lat(geometry: &TileGeometry) -> Geometry<f64> {
    match geometry {
        TileGeometry::Point(p) => Geometry::Point(Point(unproject(p))),
        TileGeometry::MultiPoint(points) => Geometry::MultiPoint(MultiPoint::new(
            points.iter().map(|p| Point(unproject(p))).collect(),
        )),
        TileGeometry::LineString(line) => Geometry::LineString(unproject_line(line)),
        TileGeometry::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines.iter().map(|l| unproject_line(l)).collect(),
        )),
        TileGeometry::Polygon(rings) => Geometry::Polygon(unproject_polygon(rings)),
        TileGeometry::MultiPolygon(polygons) => Geometry::MultiPolygon(MultiPolygon::new(
            polygons.iter().map(|p| unproject_polygon(p)).collect(),
        )),
    }
}

/// Convert a tiler feature back to GeoJSON in lng/lat.
pub fn to_geojson(feature: &TileFeature) -> geojson::Feature {
    let geometry = to_lng_lat(feature.geometry());
    let properties: serde_json::Map<String, serde_json::Value> = feature
        .tags()
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(Value::from(&geometry))),
        id: feature.id().cloned(),
        properties: Some(properties),
        foreign_members: None,
    }
}
