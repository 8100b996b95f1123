//! End-to-end tiling: GeoJSON in, encoded tiles out, decoded back.

use geo::{BoundingRect, Geometry};
use geojson::GeoJson;
use geojson_tiles_core::mvt::{read_raw_tile, read_tile, Dialect, PropertyValue};
use geojson_tiles_core::pyramid::clip_feature;
use geojson_tiles_core::tile::lng_lat_to_tile;
use geojson_tiles_core::{tile_from_geojson, TileCoord, TileIndex, TilerConfig};

const WORLD: &str = r#"{
  "type": "FeatureCollection",
  "features": [{
    "type": "Feature",
    "properties": {"name": "world"},
    "geometry": {"type": "Polygon", "coordinates": [[
      [-180, -85.0511287798066], [180, -85.0511287798066],
      [180, 85.0511287798066], [-180, 85.0511287798066],
      [-180, -85.0511287798066]
    ]]}
  }]
}"#;

const CITIES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "id": 1, "properties": {"name": "Paris", "population": 2161000},
     "geometry": {"type": "Point", "coordinates": [2.3522, 48.8566]}},
    {"type": "Feature", "id": 2, "properties": {"name": "Berlin", "population": 3645000},
     "geometry": {"type": "Point", "coordinates": [13.4050, 52.5200]}},
    {"type": "Feature", "id": 3, "properties": {"name": "road", "lanes": 2},
     "geometry": {"type": "LineString", "coordinates": [[2.3522, 48.8566], [7.0, 50.5], [13.4050, 52.5200]]}},
    {"type": "Feature", "properties": {"name": "lake"},
     "geometry": {"type": "Polygon", "coordinates": [[[8, 46], [10, 46], [10, 48], [8, 48], [8, 46]]]}}
  ]
}"#;

fn parse(json: &str) -> Vec<geojson::Feature> {
    match json.parse::<GeoJson>().unwrap() {
        GeoJson::FeatureCollection(collection) => collection.features,
        other => panic!("expected a feature collection, got {:?}", other),
    }
}

#[test]
fn test_world_polygon_fills_root_tile() {
    let tile = tile_from_geojson(&parse(WORLD), TileCoord::new(0, 0, 0), &TilerConfig::default())
        .unwrap();
    assert_eq!(tile.num_features(), 1);

    for dialect in [Dialect::Mapbox, Dialect::Lk] {
        let data = tile.encode(dialect).unwrap();
        let features = read_raw_tile(&data, dialect).unwrap();
        assert_eq!(features.len(), 1);
        assert!(matches!(features[0].geometry, Geometry::Polygon(_)));

        let rect = features[0].geometry.bounding_rect().unwrap();
        assert!(rect.min().x.abs() <= 1.0);
        assert!(rect.min().y.abs() <= 1.0);
        assert!((rect.max().x - 4096.0).abs() <= 1.0);
        assert!((rect.max().y - 4096.0).abs() <= 1.0);
    }
}

#[test]
fn test_index_serves_encoded_tiles() {
    let config = TilerConfig::new(0, 10).with_layer_name("places");
    let mut index = TileIndex::new(&parse(CITIES), config).unwrap();

    let coord = lng_lat_to_tile(2.3522, 48.8566, 10);
    let tile = index.get_tile(coord).unwrap().unwrap();
    let data = tile.encode(Dialect::Mapbox).unwrap();

    let features = read_tile(&data, &coord, Dialect::Mapbox).unwrap();
    let paris = features
        .iter()
        .find(|f| f.id == Some(1))
        .unwrap();
    assert_eq!(paris.properties.get("name"), Some(&PropertyValue::from("Paris")));
    assert_eq!(paris.properties.get("population"), Some(&PropertyValue::UInt(2161000)));
    assert_eq!(paris.properties.get("layer"), Some(&PropertyValue::from("places")));

    match paris.geometry {
        Geometry::Point(p) => {
            // One pixel at zoom 10 with a 4096 extent is well under 1e-3 degrees.
            assert!((p.x() - 2.3522).abs() < 1e-3);
            assert!((p.y() - 48.8566).abs() < 1e-3);
        }
        ref other => panic!("expected a point, got {:?}", other),
    }

    // The road starts in Paris, so it reaches this tile too.
    assert!(features.iter().any(|f| f.id == Some(3)));
}

#[test]
fn test_index_and_single_tile_agree() {
    let features = parse(CITIES);
    let config = TilerConfig::new(0, 8);
    let mut index = TileIndex::new(&features, config.clone()).unwrap();

    for (lng, lat) in [(2.3522, 48.8566), (13.405, 52.52), (9.0, 47.0)] {
        let coord = lng_lat_to_tile(lng, lat, 8);
        let direct = tile_from_geojson(&features, coord, &config).unwrap();
        let cached = index.get_tile(coord).unwrap().unwrap();
        assert_eq!(
            cached.encode(Dialect::Lk).unwrap(),
            direct.encode(Dialect::Lk).unwrap(),
            "tile {}",
            coord
        );
    }
}

#[test]
fn test_simplification_drops_vertices_at_low_zoom() {
    let json = r#"{"type": "FeatureCollection", "features": [{
        "type": "Feature", "properties": {},
        "geometry": {"type": "LineString", "coordinates":
          [[0, 0], [0.001, 0.0005], [0.002, 0], [0.003, 0.0005], [0.004, 0], [10, 10]]}
    }]}"#;
    let features = parse(json);
    let config = TilerConfig::new(0, 14);

    let root = tile_from_geojson(&features, TileCoord::new(0, 0, 0), &config).unwrap();
    let deep_coord = lng_lat_to_tile(0.002, 0.0002, 14);
    let deep = tile_from_geojson(&features, deep_coord, &config).unwrap();

    assert!(root.num_simplified() < root.num_points());
    let root_points = match &read_raw_tile(&root.encode(Dialect::Mapbox).unwrap(), Dialect::Mapbox)
        .unwrap()[0]
        .geometry
    {
        Geometry::LineString(ls) => ls.0.len(),
        other => panic!("expected a line, got {:?}", other),
    };
    assert_eq!(root_points, 2);
    assert!(deep.num_simplified() > 2);
}

#[test]
fn test_pyramid_clip_of_decoded_feature() {
    let coord = TileCoord::new(0, 0, 0);
    let tile = tile_from_geojson(&parse(CITIES), coord, &TilerConfig::default()).unwrap();
    let data = tile.encode(Dialect::Mapbox).unwrap();
    let lake = read_tile(&data, &coord, Dialect::Mapbox)
        .unwrap()
        .into_iter()
        .find(|f| f.properties.get("name") == Some(&PropertyValue::from("lake")))
        .unwrap();

    let pieces = clip_feature(&lake, 6, false);
    assert!(!pieces.is_empty());
    for (tile, piece) in &pieces {
        assert_eq!(tile.z, 6);
        assert!(matches!(
            piece.geometry,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_)
        ));
    }
}
