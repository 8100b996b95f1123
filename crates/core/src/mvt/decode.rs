//! Geometry command decoder shared by the bulk and lazy read paths.

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

use super::{command_decode, zigzag_decode, GeomType, CMD_CLOSE_PATH, CMD_LINE_TO, CMD_MOVE_TO};
use crate::{Error, Result};

/// Anything that can hand out an encoded feature geometry.
///
/// Implementors only supply the raw type and command stream; decoding lives in
/// [`decode_geometry`] so every read path reconstructs geometry the same way.
pub trait GeometryDecoder {
    fn geom_type(&self) -> GeomType;

    fn geometry_commands(&self) -> Result<Vec<u32>>;

    /// Decode the geometry in tile pixel coordinates.
    fn load_geometry(&self) -> Result<Geometry<f64>> {
        decode_geometry(self.geom_type(), &self.geometry_commands()?)
    }
}

/// Twice the signed shoelace area of a ring. Positive for outer rings in
/// y-down pixel space.
pub fn ring_area(ring: &LineString<f64>) -> f64 {
    let coords = &ring.0;
    let n = coords.len();
    (0..n)
        .map(|i| {
            let (a, b) = (coords[i], coords[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum()
}

/// Replay a command stream into paths of absolute pixel coordinates.
///
/// Each `MoveTo` starts a new path; `ClosePath` closes the current one by
/// repeating its first point and leaves the cursor where it was.
fn replay(commands: &[u32]) -> Result<Vec<Vec<Coord<f64>>>> {
    let mut paths: Vec<Vec<Coord<f64>>> = Vec::new();
    let (mut x, mut y) = (0i32, 0i32);
    let mut i = 0;

    while i < commands.len() {
        let (id, count) = command_decode(commands[i]);
        i += 1;
        match id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                let params = count as usize * 2;
                if commands.len() - i < params {
                    return Err(Error::Decode(format!(
                        "command at {} wants {} parameters, {} left",
                        i - 1,
                        params,
                        commands.len() - i
                    )));
                }
                if id == CMD_LINE_TO && paths.is_empty() {
                    return Err(Error::Decode("LineTo before MoveTo".to_string()));
                }
                for pair in commands[i..i + params].chunks_exact(2) {
                    x = x.wrapping_add(zigzag_decode(pair[0]));
                    y = y.wrapping_add(zigzag_decode(pair[1]));
                    let c = Coord {
                        x: x as f64,
                        y: y as f64,
                    };
                    if id == CMD_MOVE_TO {
                        paths.push(vec![c]);
                    } else if let Some(path) = paths.last_mut() {
                        path.push(c);
                    }
                }
                i += params;
            }
            CMD_CLOSE_PATH => {
                let path = paths
                    .last_mut()
                    .ok_or_else(|| Error::Decode("ClosePath before MoveTo".to_string()))?;
                if let Some(first) = path.first().copied() {
                    path.push(first);
                }
            }
            other => {
                return Err(Error::Decode(format!("unknown geometry command {}", other)));
            }
        }
    }
    Ok(paths)
}

/// Decode a command stream into a geometry in tile pixel coordinates.
///
/// Single-member results collapse to the single variant. Polygon rings are
/// grouped by orientation: a ring with positive area starts a new polygon and
/// the rings after it are its holes.
pub fn decode_geometry(geom_type: GeomType, commands: &[u32]) -> Result<Geometry<f64>> {
    let paths = replay(commands)?;
    if paths.is_empty() {
        return Err(Error::Decode("feature has an empty geometry".to_string()));
    }

    match geom_type {
        GeomType::Point => {
            let mut points: Vec<Point<f64>> =
                paths.into_iter().flatten().map(Point::from).collect();
            if points.len() == 1 {
                Ok(Geometry::Point(points.remove(0)))
            } else {
                Ok(Geometry::MultiPoint(MultiPoint::new(points)))
            }
        }
        GeomType::LineString => {
            let mut lines: Vec<LineString<f64>> =
                paths.into_iter().map(LineString::new).collect();
            if lines.len() == 1 {
                Ok(Geometry::LineString(lines.remove(0)))
            } else {
                Ok(Geometry::MultiLineString(MultiLineString::new(lines)))
            }
        }
        GeomType::Polygon => {
            let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
            for path in paths {
                let ring = LineString::new(path);
                let area = ring_area(&ring);
                match polygons.last_mut() {
                    Some((_, holes)) if area <= 0.0 => holes.push(ring),
                    _ => polygons.push((ring, Vec::new())),
                }
            }
            let mut polygons: Vec<Polygon<f64>> = polygons
                .into_iter()
                .map(|(exterior, holes)| Polygon::new(exterior, holes))
                .collect();
            if polygons.len() == 1 {
                Ok(Geometry::Polygon(polygons.remove(0)))
            } else {
                Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
            }
        }
        GeomType::Unknown => Err(Error::Decode("unknown geometry type".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mvt::{command_encode, zigzag_encode, Cursor};
    use crate::tile::TileCoord;
    use geo::{line_string, point, polygon};

    fn roundtrip(geometry: Geometry<i32>) -> Geometry<f64> {
        let mut cursor = Cursor::new(TileCoord::new(0, 0, 0), 4096);
        let geom_type = cursor.encode(&geometry).unwrap();
        decode_geometry(geom_type, cursor.geometry()).unwrap()
    }

    // ------------------------------------------------------------------------
    // Round trips
    // ------------------------------------------------------------------------

    #[test]
    fn test_decode_point() {
        let g = decode_geometry(GeomType::Point, &[9, 50, 34]).unwrap();
        assert_eq!(g, Geometry::Point(point!(x: 25.0, y: 17.0)));
    }

    #[test]
    fn test_decode_multi_point() {
        let g = decode_geometry(GeomType::Point, &[17, 10, 14, 3, 9]).unwrap();
        assert_eq!(
            g,
            Geometry::MultiPoint(MultiPoint::from(vec![(5.0, 7.0), (3.0, 2.0)]))
        );
    }

    #[test]
    fn test_collinear_line_keeps_order() {
        let g = roundtrip(Geometry::LineString(
            line_string![(x: 0, y: 0), (x: 1, y: 1), (x: 2, y: 2)],
        ));
        assert_eq!(
            g,
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 2.0)])
        );
    }

    #[test]
    fn test_degenerate_line_decodes_to_single_point() {
        let g = roundtrip(Geometry::LineString(
            line_string![(x: 3, y: 3), (x: 3, y: 3), (x: 3, y: 3)],
        ));
        match g {
            Geometry::LineString(ls) => assert_eq!(ls.0, vec![Coord { x: 3.0, y: 3.0 }]),
            other => panic!("expected a line, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_line() {
        let mls = MultiLineString::new(vec![
            line_string![(x: 2, y: 2), (x: 2, y: 10), (x: 10, y: 10)],
            line_string![(x: 1, y: 1), (x: 3, y: 5)],
        ]);
        let g = roundtrip(Geometry::MultiLineString(mls));
        match g {
            Geometry::MultiLineString(mls) => {
                assert_eq!(mls.0.len(), 2);
                assert_eq!(mls.0[1].0[1], Coord { x: 3.0, y: 5.0 });
            }
            other => panic!("expected a multi line, got {:?}", other),
        }
    }

    #[test]
    fn test_polygon_with_hole_groups_rings() {
        let p = polygon!(
            exterior: [(x: 0, y: 0), (x: 0, y: 10), (x: 10, y: 10), (x: 10, y: 0), (x: 0, y: 0)],
            interiors: [[(x: 2, y: 2), (x: 4, y: 2), (x: 4, y: 4), (x: 2, y: 4), (x: 2, y: 2)]],
        );
        match roundtrip(Geometry::Polygon(p)) {
            Geometry::Polygon(p) => {
                assert!(ring_area(p.exterior()) > 0.0);
                assert_eq!(p.interiors().len(), 1);
                assert!(ring_area(&p.interiors()[0]) < 0.0);
                assert!(p.exterior().is_closed());
            }
            other => panic!("expected a polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_polygon() {
        let mp = MultiPolygon::new(vec![
            polygon![(x: 0, y: 0), (x: 5, y: 0), (x: 5, y: 5), (x: 0, y: 5), (x: 0, y: 0)],
            polygon![(x: 10, y: 10), (x: 15, y: 10), (x: 15, y: 15), (x: 10, y: 15), (x: 10, y: 10)],
        ]);
        match roundtrip(Geometry::MultiPolygon(mp)) {
            Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected a multi polygon, got {:?}", other),
        }
    }

    // ------------------------------------------------------------------------
    // Malformed streams
    // ------------------------------------------------------------------------

    #[test]
    fn test_truncated_parameters() {
        let result = decode_geometry(GeomType::LineString, &[9, 4, 4, 18, 0]);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_unknown_command() {
        let result = decode_geometry(GeomType::Point, &[command_encode(5, 1), 0, 0]);
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_line_to_before_move_to() {
        let result = decode_geometry(
            GeomType::LineString,
            &[command_encode(CMD_LINE_TO, 1), zigzag_encode(1), 0],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_and_empty_stream() {
        assert!(decode_geometry(GeomType::Unknown, &[9, 0, 0]).is_err());
        assert!(decode_geometry(GeomType::Point, &[]).is_err());
    }
}
