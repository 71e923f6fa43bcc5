//! Turns shape records into map overlays and coordinate lists.

use crate::geo::{self, Coordinate, Overlay, Polygon, WindingOrder};
use super::shp::{ShapeFamily, ShapeFile, ShapeRecord, ShpError, ShpPoint, ShpRing};

fn to_coordinate(point: &ShpPoint) -> Coordinate {
    Coordinate::new(point.y, point.x)
}

fn ring_to_coordinates(ring: &ShpRing) -> Box<[Coordinate]> {
    let coordinates: Vec<Coordinate> = ring.0.iter().map(to_coordinate).collect();
    coordinates.into_boxed_slice()
}

/// Groups rings into polygons: a clockwise ring starts a polygon and the
/// counter-clockwise rings after it are its holes. A hole with no outer ring
/// before it becomes a polygon of its own.
fn rings_to_polygons(rings: &[ShpRing]) -> Vec<Polygon> {
    let mut polygons = Vec::<Polygon>::new();

    for ring in rings.iter() {
        let coordinates = ring_to_coordinates(ring);

        if geo::winding_order(coordinates.iter()) == WindingOrder::CounterClockwise {
            if let Some(polygon) = polygons.last_mut() {
                polygon.interiors.push(coordinates);
                continue;
            }
        }

        polygons.push(Polygon {
            exterior: coordinates,
            interiors: vec![],
        });
    }

    polygons
}

/// Overlays for one record, in part order. Ring winding in the record is not
/// changed; it only decides which rings are holes.
pub fn record_overlays(record: &ShapeRecord) -> Vec<Overlay> {
    match record.shape_type.family() {
        ShapeFamily::Null => vec![],
        ShapeFamily::Point | ShapeFamily::MultiPoint => record.parts.iter()
            .flat_map(|ring| ring.0.iter())
            .map(|p| Overlay::Point(to_coordinate(p)))
            .collect(),
        ShapeFamily::PolyLine => record.parts.iter()
            .map(|ring| Overlay::Polyline(ring_to_coordinates(ring)))
            .collect(),
        ShapeFamily::Polygon => rings_to_polygons(&record.parts).into_iter()
            .map(Overlay::Polygon)
            .collect(),
        ShapeFamily::MultiPatch => record.parts.iter()
            .map(|ring| Overlay::Polygon(Polygon {
                exterior: ring_to_coordinates(ring),
                interiors: vec![],
            }))
            .collect(),
    }
}

/// Every point of every part of one record, in order.
pub fn record_coordinates(record: &ShapeRecord) -> Vec<Coordinate> {
    record.parts.iter()
        .flat_map(|ring| ring.0.iter())
        .map(to_coordinate)
        .collect()
}

impl ShapeFile {
    /// Polygon, polyline or point overlays for record `index`.
    pub fn overlays_for_index(&self, index: usize) -> Result<Vec<Overlay>, ShpError> {
        self.record_at(index).map(record_overlays)
    }

    /// Coordinates of record `index`, all parts concatenated.
    pub fn coordinates_for_index(&self, index: usize) -> Result<Vec<Coordinate>, ShpError> {
        self.record_at(index).map(record_coordinates)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;
    use crate::geo::{Coordinate, Overlay};
    use super::super::shp::{ShapeFile, ShapeType, ShpError, ShpReader};
    use super::super::testutil::*;

    fn load(bytes: Vec<u8>) -> ShapeFile {
        ShapeFile::from_shp_reader(ShpReader::new(Cursor::new(bytes)).unwrap()).unwrap()
    }

    // clockwise in y-up coordinates
    fn outer(x: f64) -> Vec<(f64, f64)> {
        vec![ (x, 0.), (x, 10.), (x + 10., 10.), (x + 10., 0.), (x, 0.) ]
    }

    fn hole(x: f64) -> Vec<(f64, f64)> {
        vec![ (x + 2., 2.), (x + 8., 2.), (x + 8., 8.), (x + 2., 8.), (x + 2., 2.) ]
    }

    #[test]
    fn polygon_holes_follow_their_outer_ring() {
        let shapes = load(shp_file(ShapeType::Polygon, &[
            polygon_record(1, ShapeType::Polygon, &[ outer(0.), hole(0.), outer(20.), hole(20.), hole(20.) ]),
        ]));

        let overlays = shapes.overlays_for_index(0).unwrap();
        assert_eq!(2, overlays.len());
        match (&overlays[0], &overlays[1]) {
            (&Overlay::Polygon(ref a), &Overlay::Polygon(ref b)) => {
                assert_eq!(1, a.interiors.len());
                assert_eq!(2, b.interiors.len());
                assert_eq!(Coordinate::new(0., 20.), b.exterior[0]);
                assert_eq!(Coordinate::new(2., 22.), b.interiors[0][0]);
            }
            other => panic!("expected two polygons, got {:?}", other),
        }
    }

    #[test]
    fn leading_hole_becomes_its_own_polygon() {
        let shapes = load(shp_file(ShapeType::Polygon, &[
            polygon_record(1, ShapeType::Polygon, &[ hole(0.) ]),
        ]));
        let overlays = shapes.overlays_for_index(0).unwrap();
        assert_eq!(1, overlays.len());
        match &overlays[0] {
            &Overlay::Polygon(ref p) => assert!(p.interiors.is_empty()),
            other => panic!("expected a polygon, got {:?}", other),
        }
    }

    #[test]
    fn polyline_parts_become_polylines() {
        let shapes = load(shp_file(ShapeType::PolyLine, &[
            polygon_record(1, ShapeType::PolyLine, &[ vec![ (0., 0.), (1., 1.) ], vec![ (2., 2.), (3., 3.), (4., 3.) ] ]),
        ]));
        let overlays = shapes.overlays_for_index(0).unwrap();
        assert_eq!(vec![
            Overlay::Polyline(vec![ Coordinate::new(0., 0.), Coordinate::new(1., 1.) ].into_boxed_slice()),
            Overlay::Polyline(vec![ Coordinate::new(2., 2.), Coordinate::new(3., 3.), Coordinate::new(3., 4.) ].into_boxed_slice()),
        ], overlays);
    }

    #[test]
    fn points_and_null_shapes() {
        let shapes = load(shp_file(ShapeType::Point, &[ point_record(1, 10., 20.), null_record(2) ]));
        assert_eq!(vec![ Overlay::Point(Coordinate::new(20., 10.)) ], shapes.overlays_for_index(0).unwrap());
        assert!(shapes.overlays_for_index(1).unwrap().is_empty());
        assert!(shapes.coordinates_for_index(1).unwrap().is_empty());
    }

    #[test]
    fn coordinates_concatenate_parts() {
        let shapes = load(shp_file(ShapeType::Polygon, &[
            polygon_record(1, ShapeType::Polygon, &[ outer(0.), hole(0.) ]),
        ]));
        let coordinates = shapes.coordinates_for_index(0).unwrap();
        assert_eq!(10, coordinates.len());
        assert_eq!(Coordinate::new(10., 0.), coordinates[1]);
    }

    #[test]
    fn bad_index() {
        let shapes = load(shp_file(ShapeType::Point, &[ point_record(1, 10., 20.) ]));
        assert!(matches!(shapes.overlays_for_index(1), Err(ShpError::IndexOutOfRange { index: 1, len: 1 })));
        assert!(matches!(shapes.coordinates_for_index(5), Err(ShpError::IndexOutOfRange { .. })));
    }
}
