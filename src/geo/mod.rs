use std::fmt;
use itertools::Itertools;

/// A map location. Shapefiles store (x, y); for geographic data that is
/// (longitude, latitude).
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate { latitude: latitude, longitude: longitude }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.latitude, self.longitude)
    }
}

fn write_coordinates(f: &mut fmt::Formatter<'_>, coordinates: &[Coordinate]) -> fmt::Result {
    write!(f, "[")?;
    for (i, c) in coordinates.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", c)?;
    }
    write!(f, "]")
}

/// A closed outline with optional holes.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub exterior: Box<[Coordinate]>,
    pub interiors: Vec<Box<[Coordinate]>>,
}

/// Something to draw on a map for one record.
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    Polygon(Polygon),
    Polyline(Box<[Coordinate]>),
    Point(Coordinate),
}

impl fmt::Display for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            &Overlay::Polygon(ref polygon) => {
                write!(f, "Polygon(")?;
                write_coordinates(f, &polygon.exterior)?;
                for interior in polygon.interiors.iter() {
                    write!(f, ", hole ")?;
                    write_coordinates(f, interior)?;
                }
                write!(f, ")")
            }
            &Overlay::Polyline(ref coordinates) => {
                write!(f, "Polyline(")?;
                write_coordinates(f, coordinates)?;
                write!(f, ")")
            }
            &Overlay::Point(ref c) => write!(f, "Point{}", c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindingOrder {
    Clockwise,
    CounterClockwise,
}

/// Returns 2*area, positive iff the ring is counter-clockwise.
///
/// Assumes y grows **upwards** (north is positive), as in shapefiles.
///
/// Assumes the first and last Coordinates are identical; if they aren't, the
/// closing edge is left out of the sum.
pub fn signed_area2<'a, T: IntoIterator<Item=&'a Coordinate>>(coordinates: T) -> f64 {
    // https://en.wikipedia.org/wiki/Shoelace_formula
    let mut a = 0.;

    for (p1, p2) in coordinates.into_iter().tuple_windows() {
        a += p1.longitude * p2.latitude - p2.longitude * p1.latitude;
    }

    a
}

/// Returns winding order.
///
/// Assumes y grows upwards. A zero-area ring is considered to be Clockwise,
/// which is what shapefiles use for outer rings.
pub fn winding_order<'a, T: IntoIterator<Item=&'a Coordinate>>(coordinates: T) -> WindingOrder {
    if signed_area2(coordinates) > 0. {
        WindingOrder::CounterClockwise
    } else {
        WindingOrder::Clockwise
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ring(points: &[(f64, f64)]) -> Vec<Coordinate> {
        points.iter().map(|&(x, y)| Coordinate::new(y, x)).collect()
    }

    #[test]
    fn clockwise_square() {
        // (0,0) → up → right → down → back
        let r = ring(&[ (0., 0.), (0., 1.), (1., 1.), (1., 0.), (0., 0.) ]);
        assert_eq!(-2., signed_area2(&r));
        assert_eq!(WindingOrder::Clockwise, winding_order(&r));
    }

    #[test]
    fn counter_clockwise_square() {
        let r = ring(&[ (0., 0.), (1., 0.), (1., 1.), (0., 1.), (0., 0.) ]);
        assert_eq!(2., signed_area2(&r));
        assert_eq!(WindingOrder::CounterClockwise, winding_order(&r));
    }

    #[test]
    fn degenerate_ring_is_clockwise() {
        let r = ring(&[ (0., 0.), (1., 1.), (0., 0.) ]);
        assert_eq!(WindingOrder::Clockwise, winding_order(&r));
    }

    #[test]
    fn display() {
        let overlay = Overlay::Polyline(ring(&[ (1., 2.), (3., 4.) ]).into_boxed_slice());
        assert_eq!("Polyline([(2,1),(4,3)])", overlay.to_string());
    }
}
