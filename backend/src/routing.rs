use crate::models::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Ground length of one degree of latitude on the haversine sphere.
pub const METERS_PER_DEGREE_LAT: f64 = EARTH_RADIUS_KM * 1000.0 * std::f64::consts::PI / 180.0;

pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    haversine_km(a, b) * 1000.0
}

/// Initial great-circle bearing from `from` to `to`, in degrees within `[0, 360)`.
pub fn initial_bearing_deg(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_bearing(y.atan2(x).to_degrees())
}

pub fn normalize_bearing(bearing_deg: f64) -> f64 {
    let mut value = bearing_deg % 360.0;
    if value < 0.0 {
        value += 360.0;
    }
    if value >= 360.0 {
        value -= 360.0;
    }
    value
}

pub fn is_valid_coordinate(coord: &Coordinate) -> bool {
    coord.lat.is_finite()
        && coord.lon.is_finite()
        && coord.lat >= -90.0
        && coord.lat <= 90.0
        && coord.lon >= -180.0
        && coord.lon <= 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_same_point() {
        let point = Coordinate { lat: 45.0, lon: 5.0 };
        assert_eq!(haversine_km(point, point), 0.0);
    }

    #[test]
    fn test_haversine_1km_north() {
        // 1km north ≈ 0.009° at any latitude
        let a = Coordinate { lat: 45.0, lon: 5.0 };
        let b = Coordinate { lat: 45.009, lon: 5.0 };
        assert!((haversine_m(a, b) - 1000.0).abs() < 10.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Coordinate { lat: 45.0, lon: 5.0 };
        let north = Coordinate { lat: 45.1, lon: 5.0 };
        let east = Coordinate { lat: 45.0, lon: 5.1 };
        let south = Coordinate { lat: 44.9, lon: 5.0 };

        assert!(initial_bearing_deg(origin, north).abs() < 1e-6);
        assert!((initial_bearing_deg(origin, east) - 90.0).abs() < 0.1);
        assert!((initial_bearing_deg(origin, south) - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_bearing() {
        assert_eq!(normalize_bearing(0.0), 0.0);
        assert_eq!(normalize_bearing(360.0), 0.0);
        assert_eq!(normalize_bearing(-90.0), 270.0);
        assert_eq!(normalize_bearing(450.0), 90.0);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(is_valid_coordinate(&Coordinate { lat: 90.0, lon: -180.0 }));
        assert!(!is_valid_coordinate(&Coordinate { lat: 200.0, lon: 0.0 }));
        assert!(!is_valid_coordinate(&Coordinate { lat: 0.0, lon: 180.5 }));
        assert!(!is_valid_coordinate(&Coordinate { lat: f64::NAN, lon: 0.0 }));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn valid_coord() -> impl Strategy<Value = Coordinate> {
            (-90.0..=90.0, -180.0..=180.0).prop_map(|(lat, lon)| Coordinate { lat, lon })
        }

        proptest! {
            #[test]
            fn prop_haversine_symmetric(a in valid_coord(), b in valid_coord()) {
                prop_assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
            }

            #[test]
            fn prop_haversine_triangle_inequality(
                a in valid_coord(),
                b in valid_coord(),
                c in valid_coord()
            ) {
                prop_assert!(haversine_km(a, c) <= haversine_km(a, b) + haversine_km(b, c) + 1e-6);
            }

            #[test]
            fn prop_bearing_in_range(a in valid_coord(), b in valid_coord()) {
                let bearing = initial_bearing_deg(a, b);
                prop_assert!((0.0..360.0).contains(&bearing));
            }
        }
    }
}
