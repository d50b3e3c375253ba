use std::sync::OnceLock;

use isocountry::CountryCode;
use reverse_geocoder::ReverseGeocoder;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const PLUS_CODE_LENGTH: usize = 10;

/// Great-circle distance in meters between two points given in decimal degrees.
pub fn haversine(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let dlon = lon2 - lon1;
    let dlat = lat2 - lat1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards asin against rounding pushing `a` just past 1.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    c * EARTH_RADIUS_KM * 1000.0
}

/// Initial compass bearing in degrees [0, 360) from `a` to `b`, each `(lat, lon)`.
pub fn bearing(a: (f64, f64), b: (f64, f64)) -> f64 {
    let lat1 = a.0.to_radians();
    let lat2 = b.0.to_radians();
    let diff_lon = (b.1 - a.1).to_radians();

    let x = diff_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * diff_lon.cos();

    let initial = x.atan2(y).to_degrees();
    let compass = (initial + 360.0) % 360.0;
    // (-tiny + 360) % 360 can round to exactly 360.0
    if compass >= 360.0 {
        0.0
    } else {
        compass
    }
}

/// Full (10-digit) Open Location Code for a position, e.g. `8FVC9G8F+6X`.
pub fn plus_code(latitude: f64, longitude: f64) -> String {
    open_location_code::encode(geo::Point::new(longitude, latitude), PLUS_CODE_LENGTH)
}

fn geocoder() -> &'static ReverseGeocoder {
    static GEOCODER: OnceLock<ReverseGeocoder> = OnceLock::new();
    GEOCODER.get_or_init(ReverseGeocoder::new)
}

/// Country of the nearest known place as `(name, ISO alpha-2 code)`.
/// Codes without an ISO entry fall back to the code as the name.
pub fn country(latitude: f64, longitude: f64) -> Option<(String, String)> {
    let nearest = geocoder().search((latitude, longitude));
    let code = nearest.record.cc.trim();
    if code.is_empty() {
        return None;
    }
    let name = CountryCode::for_alpha2(code)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|_| code.to_string());
    Some((name, code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_haversine_same_point_is_zero() {
        for (lon, lat) in [(0.0, 0.0), (2.3522, 48.8566), (-179.9, -89.5), (180.0, 90.0)] {
            assert_eq!(haversine(lon, lat, lon, lat), 0.0);
        }
    }

    #[test]
    fn test_haversine_symmetric() {
        let pairs = [
            ((2.3522, 48.8566), (-0.1276, 51.5072)),
            ((0.0, 0.0), (0.00005, 0.0)),
            ((139.6917, 35.6895), (-74.0060, 40.7128)),
        ];
        for ((lon1, lat1), (lon2, lat2)) in pairs {
            let ab = haversine(lon1, lat1, lon2, lat2);
            let ba = haversine(lon2, lat2, lon1, lat1);
            assert!((ab - ba).abs() < TOLERANCE, "{ab} != {ba}");
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // Paris to London is roughly 343.5 km.
        let d = haversine(2.3522, 48.8566, -0.1276, 51.5072);
        assert!((d - 343_500.0).abs() < 1_000.0, "got {d}");

        // 0.00005 degrees of longitude on the equator is about 5.56 m.
        let short = haversine(0.0, 0.0, 0.00005, 0.0);
        assert!((short - 5.5597).abs() < 0.001, "got {short}");
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert!((bearing((0.0, 0.0), (1.0, 0.0)) - 0.0).abs() < TOLERANCE);
        assert!((bearing((0.0, 0.0), (0.0, 1.0)) - 90.0).abs() < TOLERANCE);
        assert!((bearing((0.0, 0.0), (-1.0, 0.0)) - 180.0).abs() < TOLERANCE);
        assert!((bearing((0.0, 0.0), (0.0, -1.0)) - 270.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_bearing_range() {
        let points = [(0.0, 0.0), (10.0, -20.0), (-45.0, 170.0), (60.0, -179.0)];
        for a in points {
            for b in points {
                let h = bearing(a, b);
                assert!((0.0..360.0).contains(&h), "bearing {h} out of range");
            }
        }
    }

    #[test]
    fn test_plus_code_reference_values() {
        assert_eq!(plus_code(47.365590, 8.524997), "8FVC9G8F+6X");
        assert_eq!(plus_code(20.3700625, 2.7821875), "7FG49QCJ+2V");
        assert_eq!(plus_code(0.0, 0.0), "6FG22222+22");
    }

    #[test]
    fn test_plus_code_clips_poles() {
        let code = plus_code(90.0, 0.0);
        assert_eq!(code.len(), 11);
        assert_eq!(&code[8..9], "+");
    }

    #[test]
    fn test_country_of_capitals() {
        let (name, code) = country(51.5074, -0.1278).unwrap();
        assert_eq!(code, "GB");
        assert!(name.contains("United Kingdom"), "got {name}");

        let (_, code) = country(48.8566, 2.3522).unwrap();
        assert_eq!(code, "FR");
    }
}
