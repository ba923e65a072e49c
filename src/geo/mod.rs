use crate::models::driver::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance in kilometres.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let h = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    EARTH_RADIUS_KM * 2.0 * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::haversine_km;
    use crate::models::driver::GeoPoint;

    #[test]
    fn same_point_is_zero() {
        let lagos = GeoPoint {
            lat: 6.5244,
            lng: 3.3792,
        };
        assert!(haversine_km(&lagos, &lagos) < 1e-9);
    }

    #[test]
    fn lagos_to_abuja_is_around_525_km() {
        let lagos = GeoPoint {
            lat: 6.5244,
            lng: 3.3792,
        };
        let abuja = GeoPoint {
            lat: 9.0765,
            lng: 7.3986,
        };
        let distance = haversine_km(&lagos, &abuja);
        assert!((distance - 525.0).abs() < 15.0, "got {distance}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint { lat: 1.0, lng: 2.0 };
        let b = GeoPoint { lat: -3.0, lng: 4.5 };
        assert!((haversine_km(&a, &b) - haversine_km(&b, &a)).abs() < 1e-9);
    }
}
