use geo::HaversineDistance;

use crate::models::GeoPoint;

/// Geospatial bounding box
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Great-circle distance between two points in kilometers (haversine)
#[inline]
pub fn haversine_km(from: GeoPoint, to: GeoPoint) -> f64 {
    let a: geo::Point<f64> = from.into();
    let b: geo::Point<f64> = to.into();
    a.haversine_distance(&b) / 1000.0
}

/// Calculate a bounding box around a center point
///
/// Used as a cheap pre-filter before the exact haversine check.
/// 1° latitude ≈ 111km, 1° longitude ≈ 111km * cos(latitude)
pub fn calculate_bounding_box(center: GeoPoint, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / 111.0;
    // Guard the poles where cos(lat) approaches zero
    let lon_delta = (radius_km / (111.0 * center.latitude.to_radians().cos().abs().max(1e-6)))
        .min(180.0);

    BoundingBox {
        min_lat: center.latitude - lat_delta,
        max_lat: center.latitude + lat_delta,
        min_lon: center.longitude - lon_delta,
        max_lon: center.longitude + lon_delta,
    }
}

#[inline]
pub fn is_within_bounding_box(point: GeoPoint, bbox: &BoundingBox) -> bool {
    point.latitude >= bbox.min_lat
        && point.latitude <= bbox.max_lat
        && point.longitude >= bbox.min_lon
        && point.longitude <= bbox.max_lon
}

/// Human label for a distance: `<1 km away` or `N km away`
pub fn distance_text(distance_km: f64) -> String {
    if distance_km < 1.0 {
        "<1 km away".to_string()
    } else {
        format!("{} km away", distance_km.round() as u64)
    }
}
