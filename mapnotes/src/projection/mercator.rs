//! Projection Web Mercator (EPSG:3857)
//!
//! Aussi connu sous le nom de Pseudo-Mercator ou Spherical Mercator.
//! Utilisé par Google Maps, OpenStreetMap, etc.

use super::ellipsoid::WGS84;
use super::Geographic;

/// Latitude limite de la grille Web Mercator (monde carré)
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Convertit coordonnées géographiques vers Web Mercator (EPSG:3857)
pub fn geographic_to_web_mercator(geo: Geographic) -> (f64, f64) {
    // Web Mercator utilise un modèle sphérique avec le rayon équatorial
    let r = WGS84::A;

    // Limiter la latitude pour éviter l'infini
    let lat = geo
        .lat
        .clamp(-MAX_LATITUDE.to_radians(), MAX_LATITUDE.to_radians());

    // X = R * longitude
    let x = r * geo.lon;

    // Y = R * ln(tan(π/4 + lat/2))
    let y = r * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();

    (x, y)
}

/// Convertit Web Mercator vers coordonnées géographiques
pub fn web_mercator_to_geographic(x: f64, y: f64) -> Geographic {
    let r = WGS84::A;

    // Longitude = x / R
    let lon = x / r;

    // Latitude = 2 * atan(exp(y/R)) - π/2
    let lat = 2.0 * (y / r).exp().atan() - std::f64::consts::FRAC_PI_2;

    Geographic::new(lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paris_to_web_mercator() {
        // Paris: 2.35°E, 48.85°N
        let geo = Geographic::from_degrees(2.35, 48.85);
        let (x, y) = geographic_to_web_mercator(geo);

        // X ≈ 261600, Y ≈ 6250000
        assert!((x - 261600.0).abs() < 1000.0, "x={}", x);
        assert!((y - 6250000.0).abs() < 10000.0, "y={}", y);
    }

    #[test]
    fn test_roundtrip() {
        let geo = Geographic::from_degrees(-122.4194, 37.7749);
        let (x, y) = geographic_to_web_mercator(geo);
        let (lon, lat) = web_mercator_to_geographic(x, y).to_degrees();

        assert!((lon - -122.4194).abs() < 1e-9, "lon={}", lon);
        assert!((lat - 37.7749).abs() < 1e-9, "lat={}", lat);
    }

    #[test]
    fn test_world_corner() {
        let geo = Geographic::from_degrees(180.0, MAX_LATITUDE);
        let (x, y) = geographic_to_web_mercator(geo);
        assert!((x - WGS84::HALF_CIRCUMFERENCE).abs() < 1e-6);
        assert!((y - WGS84::HALF_CIRCUMFERENCE).abs() < 1e-3, "y={}", y);
    }

    #[test]
    fn test_polar_latitude_is_clamped() {
        let (_, y) = geographic_to_web_mercator(Geographic::from_degrees(0.0, 90.0));
        assert!(y.is_finite());
    }
}
