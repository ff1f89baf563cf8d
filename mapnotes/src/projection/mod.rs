//! Projections de travail et reprojection de la vue
//!
//! Deux systèmes seulement :
//! - WGS84 géographique (EPSG:4326)
//! - Web Mercator (EPSG:3857)
//!
//! Toute conversion passe par la référence géographique (lon/lat).

mod ellipsoid;
mod manager;
mod mercator;

pub use ellipsoid::WGS84;
pub use manager::{ensure_projection, ensure_projection_with_max, ViewState, DEFAULT_MAX_ZOOM};
pub use mercator::MAX_LATITUDE;

use geo::{Coord, Geometry, MapCoords};

use crate::types::{LonLat, Projection};

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }
}

/// Coordonnées projetées → lon/lat (degrés)
pub fn to_lonlat(projection: Projection, x: f64, y: f64) -> LonLat {
    match projection {
        Projection::Geographic => LonLat::new(x, y),
        Projection::WebMercator => {
            let (lon, lat) = mercator::web_mercator_to_geographic(x, y).to_degrees();
            LonLat::new(lon, lat)
        }
    }
}

/// lon/lat (degrés) → coordonnées projetées
pub fn from_lonlat(projection: Projection, point: LonLat) -> (f64, f64) {
    match projection {
        Projection::Geographic => (point.lon, point.lat),
        Projection::WebMercator => {
            mercator::geographic_to_web_mercator(Geographic::from_degrees(point.lon, point.lat))
        }
    }
}

/// Transforme un point (x, y) de la source vers la cible
pub fn transform_point(source: Projection, target: Projection, x: f64, y: f64) -> (f64, f64) {
    if source == target {
        return (x, y);
    }
    // Étape 1: Source → Géographique, Étape 2: Géographique → Cible
    from_lonlat(target, to_lonlat(source, x, y))
}

/// Transforme une géométrie
pub fn transform_geometry(geom: &Geometry, source: Projection, target: Projection) -> Geometry {
    if source == target {
        return geom.clone();
    }
    geom.map_coords(|c| {
        let (x, y) = transform_point(source, target, c.x, c.y);
        Coord { x, y }
    })
}

/// Arrondit toutes les coordonnées d'une géométrie
pub fn round_geometry(geom: &Geometry, decimals: u8) -> Geometry {
    let factor = 10_f64.powi(i32::from(decimals));
    geom.map_coords(|c| Coord {
        x: (c.x * factor).round() / factor,
        y: (c.y * factor).round() / factor,
    })
}
