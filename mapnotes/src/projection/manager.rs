//! Gestion de la projection de la vue lors d'un changement de couche

use serde::{Deserialize, Serialize};

use super::{ellipsoid::WGS84, from_lonlat, to_lonlat};
use crate::types::{Extent, LayerDescriptor, LonLat, Projection};

/// Zoom maximal quand la couche n'en déclare pas
pub const DEFAULT_MAX_ZOOM: f64 = 19.0;

/// Taille d'une tuile en pixels
const TILE_SIZE: f64 = 256.0;

/// Résolution au zoom 0 de la grille géographique (deux tuiles de 180°)
const GEOGRAPHIC_RESOLUTION_Z0: f64 = 180.0 / TILE_SIZE;

/// État de la vue dans sa projection de travail
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub projection: Projection,
    /// Centre en coordonnées projetées (degrés ou mètres)
    pub center: (f64, f64),
    pub zoom: f64,
    /// Afficher le fond de carte de référence
    pub show_backdrop: bool,
}

impl ViewState {
    /// Crée une vue centrée sur un point géographique
    pub fn new(projection: Projection, center: LonLat, zoom: f64) -> Self {
        Self {
            projection,
            center: from_lonlat(projection, center),
            zoom,
            show_backdrop: projection.shows_backdrop(),
        }
    }

    /// Centre en lon/lat
    pub fn center_lonlat(&self) -> LonLat {
        to_lonlat(self.projection, self.center.0, self.center.1)
    }

    /// Unités projetées par pixel au zoom courant
    pub fn resolution(&self) -> f64 {
        let z0 = match self.projection {
            Projection::Geographic => GEOGRAPHIC_RESOLUTION_Z0,
            Projection::WebMercator => 2.0 * WGS84::HALF_CIRCUMFERENCE / TILE_SIZE,
        };
        z0 / 2_f64.powf(self.zoom)
    }

    /// Emprise géographique visible pour une fenêtre de `width` x `height` pixels
    pub fn extent(&self, width: f64, height: f64) -> Extent {
        let res = self.resolution();
        let (cx, cy) = self.center;
        let half_w = width.max(0.0) * res / 2.0;
        let half_h = height.max(0.0) * res / 2.0;

        let sw = to_lonlat(self.projection, cx - half_w, cy - half_h);
        let ne = to_lonlat(self.projection, cx + half_w, cy + half_h);

        Extent {
            min_lon: sw.lon.max(-180.0),
            min_lat: sw.lat.max(-90.0),
            max_lon: ne.lon.min(180.0),
            max_lat: ne.lat.min(90.0),
        }
    }
}

/// Adapte la vue à la projection de la couche cible
///
/// Même projection : seul le zoom est borné. Sinon le centre passe par
/// lon/lat avant d'être exprimé dans la nouvelle projection
/// (`keep_center = false` recentre sur l'origine).
pub fn ensure_projection(current: &ViewState, target: &LayerDescriptor, keep_center: bool) -> ViewState {
    ensure_projection_with_max(current, target, keep_center, DEFAULT_MAX_ZOOM)
}

/// Variante de [`ensure_projection`] avec un zoom maximal par défaut explicite
pub fn ensure_projection_with_max(
    current: &ViewState,
    target: &LayerDescriptor,
    keep_center: bool,
    default_max_zoom: f64,
) -> ViewState {
    let (min_zoom, max_zoom) = target.zoom_bounds(default_max_zoom);
    let zoom = current.zoom.clamp(min_zoom, max_zoom);

    if current.projection == target.projection {
        return ViewState { zoom, ..*current };
    }

    let center = if keep_center {
        from_lonlat(target.projection, current.center_lonlat())
    } else {
        (0.0, 0.0)
    };

    ViewState {
        projection: target.projection,
        center,
        zoom,
        show_backdrop: target.projection.shows_backdrop(),
    }
}
