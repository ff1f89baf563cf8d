//! Définitions des ellipsoïdes

/// Ellipsoïde WGS84
pub struct WGS84;

impl WGS84 {
    /// Demi-grand axe (rayon équatorial) en mètres
    pub const A: f64 = 6378137.0;

    /// Demi-circonférence équatoriale de la sphère Web Mercator, en mètres
    pub const HALF_CIRCUMFERENCE: f64 = std::f64::consts::PI * Self::A;
}
