//! Types de données partagés : projections, frames, catalogue de couches

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Projection de travail d'une couche (et donc de la vue)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Projection {
    /// Géographique WGS84 (EPSG:4326), en degrés
    Geographic,
    /// Web Mercator (EPSG:3857), en mètres
    #[default]
    WebMercator,
}

impl Projection {
    /// Code EPSG numérique
    pub fn epsg(self) -> u32 {
        match self {
            Self::Geographic => 4326,
            Self::WebMercator => 3857,
        }
    }

    /// Forme textuelle `EPSG:<code>`
    pub fn code(self) -> &'static str {
        match self {
            Self::Geographic => "EPSG:4326",
            Self::WebMercator => "EPSG:3857",
        }
    }

    /// Le fond de carte de référence n'existe qu'en Web Mercator
    pub fn shows_backdrop(self) -> bool {
        matches!(self, Self::WebMercator)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

impl FromStr for Projection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        let digits = code
            .strip_prefix("EPSG:")
            .or_else(|| code.strip_prefix("epsg:"))
            .unwrap_or(code);
        match digits {
            "4326" => Ok(Self::Geographic),
            "3857" | "900913" => Ok(Self::WebMercator),
            _ => Err(Error::UnknownProjection(s.to_string())),
        }
    }
}

impl TryFrom<String> for Projection {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Projection> for String {
    fn from(value: Projection) -> Self {
        value.code().to_string()
    }
}

/// Point géographique en degrés
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Emprise géographique en degrés
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Extent {
    /// Coin sud-ouest
    pub fn south_west(&self) -> LonLat {
        LonLat::new(self.min_lon, self.min_lat)
    }

    /// Coin nord-est
    pub fn north_east(&self) -> LonLat {
        LonLat::new(self.max_lon, self.max_lat)
    }

    pub fn contains(&self, point: LonLat) -> bool {
        point.lon >= self.min_lon
            && point.lon <= self.max_lon
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }
}

/// Instantané de la vue utilisé pour cadrer une lecture ou une écriture
/// d'annotations. Recalculé à chaque fin de déplacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportFrame {
    pub layer_key: String,
    pub projection: Projection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    pub center: LonLat,
    pub extent: Extent,
}

/// Description d'une couche tuilée du catalogue distant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    /// Identifiant global de la couche
    pub layer_key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body_id: String,
    pub projection: Projection,
    /// Modèle d'URL (`{z}`, `{x}`, `{y}`, éventuellement `{date}`)
    pub tile_template: String,
    #[serde(default)]
    pub requires_date: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
}

impl LayerDescriptor {
    /// Bornes de zoom effectives
    pub fn zoom_bounds(&self, default_max: f64) -> (f64, f64) {
        let min = self.min_zoom.unwrap_or(0.0);
        let max = self.max_zoom.unwrap_or(default_max).max(min);
        (min, max)
    }

    /// Date effectivement utilisée par les tuiles : seulement si la couche en exige une
    pub fn effective_date<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        if !self.requires_date {
            return None;
        }
        requested.or(self.default_date.as_deref())
    }

    /// URL d'une tuile
    pub fn tile_url(&self, date: Option<&str>, z: u32, x: u32, y: u32) -> String {
        let mut url = self
            .tile_template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());
        if let Some(date) = self.effective_date(date) {
            url = url.replace("{date}", date);
        }
        url
    }
}

/// Groupe de couches d'un même corps céleste / thème
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogBody {
    pub body_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub layers: Vec<LayerDescriptor>,
}

/// Catalogue de couches, groupé par `bodyId`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerCatalog {
    #[serde(default)]
    pub bodies: Vec<CatalogBody>,
}

impl LayerCatalog {
    /// Toutes les couches, dans l'ordre du catalogue
    pub fn layers(&self) -> impl Iterator<Item = &LayerDescriptor> {
        self.bodies.iter().flat_map(|b| b.layers.iter())
    }

    /// Première couche du catalogue (couche par défaut)
    pub fn first(&self) -> Option<&LayerDescriptor> {
        self.layers().next()
    }

    /// Recherche une couche par clé
    pub fn find(&self, layer_key: &str) -> Option<&LayerDescriptor> {
        self.layers().find(|l| l.layer_key == layer_key)
    }

    /// Couches d'un corps donné
    pub fn by_body(&self, body_id: &str) -> Option<&CatalogBody> {
        self.bodies.iter().find(|b| b.body_id == body_id)
    }

    pub fn len(&self) -> usize {
        self.layers().count()
    }

    pub fn is_empty(&self) -> bool {
        self.first().is_none()
    }
}
