//! Client de l'API d'annotations et du catalogue de couches
//!
//! Les lectures passent par le [`RequestCache`] (dédupliquées), les
//! écritures partent toujours sur le réseau.

use std::sync::Arc;

use geojson::Feature;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dedup::RequestCache;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use crate::types::{LayerCatalog, ViewportFrame};
use crate::Result;

pub const LAYERS_PATH: &str = "/v1/layers";
pub const ANNOTATIONS_PATH: &str = "/v1/annotations";
pub const ANNOTATIONS_QUERY_PATH: &str = "/v1/annotations/query";

/// Corps d'une sauvegarde : l'ensemble complet des entités + le frame
#[derive(Debug, Serialize)]
struct SavePayload<'a> {
    frame: &'a ViewportFrame,
    features: &'a [Feature],
}

/// Réponse d'une lecture : `{"features": [...]}` ou un tableau nu
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureList {
    Collection { features: Vec<Feature> },
    Bare(Vec<Feature>),
}

impl From<FeatureList> for Vec<Feature> {
    fn from(list: FeatureList) -> Self {
        match list {
            FeatureList::Collection { features } => features,
            FeatureList::Bare(features) => features,
        }
    }
}

/// Client haut niveau
#[derive(Clone)]
pub struct ApiClient {
    cache: RequestCache,
    secret: Option<String>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            cache: RequestCache::new(transport),
            secret: None,
        }
    }

    /// Secret transmis aux suppressions
    pub fn with_secret(mut self, secret: Option<String>) -> Self {
        self.secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.cache.call(request).await?;
        Ok(response.error_for_status()?)
    }

    /// `GET /v1/layers`
    pub async fn layers(&self) -> Result<LayerCatalog> {
        let response = self.execute(HttpRequest::get(LAYERS_PATH)).await?;
        response.json()
    }

    /// `GET /v1/annotations?...` cadré sur le frame
    pub async fn fetch_annotations(&self, frame: &ViewportFrame) -> Result<Vec<Feature>> {
        let request = frame_query(HttpRequest::get(ANNOTATIONS_PATH), frame);
        self.read_features(request).await
    }

    /// `POST /v1/annotations/query` : même contrat que la lecture, frame en corps
    pub async fn query_annotations(&self, frame: &ViewportFrame) -> Result<Vec<Feature>> {
        let request = HttpRequest::post(ANNOTATIONS_QUERY_PATH)
            .json(frame)?
            .deduplicated(true);
        self.read_features(request).await
    }

    async fn read_features(&self, request: HttpRequest) -> Result<Vec<Feature>> {
        let response = self.execute(request).await?;
        if response.is_empty() {
            return Ok(Vec::new());
        }
        Ok(response.json::<FeatureList>()?.into())
    }

    /// `POST /v1/annotations` : renvoie les entités dans l'ordre de soumission
    pub async fn save_annotations(
        &self,
        frame: &ViewportFrame,
        features: &[Feature],
    ) -> Result<Vec<Feature>> {
        let request = HttpRequest::post(ANNOTATIONS_PATH).json(&SavePayload { frame, features })?;
        let response = self.execute(request).await?;
        if response.is_empty() {
            return Ok(Vec::new());
        }
        Ok(response.json::<FeatureList>()?.into())
    }

    /// `DELETE /v1/annotations/{id}?secret=`
    pub async fn delete_annotation(&self, id: &str) -> Result<()> {
        // L'identifiant vient du serveur, il peut contenir `/`, `?` ou `#`
        let mut request =
            HttpRequest::delete(format!("{}/{}", ANNOTATIONS_PATH, urlencoding::encode(id)));
        if let Some(secret) = &self.secret {
            request = request.query("secret", secret);
        }
        let response = self.execute(request).await?;
        debug!(id, status = response.status, "Annotation deleted");
        Ok(())
    }
}

/// Paramètres de lecture dérivés du frame (bbox sous les deux nommages)
pub fn frame_query(mut request: HttpRequest, frame: &ViewportFrame) -> HttpRequest {
    let sw = frame.extent.south_west();
    let ne = frame.extent.north_east();

    request = request
        .query("layerKey", &frame.layer_key)
        .query("projection", frame.projection);
    if let Some(zoom) = frame.zoom {
        request = request.query("zoom", zoom);
    }
    request = request
        .query("centerLon", frame.center.lon)
        .query("centerLat", frame.center.lat)
        .query("minLon", frame.extent.min_lon)
        .query("minLat", frame.extent.min_lat)
        .query("maxLon", frame.extent.max_lon)
        .query("maxLat", frame.extent.max_lat)
        .query("swLon", sw.lon)
        .query("swLat", sw.lat)
        .query("neLon", ne.lon)
        .query("neLat", ne.lat);
    if let Some(date) = &frame.date {
        request = request.query("date", date);
    }
    request
}
