//! Contrôleur de vue : couche active, centre/zoom, date, permalien
//!
//! Relie le codec de permalien, le gestionnaire de projection et le suivi
//! des tuiles. Le permalien n'est recalculé qu'à `settle()`, jamais pendant
//! un geste.

use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

use crate::permalink::PermalinkState;
use crate::projection::{ensure_projection_with_max, from_lonlat, ViewState, DEFAULT_MAX_ZOOM};
use crate::tiles::{TileListener, TileLoadTracker, TileSourceKey};
use crate::types::{LayerCatalog, LayerDescriptor, LonLat, ViewportFrame};
use crate::{Error, Result};

/// Zoom initial quand le permalien n'en donne pas
pub const DEFAULT_ZOOM: f64 = 2.0;

/// Valide une date `YYYY-MM-DD`
pub fn parse_date(value: &str) -> Result<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| Error::InvalidDate(value.to_string()))
}

/// Date du jour (UTC) au format `YYYY-MM-DD`
pub fn today() -> String {
    let date = OffsetDateTime::now_utc().date();
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// Taille de la fenêtre en pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

impl ViewportSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self::new(1024.0, 768.0)
    }
}

/// État de la vue et de la couche active
#[derive(Debug)]
pub struct ViewController {
    layer: LayerDescriptor,
    view: ViewState,
    date: String,
    opacity: Option<f64>,
    size: ViewportSize,
    default_max_zoom: f64,
    tiles: TileLoadTracker,
    listener: TileListener,
    permalink: String,
}

impl ViewController {
    /// Construit la vue depuis un permalien, avec repli sur les valeurs par
    /// défaut : date du jour, première couche du catalogue, projection de la couche
    pub fn from_permalink(
        state: &PermalinkState,
        catalog: &LayerCatalog,
        today: &str,
        size: ViewportSize,
    ) -> Result<Self> {
        Self::from_permalink_with_max(state, catalog, today, size, DEFAULT_MAX_ZOOM)
    }

    pub fn from_permalink_with_max(
        state: &PermalinkState,
        catalog: &LayerCatalog,
        today: &str,
        size: ViewportSize,
        default_max_zoom: f64,
    ) -> Result<Self> {
        let requested = state.layer_key.as_deref().and_then(|key| {
            let found = catalog.find(key);
            if found.is_none() {
                warn!(layer = key, "Unknown layer in permalink, using default");
            }
            found
        });
        let layer = requested
            .or_else(|| catalog.first())
            .ok_or(Error::EmptyCatalog)?
            .clone();

        if let Some(projection) = state.projection {
            if projection != layer.projection {
                debug!(requested = %projection, layer = %layer.projection, "Permalink projection overridden by layer");
            }
        }

        let date = match state.date.as_deref() {
            Some(d) if parse_date(d).is_ok() => d.to_string(),
            Some(d) => {
                warn!(date = d, "Invalid date in permalink, using today");
                today.to_string()
            }
            None => today.to_string(),
        };

        let (min_zoom, max_zoom) = layer.zoom_bounds(default_max_zoom);
        let zoom = state.zoom.unwrap_or(DEFAULT_ZOOM).clamp(min_zoom, max_zoom);
        let center = state.center().unwrap_or_default();
        let view = ViewState::new(layer.projection, center, zoom);

        let tiles = TileLoadTracker::new();
        let listener = tiles.attach(tile_source(&layer, &date));

        let mut controller = Self {
            layer,
            view,
            date,
            opacity: None,
            size,
            default_max_zoom,
            tiles,
            listener,
            permalink: String::new(),
        };
        controller.settle();
        Ok(controller)
    }

    /// Déplace la vue (geste en cours) sans toucher au permalien
    pub fn move_to(&mut self, center: LonLat, zoom: f64) {
        let (min_zoom, max_zoom) = self.layer.zoom_bounds(self.default_max_zoom);
        self.view.center = from_lonlat(self.view.projection, center);
        self.view.zoom = zoom.clamp(min_zoom, max_zoom);
    }

    pub fn resize(&mut self, size: ViewportSize) {
        self.size = size;
    }

    /// Fin de geste : recalcule le frame et le permalien
    pub fn settle(&mut self) -> (ViewportFrame, String) {
        let frame = self.frame();
        self.permalink = PermalinkState::from(&frame).encode();
        (frame, self.permalink.clone())
    }

    /// Frame courant (projection toujours celle de la couche active)
    pub fn frame(&self) -> ViewportFrame {
        ViewportFrame {
            layer_key: self.layer.layer_key.clone(),
            projection: self.layer.projection,
            date: self.layer.requires_date.then(|| self.date.clone()),
            zoom: Some(self.view.zoom),
            opacity: self.opacity,
            center: self.view.center_lonlat(),
            extent: self.view.extent(self.size.width, self.size.height),
        }
    }

    /// Change de couche (et de projection si besoin) ; renvoie si le fond
    /// de référence doit être affiché
    pub fn switch_layer(&mut self, layer: LayerDescriptor, keep_center: bool) -> bool {
        self.view = ensure_projection_with_max(&self.view, &layer, keep_center, self.default_max_zoom);
        debug!(from = %self.layer.layer_key, to = %layer.layer_key, "Switching layer");
        self.layer = layer;
        self.reattach_tiles();
        self.view.show_backdrop
    }

    /// Change la date (format `YYYY-MM-DD`)
    pub fn set_date(&mut self, date: &str) -> Result<()> {
        parse_date(date)?;
        self.date = date.trim().to_string();
        self.reattach_tiles();
        Ok(())
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = Some(opacity.clamp(0.0, 1.0));
    }

    pub fn layer(&self) -> &LayerDescriptor {
        &self.layer
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    /// Dernier permalien commis (sans `#`)
    pub fn permalink(&self) -> &str {
        &self.permalink
    }

    pub fn tiles(&self) -> &TileLoadTracker {
        &self.tiles
    }

    /// Écouteur de la source de tuiles active
    pub fn tile_listener(&self) -> TileListener {
        self.listener.clone()
    }

    pub fn tile_url(&self, z: u32, x: u32, y: u32) -> String {
        self.layer.tile_url(Some(&self.date), z, x, y)
    }

    fn reattach_tiles(&mut self) {
        self.listener = self.tiles.attach(tile_source(&self.layer, &self.date));
    }
}

fn tile_source(layer: &LayerDescriptor, date: &str) -> TileSourceKey {
    TileSourceKey::new(layer.layer_key.clone(), layer.effective_date(Some(date)))
}
