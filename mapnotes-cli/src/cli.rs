//! Définition et implémentation des commandes CLI
//!
//! - `layers` : catalogue des couches
//! - `permalink encode|decode` : codec de permalien (sans réseau sauf `--resolve`)
//! - `pull` / `push` : annotations d'une vue ↔ fichier GeoJSON
//! - `delete` : suppression d'une annotation distante

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Subcommand;
use mapnotes::interchange::{export_to_file, read_geojson};
use mapnotes::permalink::{self, PermalinkState};
use mapnotes::projection::DEFAULT_MAX_ZOOM;
use mapnotes::view::{parse_date, today};
use mapnotes::{
    AnnotationSync, ApiClient, CatalogCache, Error, LonLat, Projection, SyncStatus,
    ViewController, ViewportSize,
};
use tracing::{info, warn};

use crate::config::{ApiConfig, Config};
use crate::http::HttpTransport;
use crate::report::{PushError, PushReport, PushStatus};

#[derive(Subcommand)]
pub enum Commands {
    /// List the layer catalog grouped by body
    Layers,

    /// Encode or decode a view permalink
    Permalink {
        #[command(subcommand)]
        action: PermalinkAction,
    },

    /// Download the annotations of a view into a GeoJSON file
    Pull {
        /// View permalink (#lon,lat,zoom,date,layerKey,projection)
        #[arg(short, long, allow_hyphen_values = true)]
        permalink: String,

        /// Output GeoJSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Viewport width in pixels (défaut : preset)
        #[arg(long)]
        width: Option<f64>,

        /// Viewport height in pixels (défaut : preset)
        #[arg(long)]
        height: Option<f64>,
    },

    /// Upload a GeoJSON file as new annotations of a view
    Push {
        /// View permalink (#lon,lat,zoom,date,layerKey,projection)
        #[arg(short, long, allow_hyphen_values = true)]
        permalink: String,

        /// Input GeoJSON file (EPSG:4326)
        #[arg(short, long)]
        input: PathBuf,

        /// Save the push report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Delete a remote annotation by id
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PermalinkAction {
    /// Build a permalink from view fields
    Encode {
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long)]
        zoom: f64,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Layer key
        #[arg(long)]
        layer: Option<String>,

        /// Projection (EPSG:4326 or EPSG:3857)
        #[arg(long)]
        projection: Option<String>,
    },

    /// Print the fields of a permalink
    Decode {
        #[arg(allow_hyphen_values = true)]
        fragment: String,

        /// Resolve defaults against the remote catalog
        #[arg(long)]
        resolve: bool,
    },
}

/// Client d'API configuré (transport HTTP + secret)
pub fn connect(config: &ApiConfig) -> Result<ApiClient> {
    let transport = HttpTransport::new(config)?;
    Ok(ApiClient::new(Arc::new(transport)).with_secret(config.secret.clone()))
}

/// Exécute la commande layers
pub async fn cmd_layers(api: &ApiClient) -> Result<()> {
    let catalog = CatalogCache::new(api.clone())
        .get()
        .await
        .context("Failed to load layer catalog")?;

    for body in &catalog.bodies {
        let title = if body.title.is_empty() { &body.body_id } else { &body.title };
        println!("{} ({} layers)", title, body.layers.len());
        for layer in &body.layers {
            let (min_zoom, max_zoom) = layer.zoom_bounds(DEFAULT_MAX_ZOOM);
            println!(
                "  {:<48} {:<10} z{}-{}{}",
                layer.layer_key,
                layer.projection,
                min_zoom,
                max_zoom,
                if layer.requires_date { "  [dated]" } else { "" }
            );
        }
    }
    info!(layers = catalog.len(), bodies = catalog.bodies.len(), "Catalog loaded");
    Ok(())
}

/// Construit un permalien à partir des champs de la vue
pub fn encode_permalink(
    lon: f64,
    lat: f64,
    zoom: f64,
    date: Option<&str>,
    layer: Option<&str>,
    projection: Option<&str>,
) -> Result<String> {
    if let Some(date) = date {
        parse_date(date).context(format!("Invalid date: {}", date))?;
    }
    let projection = projection
        .map(|p| p.parse::<Projection>())
        .transpose()
        .context("Invalid projection")?;

    Ok(permalink::encode(
        Some(LonLat::new(lon, lat)),
        Some(zoom),
        date,
        layer,
        projection,
    ))
}

/// Exécute la commande permalink decode
pub async fn cmd_permalink_decode(
    api: &ApiClient,
    config: &Config,
    fragment: &str,
    resolve: bool,
) -> Result<()> {
    let state = permalink::decode(fragment);
    let show = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    println!("lon:        {}", show(state.lon.map(|v| v.to_string())));
    println!("lat:        {}", show(state.lat.map(|v| v.to_string())));
    println!("zoom:       {}", show(state.zoom.map(|v| v.to_string())));
    println!("date:       {}", show(state.date.clone()));
    println!("layer:      {}", show(state.layer_key.clone()));
    println!("projection: {}", show(state.projection.map(|p| p.to_string())));

    if resolve {
        let view = resolve_view(api, config, &state, config.viewport_size()).await?;
        let frame = view.frame();
        println!("\n--- RESOLVED ---");
        println!("layer:      {}", view.layer().layer_key);
        println!("projection: {}", view.view().projection);
        println!("center:     {}, {}", frame.center.lon, frame.center.lat);
        println!("zoom:       {}", view.view().zoom);
        println!("date:       {}", view.date());
        println!(
            "extent:     [{}, {}, {}, {}]",
            frame.extent.min_lon, frame.extent.min_lat, frame.extent.max_lon, frame.extent.max_lat
        );
        println!("permalink:  {}", view.permalink());
    }
    Ok(())
}

/// Résout la vue d'un permalien contre le catalogue distant
pub async fn resolve_view(
    api: &ApiClient,
    config: &Config,
    state: &PermalinkState,
    size: ViewportSize,
) -> Result<ViewController> {
    let catalog = CatalogCache::new(api.clone())
        .get()
        .await
        .context("Failed to load layer catalog")?;

    let view = ViewController::from_permalink_with_max(
        state,
        &catalog,
        &today(),
        size,
        config.sync.default_max_zoom,
    )?;
    if let Some(requested) = &state.layer_key {
        if requested != &view.layer().layer_key {
            warn!(requested = %requested, layer = %view.layer().layer_key, "Layer not in catalog, using default");
        }
    }
    Ok(view)
}

/// Exécute la commande pull, renvoie le nombre d'entités exportées
pub async fn cmd_pull(
    api: &ApiClient,
    config: &Config,
    fragment: &str,
    output: &Path,
    size: ViewportSize,
) -> Result<usize> {
    let view = resolve_view(api, config, &permalink::decode(fragment), size).await?;
    let frame = view.frame();
    info!(layer = %frame.layer_key, permalink = view.permalink(), "Loading annotations");

    let sync = AnnotationSync::new(api.clone(), config.sync_settings());
    let mut status = sync.status();
    sync.set_frame(frame);

    let settled = status
        .wait_for(|s| matches!(s, SyncStatus::Loaded { .. } | SyncStatus::Failed { .. }))
        .await
        .context("Sync engine stopped")?
        .clone();
    if let SyncStatus::Failed { message, .. } = settled {
        anyhow::bail!("Failed to load annotations: {}", message);
    }

    let features: Vec<_> = sync.features().into_iter().map(|(_, f)| f).collect();
    export_to_file(&features, view.view().projection, output)
        .context(format!("Failed to write {}", output.display()))?;

    println!("{} annotations written to {}", features.len(), output.display());
    Ok(features.len())
}

/// Exécute la commande push
pub async fn cmd_push(
    api: &ApiClient,
    config: &Config,
    fragment: &str,
    input: &Path,
    report_path: Option<&Path>,
) -> Result<PushReport> {
    let started_at = Instant::now();

    let view = resolve_view(api, config, &permalink::decode(fragment), config.viewport_size()).await?;
    let features = read_geojson(input, view.view().projection)
        .context(format!("Failed to read {}", input.display()))?;
    let labels: Vec<Option<String>> = features
        .iter()
        .map(|f| f.label().map(str::to_string))
        .collect();

    let mut report = PushReport::new(&input.display().to_string(), &view.layer().layer_key);
    report.record_read(features.len());

    let sync = AnnotationSync::new(api.clone(), config.sync_settings());
    sync.set_frame(view.frame());

    let outcome = sync.import(features).await.context("Import failed")?;
    for _ in &outcome.imported {
        report.record_import();
    }
    for (index, error) in &outcome.failed {
        report.record_error(PushError {
            index: *index,
            label: labels.get(*index).cloned().flatten(),
            message: error.to_string(),
            status: match error {
                Error::Api(e) => e.status(),
                _ => None,
            },
        });
    }
    sync.flush().await;

    report.set_duration(started_at.elapsed());
    report.finalize();
    report.display();

    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .context(format!("Failed to write report {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }

    info!(summary = %report.summary(), "Push finished");
    if report.status == PushStatus::Failed {
        anyhow::bail!("Push failed: no annotation was saved");
    }
    Ok(report)
}

/// Exécute la commande delete
pub async fn cmd_delete(api: &ApiClient, id: &str) -> Result<()> {
    api.delete_annotation(id)
        .await
        .context(format!("Failed to delete annotation {}", id))?;
    println!("Deleted {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use mapnotes::{ApiError, HttpRequest, HttpResponse, Method, Transport};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    const CATALOG: &str = r#"{"bodies":[{"bodyId":"earth","title":"Earth","layers":[
        {"layerKey":"osm","projection":"EPSG:3857","tileTemplate":"https://tiles/{z}/{x}/{y}.png"},
        {"layerKey":"modis","projection":"EPSG:4326","tileTemplate":"https://gibs/{date}/{z}/{y}/{x}.jpg","requiresDate":true}
    ]}]}"#;

    /// Serveur en mémoire : catalogue fixe, annotations stockées en vrac
    #[derive(Default)]
    struct FakeServer {
        stored: Mutex<Vec<Value>>,
    }

    impl FakeServer {
        fn with(features: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                stored: Mutex::new(features),
            })
        }

        fn save(&self, body: Value) -> HttpResponse {
            let mut features = body["features"].as_array().cloned().unwrap_or_default();
            if features.iter().any(|f| f["properties"]["label"] == "bad") {
                return HttpResponse::new(422, "rejected");
            }
            let mut stored = self.stored.lock().unwrap();
            for feature in &mut features {
                if feature["id"].is_null() {
                    feature["id"] = json!(format!("srv-{}", stored.len() + 1));
                }
                stored.push(feature.clone());
            }
            HttpResponse::new(200, Value::Array(features).to_string())
        }
    }

    impl Transport for FakeServer {
        fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, ApiError>> {
            Box::pin(async move {
                let response = match (request.method, request.path.as_str()) {
                    (Method::Get, "/v1/layers") => HttpResponse::new(200, CATALOG),
                    (Method::Get, "/v1/annotations") => {
                        let stored = self.stored.lock().unwrap().clone();
                        HttpResponse::new(200, json!({ "features": stored }).to_string())
                    }
                    (Method::Post, "/v1/annotations") => {
                        let body = request
                            .body
                            .as_ref()
                            .and_then(|b| serde_json::from_slice(b).ok())
                            .unwrap_or_default();
                        self.save(body)
                    }
                    _ => HttpResponse::new(404, "not found"),
                };
                Ok(response)
            })
        }
    }

    fn point(id: Option<&str>, label: &str) -> Value {
        json!({
            "type": "Feature",
            "id": id,
            "geometry": {"type": "Point", "coordinates": [2.35, 48.85]},
            "properties": {"label": label}
        })
    }

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mapnotes_cli_{}_{}", std::process::id(), name))
    }

    fn config() -> Config {
        Config::from_preset("default").unwrap()
    }

    #[test]
    fn test_encode_permalink() {
        let link = encode_permalink(10.5, 20.25, 3.0, Some("2024-01-01"), Some("osm"), Some("EPSG:3857"))
            .unwrap();
        assert_eq!(link, "#10.50000,20.25000,3.00,2024-01-01,osm,EPSG:3857");
    }

    #[test]
    fn test_encode_permalink_rejects_bad_input() {
        assert!(encode_permalink(0.0, 0.0, 1.0, Some("2024-13-45"), None, None).is_err());
        assert!(encode_permalink(0.0, 0.0, 1.0, None, None, Some("EPSG:9999")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_view_falls_back_to_first_layer() {
        let api = ApiClient::new(FakeServer::with(Vec::new()));
        let state = permalink::decode("#1,2,4,,unknown,EPSG:4326");
        let view = resolve_view(&api, &config(), &state, ViewportSize::default())
            .await
            .unwrap();

        assert_eq!(view.layer().layer_key, "osm");
        assert_eq!(view.view().projection, Projection::WebMercator);
        assert_eq!(view.view().zoom, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_exports_view_annotations() {
        let api = ApiClient::new(FakeServer::with(vec![
            point(Some("a1"), "Paris"),
            point(Some("a2"), "Lyon"),
        ]));
        let output = temp_file("pull.geojson");

        let count = cmd_pull(&api, &config(), "#2.35,48.85,10,,osm,", &output, ViewportSize::default())
            .await
            .unwrap();
        assert_eq!(count, 2);

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["features"].as_array().unwrap().len(), 2);
        assert_eq!(written["features"][0]["properties"]["label"], "Paris");
        std::fs::remove_file(output).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_reports_partial_success() {
        let server = FakeServer::with(Vec::new());
        let api = ApiClient::new(server.clone());

        let input = temp_file("push.geojson");
        let document = json!({
            "type": "FeatureCollection",
            "features": [point(Some("foreign"), "ok"), point(None, "bad"), point(None, "also ok")]
        });
        std::fs::write(&input, document.to_string()).unwrap();
        let report_path = temp_file("push_report.json");

        let report = cmd_push(&api, &config(), "#2.35,48.85,10,,osm,", &input, Some(&report_path))
            .await
            .unwrap();

        assert_eq!(report.status, PushStatus::PartialSuccess);
        assert_eq!(report.entities_read, 3);
        assert_eq!(report.entities_imported, 2);
        assert_eq!(report.errors[0].index, 1);
        assert_eq!(report.errors[0].label.as_deref(), Some("bad"));
        assert_eq!(report.errors[0].status, Some(422));

        let stored = server.stored.lock().unwrap().clone();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|f| f["id"] != "foreign"));
        assert!(report_path.exists());

        std::fs::remove_file(input).ok();
        std::fs::remove_file(report_path).ok();
    }
}
