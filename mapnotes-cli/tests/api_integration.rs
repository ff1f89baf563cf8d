//! Tests d'intégration contre un serveur d'annotations réel
//!
//! Ces tests nécessitent un serveur disponible.
//! Configuration via variables d'environnement:
//! - MAPNOTES_API_URL, MAPNOTES_SECRET
//!
//! Exécution:
//! ```bash
//! MAPNOTES_API_URL=http://localhost:8080 cargo test --test api_integration -- --ignored
//! ```

use std::sync::Arc;

use anyhow::Result;
use mapnotes::interchange::parse_geojson;
use mapnotes::view::{today, ViewportSize};
use mapnotes::{
    permalink, AnnotationSync, ApiClient, CatalogCache, SyncSettings, SyncStatus, ViewController,
};
use mapnotes_cli::config::{ApiConfig, ApiSection};
use mapnotes_cli::http::HttpTransport;

fn test_client() -> Result<ApiClient> {
    let config = ApiConfig::from_env(&ApiSection::default());
    let transport = HttpTransport::new(&config)?;
    Ok(ApiClient::new(Arc::new(transport)).with_secret(config.secret))
}

async fn test_view(api: &ApiClient) -> Result<ViewController> {
    let catalog = CatalogCache::new(api.clone()).get().await?;
    Ok(ViewController::from_permalink(
        &permalink::decode("#0,0,3,,,"),
        &catalog,
        &today(),
        ViewportSize::default(),
    )?)
}

#[tokio::test]
#[ignore]
async fn test_catalog_is_not_empty() -> Result<()> {
    let catalog = CatalogCache::new(test_client()?).get().await?;
    assert!(!catalog.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_fetch_view_annotations() -> Result<()> {
    let api = test_client()?;
    let view = test_view(&api).await?;
    let features = api.fetch_annotations(&view.frame()).await?;
    for feature in &features {
        assert!(feature.id.is_some());
    }
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_create_then_delete_annotation() -> Result<()> {
    let api = test_client()?;
    let view = test_view(&api).await?;

    let sync = AnnotationSync::new(api.clone(), SyncSettings::default());
    let mut status = sync.status();
    sync.set_frame(view.frame());
    status
        .wait_for(|s| matches!(s, SyncStatus::Loaded { .. } | SyncStatus::Failed { .. }))
        .await?;

    let features = parse_geojson(
        r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[0,0]},"properties":{"label":"integration test"}}"#,
        view.view().projection,
    )?;
    let outcome = sync.import(features).await?;
    assert_eq!(outcome.imported.len(), 1);
    let key = outcome.imported[0];
    assert!(sync.get(key).and_then(|f| f.id).is_some());

    sync.delete(key).await?;
    assert!(sync.get(key).is_none());
    Ok(())
}
