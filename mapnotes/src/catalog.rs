//! Cache du catalogue de couches
//!
//! Le premier résultat réussi est mémorisé jusqu'à `invalidate()`.
//! Les appels concurrents pendant le premier chargement partagent la même
//! requête (via le [`RequestCache`](crate::dedup::RequestCache)) ; un échec
//! n'est pas mémorisé, l'appel suivant retente.
//!
//! Après une invalidation, l'ancien catalogue est conservé : il est servi
//! tant que le rechargement échoue.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::api::ApiClient;
use crate::types::LayerCatalog;
use crate::Result;

#[derive(Default)]
struct CatalogState {
    memo: Option<Arc<LayerCatalog>>,
    /// Copie invalidée, servie si le rechargement échoue
    stale: Option<Arc<LayerCatalog>>,
    /// Incrémenté à chaque invalidation : un chargement lancé avant
    /// n'écrase pas l'état
    generation: u64,
}

/// Cache du catalogue, à instancier explicitement
#[derive(Clone)]
pub struct CatalogCache {
    api: ApiClient,
    state: Arc<Mutex<CatalogState>>,
}

impl CatalogCache {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(CatalogState::default())),
        }
    }

    /// Catalogue mémorisé, ou chargé au premier appel
    pub async fn get(&self) -> Result<Arc<LayerCatalog>> {
        let generation = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(catalog) = &state.memo {
                return Ok(Arc::clone(catalog));
            }
            state.generation
        };

        let catalog = match self.api.layers().await {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                let stale = self.state.lock().unwrap_or_else(PoisonError::into_inner).stale.clone();
                if let Some(stale) = stale {
                    warn!(error = %e, "Failed to reload layer catalog, serving previous copy");
                    return Ok(stale);
                }
                warn!(error = %e, "Failed to load layer catalog");
                return Err(e);
            }
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = &state.memo {
            // Un appel concurrent a déjà mémorisé
            return Ok(Arc::clone(existing));
        }
        if state.generation == generation {
            info!(layers = catalog.len(), bodies = catalog.bodies.len(), "Layer catalog loaded");
            state.memo = Some(Arc::clone(&catalog));
            state.stale = None;
        }
        Ok(catalog)
    }

    /// Catalogue mémorisé, sans appel réseau
    pub fn cached(&self) -> Option<Arc<LayerCatalog>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .memo
            .clone()
    }

    /// Force un rechargement au prochain `get()`
    pub fn invalidate(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(memo) = state.memo.take() {
            state.stale = Some(memo);
        }
        state.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::transport::{HttpRequest, HttpResponse, Transport};
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    const CATALOG: &str = r#"{"bodies":[{"bodyId":"earth","title":"Earth","layers":[
        {"layerKey":"osm","projection":"EPSG:3857","tileTemplate":"https://t/{z}/{x}/{y}.png"}]}]}"#;

    /// Échoue sur les `fail_first` premiers appels, ou tant que `down`
    struct CatalogTransport {
        calls: AtomicUsize,
        fail_first: usize,
        down: AtomicBool,
    }

    impl Transport for CatalogTransport {
        fn send(&self, _request: HttpRequest) -> BoxFuture<'_, std::result::Result<HttpResponse, ApiError>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = n < self.fail_first || self.down.load(Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if fail {
                    Ok(HttpResponse::new(502, "bad gateway"))
                } else {
                    Ok(HttpResponse::new(200, CATALOG))
                }
            }
            .boxed()
        }
    }

    fn cache(fail_first: usize) -> (CatalogCache, Arc<CatalogTransport>) {
        let transport = Arc::new(CatalogTransport {
            calls: AtomicUsize::new(0),
            fail_first,
            down: AtomicBool::new(false),
        });
        (CatalogCache::new(ApiClient::new(transport.clone())), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_memoized_after_first_success() {
        let (cache, transport) = cache(0);
        assert!(cache.cached().is_none());
        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.first().unwrap().layer_key, "osm");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_fetch_is_shared() {
        let (cache, transport) = cache(0);
        let (a, b) = tokio::join!(cache.get(), cache.get());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_poison() {
        let (cache, transport) = cache(1);
        let err = cache.get().await.unwrap_err();
        assert!(err.to_string().contains("502"));
        assert!(cache.cached().is_none());

        assert!(cache.get().await.is_ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_refetches() {
        let (cache, transport) = cache(0);
        cache.get().await.unwrap();
        cache.invalidate();
        assert!(cache.cached().is_none());
        cache.get().await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_catalog_served_when_reload_fails() {
        let (cache, transport) = cache(0);
        let first = cache.get().await.unwrap();
        cache.invalidate();

        transport.down.store(true, Ordering::SeqCst);
        let served = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &served));
        assert!(cache.cached().is_none());

        // Retenté au prochain appel, puis mémorisé
        transport.down.store(false, Ordering::SeqCst);
        let fresh = cache.get().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert!(cache.cached().is_some());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }
}
