//! Déduplication des requêtes idempotentes (single-flight)
//!
//! Tant qu'un appel identique est en vol, les appelants suivants
//! reçoivent la même issue. L'entrée est retirée dès que l'appel se
//! termine (succès ou échec) : l'appel suivant repart sur le réseau.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::error::ApiError;
use crate::transport::{HttpRequest, HttpResponse, Transport};

type Outcome = std::result::Result<HttpResponse, ApiError>;
type SharedCall = Shared<BoxFuture<'static, Outcome>>;

struct InFlight {
    id: u64,
    call: SharedCall,
}

/// Cache des appels en vol
#[derive(Clone)]
pub struct RequestCache {
    transport: Arc<dyn Transport>,
    inflight: Arc<Mutex<HashMap<String, InFlight>>>,
    next_id: Arc<AtomicU64>,
}

impl RequestCache {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Émet la requête, en la partageant avec un appel identique en vol
    pub async fn call(&self, request: HttpRequest) -> Outcome {
        if !request.dedupe {
            return self.transport.send(request).await;
        }

        let key = request.cache_key();
        let call = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = inflight.get(&key) {
                debug!(method = %request.method, url = %request.url(), "Joining in-flight request");
                entry.call.clone()
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let call = self.spawn_call(key.clone(), id, request);
                inflight.insert(key, InFlight { id, call: call.clone() });
                call
            }
        };

        call.await
    }

    fn spawn_call(&self, key: String, id: u64, request: HttpRequest) -> SharedCall {
        let transport = Arc::clone(&self.transport);
        let inflight = Arc::clone(&self.inflight);
        async move {
            let outcome = transport.send(request).await;
            // Ne retirer que notre propre entrée (un reset a pu la remplacer)
            let mut map = inflight.lock().unwrap_or_else(PoisonError::into_inner);
            if map.get(&key).is_some_and(|e| e.id == id) {
                map.remove(&key);
            }
            outcome
        }
        .boxed()
        .shared()
    }

    /// Nombre d'appels actuellement en vol
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Oublie les appels en vol (ils se terminent sans être partagés)
    pub fn reset(&self) {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
