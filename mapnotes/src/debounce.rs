//! Planificateur à retardement, un créneau par opération
//!
//! Replanifier une opération annule la précédente au lieu de s'empiler :
//! seule la dernière d'une rafale s'exécute. Une action déjà démarrée
//! n'est jamais interrompue.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

struct Slot {
    id: u64,
    handle: JoinHandle<()>,
}

/// Créneaux en attente, indexés par opération logique
pub struct Debouncer<K> {
    slots: Arc<Mutex<HashMap<K, Slot>>>,
    next_id: AtomicU64,
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Planifie `action` après `delay`, en remplaçant le créneau de `key`
    ///
    /// Doit être appelé depuis un runtime tokio.
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slots = Arc::clone(&self.slots);
        let task_key = key.clone();

        let mut guard = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
                if slots.get(&task_key).is_some_and(|s| s.id == id) {
                    slots.remove(&task_key);
                }
            }
            action.await;
        });
        if let Some(previous) = guard.insert(key.clone(), Slot { id, handle }) {
            trace!(key = ?key, "Debounce rescheduled");
            previous.handle.abort();
        }
    }

    /// Annule le créneau de `key` ; `true` s'il était occupé
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Annule tous les créneaux
    pub fn cancel_all(&self) {
        let drained: Vec<Slot> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        for slot in drained {
            slot.handle.abort();
        }
    }

    /// Un déclenchement est-il en attente pour `key` ?
    pub fn pending(&self, key: &K) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.values() {
            slot.handle.abort();
        }
    }
}
