//! Suivi du chargement des tuiles de la source active
//!
//! `pending` : +1 au début d'une requête, -1 à la fin (succès ou erreur).
//! `errors` : +1 sur erreur uniquement. Changer de source (couche ou date)
//! remet les compteurs à zéro et détache les écouteurs de l'ancienne source.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

/// Identité d'une source de tuiles : couche + date effective
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileSourceKey {
    pub layer_key: String,
    pub date: Option<String>,
}

impl TileSourceKey {
    pub fn new(layer_key: impl Into<String>, date: Option<&str>) -> Self {
        Self {
            layer_key: layer_key.into(),
            date: date.map(str::to_string),
        }
    }
}

/// Instantané des compteurs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TileCounts {
    pub pending: u32,
    pub errors: u32,
}

impl TileCounts {
    pub fn is_loading(&self) -> bool {
        self.pending > 0
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    source: Option<TileSourceKey>,
    generation: u64,
    counts: TileCounts,
}

/// Compteurs de chargement de la source de tuiles active
#[derive(Debug, Clone, Default)]
pub struct TileLoadTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl TileLoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attache la source `key` et renvoie un écouteur pour ses événements
    ///
    /// Même source : les compteurs sont conservés. Nouvelle source : les
    /// écouteurs précédents sont détachés et les compteurs remis à zéro.
    pub fn attach(&self, key: TileSourceKey) -> TileListener {
        let mut state = self.lock();
        if state.source.as_ref() != Some(&key) {
            state.generation += 1;
            state.counts = TileCounts::default();
            state.source = Some(key);
        }
        TileListener {
            state: Arc::clone(&self.state),
            generation: state.generation,
        }
    }

    /// Détache la source active
    pub fn detach(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.counts = TileCounts::default();
        state.source = None;
    }

    pub fn counts(&self) -> TileCounts {
        self.lock().counts
    }

    pub fn source(&self) -> Option<TileSourceKey> {
        self.lock().source.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Écouteur lié à une génération de source ; inerte une fois détaché
#[derive(Debug, Clone)]
pub struct TileListener {
    state: Arc<Mutex<TrackerState>>,
    generation: u64,
}

impl TileListener {
    /// La source de cet écouteur est-elle toujours active ?
    pub fn is_attached(&self) -> bool {
        self.with_state(|_| ()).is_some()
    }

    /// Début de chargement d'une tuile
    pub fn tile_started(&self) {
        self.with_state(|c| c.pending += 1);
    }

    /// Tuile chargée
    pub fn tile_loaded(&self) {
        self.with_state(|c| c.pending = c.pending.saturating_sub(1));
    }

    /// Échec de chargement d'une tuile
    pub fn tile_failed(&self) {
        self.with_state(|c| {
            c.pending = c.pending.saturating_sub(1);
            c.errors += 1;
        });
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut TileCounts) -> R) -> Option<R> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.generation == self.generation).then(|| f(&mut state.counts))
    }
}
