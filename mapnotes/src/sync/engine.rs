//! Moteur de synchronisation des annotations avec le serveur
//!
//! Exécute les effets de la [`SyncMachine`] : minuteurs (debounce), lectures
//! cadrées sur le frame, sauvegardes complètes, suppressions explicites et
//! import entité par entité. L'état partagé est protégé par des mutex
//! `std` jamais tenus à travers un `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use geo::Geometry;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch, Notify};
use tracing::{debug, info, warn};

use super::machine::{SaveState, SyncEffect, SyncEvent, SyncMachine};
use super::store::{AnnotationFeature, FeatureStore, LocalKey, SaveBatch};
use crate::api::ApiClient;
use crate::debounce::Debouncer;
use crate::types::ViewportFrame;
use crate::{Error, Result};

/// Délais de la synchronisation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncSettings {
    pub fetch_debounce: Duration,
    pub save_debounce: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch_debounce: Duration::from_millis(300),
            save_debounce: Duration::from_millis(400),
        }
    }
}

/// Opération concernée par un échec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Fetch,
    Save,
    Delete,
    Import,
}

/// État affiché dans la zone de statut
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Loading,
    Loaded { count: usize },
    Saving,
    Saved { count: usize },
    Failed { operation: SyncOperation, message: String },
}

/// Changement du jeu local, pour le moteur de rendu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Added(LocalKey),
    Updated(LocalKey),
    Removed(LocalKey),
    /// Jeu repeuplé par une lecture
    Reloaded { count: usize },
}

/// Bilan d'un import
#[derive(Debug, Default)]
pub struct ImportOutcome {
    /// Entités persistées
    pub imported: Vec<LocalKey>,
    /// Index (dans l'entrée) et erreur des entités annulées
    pub failed: Vec<(usize, Error)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Timer {
    Fetch,
    Save,
}

struct Inner {
    api: ApiClient,
    settings: SyncSettings,
    machine: Mutex<SyncMachine>,
    store: Mutex<FeatureStore>,
    frame: Mutex<Option<ViewportFrame>>,
    timers: Debouncer<Timer>,
    /// Au plus un appel de persistance en vol
    persist_gate: tokio::sync::Mutex<()>,
    status: watch::Sender<SyncStatus>,
    changes: broadcast::Sender<StoreChange>,
    save_done: Notify,
}

/// Synchronisation du jeu d'annotations d'un frame avec le serveur
///
/// Doit être utilisé depuis un runtime tokio. Le drop annule les minuteurs.
pub struct AnnotationSync {
    inner: Arc<Inner>,
}

impl AnnotationSync {
    pub fn new(api: ApiClient, settings: SyncSettings) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                api,
                settings,
                machine: Mutex::new(SyncMachine::new()),
                store: Mutex::new(FeatureStore::new()),
                frame: Mutex::new(None),
                timers: Debouncer::new(),
                persist_gate: tokio::sync::Mutex::new(()),
                status,
                changes,
                save_done: Notify::new(),
            }),
        }
    }

    /// Active un nouveau frame ; planifie une lecture s'il diffère du courant
    pub fn set_frame(&self, frame: ViewportFrame) {
        {
            let mut current = lock(&self.inner.frame);
            if current.as_ref() == Some(&frame) {
                return;
            }
            debug!(layer = %frame.layer_key, projection = %frame.projection, "Viewport frame changed");
            *current = Some(frame);
        }
        self.inner.dispatch(SyncEvent::FrameChanged);
    }

    /// Relit le frame courant (après le délai habituel)
    pub fn refresh(&self) -> Result<()> {
        if lock(&self.inner.frame).is_none() {
            return Err(Error::NoActiveFrame);
        }
        self.inner.dispatch(SyncEvent::FrameChanged);
        Ok(())
    }

    pub fn frame(&self) -> Option<ViewportFrame> {
        lock(&self.inner.frame).clone()
    }

    /// Ajoute une entité locale (sans id) et planifie une sauvegarde
    pub fn create(&self, feature: AnnotationFeature) -> LocalKey {
        let key = self.inner.store().insert(feature);
        self.inner.notify_change(StoreChange::Added(key));
        self.inner.dispatch(SyncEvent::LocalMutation);
        key
    }

    /// Modifie une entité et planifie une sauvegarde
    pub fn update<R>(&self, key: LocalKey, f: impl FnOnce(&mut AnnotationFeature) -> R) -> Result<R> {
        let result = self.inner.store().modify(key, f)?;
        self.inner.notify_change(StoreChange::Updated(key));
        self.inner.dispatch(SyncEvent::LocalMutation);
        Ok(result)
    }

    pub fn set_property(&self, key: LocalKey, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.update(key, |f| {
            f.properties.insert(name.to_string(), value);
        })
    }

    pub fn set_geometry(&self, key: LocalKey, geometry: impl Into<Geometry<f64>>) -> Result<()> {
        let geometry = geometry.into();
        self.update(key, |f| f.geometry = geometry)
    }

    /// Supprime une entité
    ///
    /// Persistée : appel de suppression explicite d'abord ; en cas d'échec
    /// l'entité est conservée et l'erreur remontée. Jamais persistée :
    /// suppression purement locale.
    pub async fn delete(&self, key: LocalKey) -> Result<()> {
        let id = self
            .inner
            .store()
            .get(key)
            .ok_or(Error::UnknownFeature(key))?
            .id
            .clone();

        if let Some(id) = id {
            let _gate = self.inner.persist_gate.lock().await;
            if let Err(e) = self.inner.api.delete_annotation(&id).await {
                warn!(id = %id, error = %e, "Failed to delete annotation");
                self.inner.fail(SyncOperation::Delete, &e);
                return Err(e);
            }
            info!(id = %id, "Annotation deleted");
        }

        if self.inner.store().remove(key).is_some() {
            self.inner.notify_change(StoreChange::Removed(key));
        }
        self.inner.dispatch(SyncEvent::LocalDelete);
        Ok(())
    }

    /// Import en masse : chaque entité est ajoutée puis persistée seule ;
    /// un échec n'annule que l'entité concernée
    pub async fn import(&self, features: Vec<AnnotationFeature>) -> Result<ImportOutcome> {
        let frame = self.frame().ok_or(Error::NoActiveFrame)?;
        let mut outcome = ImportOutcome::default();

        for (index, mut feature) in features.into_iter().enumerate() {
            feature.id = None;
            let key = self.inner.store().insert(feature);
            self.inner.notify_change(StoreChange::Added(key));

            let result = {
                let _gate = self.inner.persist_gate.lock().await;
                // Lot pris sous le verrou : une sauvegarde complète passée
                // avant a pu persister l'entité
                let batch = {
                    let store = self.inner.store();
                    match store.get(key) {
                        Some(f) if f.id.is_some() => None,
                        Some(_) => store.snapshot_one(key),
                        None => continue,
                    }
                };
                match batch {
                    Some(batch) => {
                        let sent = self.inner.api.save_annotations(&frame, &batch.features).await;
                        sent.map(|returned| Some((batch, returned)))
                    }
                    None => Ok(None),
                }
            };

            match result {
                Ok(saved) => {
                    match saved {
                        Some((batch, returned)) => {
                            self.inner.merge_saved(&batch, returned);
                        }
                        None => debug!(key = %key, "Import entry already saved"),
                    }
                    outcome.imported.push(key);
                }
                Err(e) => {
                    warn!(index, error = %e, "Import entry rolled back");
                    if self.inner.store().remove(key).is_some() {
                        self.inner.notify_change(StoreChange::Removed(key));
                    }
                    outcome.failed.push((index, e));
                }
            }
        }

        if let Some((_, e)) = outcome.failed.last() {
            let total = outcome.failed.len() + outcome.imported.len();
            self.inner.status.send_replace(SyncStatus::Failed {
                operation: SyncOperation::Import,
                message: format!("{} of {} entries failed: {}", outcome.failed.len(), total, e),
            });
        }
        info!(
            imported = outcome.imported.len(),
            failed = outcome.failed.len(),
            "Import finished"
        );
        Ok(outcome)
    }

    /// Sauvegarde immédiatement les modifications en attente
    ///
    /// Attend la sauvegarde en vol ; une sauvegarde due n'est tentée
    /// qu'une fois (un échec reste signalé dans le statut).
    pub async fn flush(&self) {
        let mut attempted = false;
        loop {
            let state = self.inner.machine().save_state();
            match state {
                SaveState::InFlight { .. } => self.inner.save_done.notified().await,
                SaveState::Scheduled if !attempted => {
                    attempted = true;
                    let effects = self.inner.machine().handle(SyncEvent::Flush);
                    for effect in effects {
                        match effect {
                            SyncEffect::StartSave => Arc::clone(&self.inner).run_save().await,
                            other => self.inner.run(other),
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Copie des entités locales, dans l'ordre
    pub fn features(&self) -> Vec<(LocalKey, AnnotationFeature)> {
        self.inner
            .store()
            .iter()
            .map(|(k, f)| (k, f.clone()))
            .collect()
    }

    pub fn get(&self, key: LocalKey) -> Option<AnnotationFeature> {
        self.inner.store().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store().is_empty()
    }

    /// Ni lecture ni sauvegarde en attente ou en vol
    pub fn is_idle(&self) -> bool {
        self.inner.machine().is_idle()
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }
}

impl Drop for AnnotationSync {
    fn drop(&mut self) {
        self.inner.timers.cancel_all();
    }
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, SyncMachine> {
        lock(&self.machine)
    }

    fn store(&self) -> MutexGuard<'_, FeatureStore> {
        lock(&self.store)
    }

    fn frame(&self) -> Option<ViewportFrame> {
        lock(&self.frame).clone()
    }

    fn notify_change(&self, change: StoreChange) {
        // Aucun abonné : rien à faire
        let _ = self.changes.send(change);
    }

    fn fail(&self, operation: SyncOperation, error: &Error) {
        self.status.send_replace(SyncStatus::Failed {
            operation,
            message: error.to_string(),
        });
    }

    fn dispatch(self: &Arc<Self>, event: SyncEvent) {
        let effects = self.machine().handle(event);
        for effect in effects {
            self.run(effect);
        }
    }

    fn run(self: &Arc<Self>, effect: SyncEffect) {
        match effect {
            SyncEffect::ScheduleFetch => self.schedule(Timer::Fetch, SyncEvent::FetchDue),
            SyncEffect::ScheduleSave => self.schedule(Timer::Save, SyncEvent::SaveDue),
            SyncEffect::CancelSaveTimer => {
                self.timers.cancel(&Timer::Save);
            }
            SyncEffect::StartFetch { token } => {
                tokio::spawn(Arc::clone(self).run_fetch(token));
            }
            SyncEffect::StartSave => {
                tokio::spawn(Arc::clone(self).run_save());
            }
            // Traités là où la réponse de lecture est disponible
            SyncEffect::ApplyFetch { .. } | SyncEffect::DiscardFetch { .. } => {}
        }
    }

    fn schedule(self: &Arc<Self>, timer: Timer, event: SyncEvent) {
        let delay = match timer {
            Timer::Fetch => self.settings.fetch_debounce,
            Timer::Save => self.settings.save_debounce,
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        self.timers.schedule(timer, delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(event);
            }
        });
    }

    async fn run_fetch(self: Arc<Self>, token: u64) {
        let result = match self.frame() {
            Some(frame) => {
                self.status.send_replace(SyncStatus::Loading);
                self.api.fetch_annotations(&frame).await
            }
            None => Err(Error::NoActiveFrame),
        };

        let effects = self.machine().handle(SyncEvent::FetchFinished {
            token,
            ok: result.is_ok(),
        });
        let mut result = Some(result);
        let mut stale = false;
        for effect in effects {
            match effect {
                SyncEffect::ApplyFetch { .. } => {
                    if let Some(Ok(features)) = result.take() {
                        self.apply_fetch(features);
                    }
                }
                SyncEffect::DiscardFetch { token } => {
                    debug!(token, "Discarding stale annotation fetch");
                    stale = true;
                }
                other => self.run(other),
            }
        }

        if let Some(Err(e)) = result {
            if !stale {
                warn!(token, error = %e, "Failed to load annotations");
                self.fail(SyncOperation::Fetch, &e);
            }
        }
    }

    fn apply_fetch(self: &Arc<Self>, features: Vec<geojson::Feature>) {
        self.dispatch(SyncEvent::RemoteApplyStart);

        let mut fetched = Vec::with_capacity(features.len());
        for feature in features {
            match AnnotationFeature::from_geojson(feature) {
                Ok(f) if f.id.is_some() => fetched.push(f),
                Ok(_) => warn!("Skipping fetched annotation without id"),
                Err(e) => warn!(error = %e, "Skipping invalid fetched annotation"),
            }
        }
        let count = fetched.len();
        self.store().replace_remote(fetched);
        self.notify_change(StoreChange::Reloaded { count });

        self.dispatch(SyncEvent::RemoteApplyEnd);

        info!(count, "Annotations loaded");
        self.status.send_replace(SyncStatus::Loaded { count });
    }

    async fn run_save(self: Arc<Self>) {
        let ok = {
            let _gate = self.persist_gate.lock().await;
            match self.frame() {
                Some(frame) => self.save_all(&frame).await,
                None => {
                    self.fail(SyncOperation::Save, &Error::NoActiveFrame);
                    false
                }
            }
        };
        self.dispatch(SyncEvent::SaveFinished { ok });
        self.save_done.notify_one();
    }

    /// Envoie le jeu complet ; `false` si l'envoi a échoué
    async fn save_all(self: &Arc<Self>, frame: &ViewportFrame) -> bool {
        let batch = self.store().snapshot();
        if batch.is_empty() {
            return true;
        }

        self.status.send_replace(SyncStatus::Saving);
        match self.api.save_annotations(frame, &batch.features).await {
            Ok(returned) => {
                let orphans = self.merge_saved(&batch, returned);
                info!(count = batch.len(), layer = %frame.layer_key, "Annotations saved");
                self.status.send_replace(SyncStatus::Saved { count: batch.len() });

                for id in orphans {
                    debug!(id = %id, "Deleting annotation removed during save");
                    if let Err(e) = self.api.delete_annotation(&id).await {
                        warn!(id = %id, error = %e, "Failed to delete orphaned annotation");
                    }
                }
                true
            }
            Err(e) => {
                warn!(count = batch.len(), error = %e, "Failed to save annotations");
                self.fail(SyncOperation::Save, &e);
                false
            }
        }
    }

    /// Fusionne une réponse de sauvegarde hors planification ; renvoie les orphelins
    fn merge_saved(self: &Arc<Self>, batch: &SaveBatch, returned: Vec<geojson::Feature>) -> Vec<String> {
        self.dispatch(SyncEvent::RemoteApplyStart);
        let merge = self.store().apply_saved(batch, returned);
        for key in &merge.updated {
            self.notify_change(StoreChange::Updated(*key));
        }
        self.dispatch(SyncEvent::RemoteApplyEnd);
        merge.orphans
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
