//! Synchronisation des annotations cadrée sur le frame de la vue
//!
//! - [`machine`] : machine à états pure (aucun réseau, aucune horloge)
//! - [`store`] : jeu local d'entités et fusion des réponses serveur
//! - [`engine`] : exécution asynchrone (debounce, lectures, sauvegardes)

pub mod engine;
pub mod machine;
pub mod store;

pub use engine::{AnnotationSync, ImportOutcome, StoreChange, SyncOperation, SyncSettings, SyncStatus};
pub use machine::{FetchState, SaveState, SyncEffect, SyncEvent, SyncMachine};
pub use store::{AnnotationFeature, FeatureStore, LocalKey, SaveBatch, SaveMerge};
