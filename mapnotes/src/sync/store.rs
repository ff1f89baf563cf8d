//! Jeu local d'annotations
//!
//! Chaque entité a une clé locale stable ([`LocalKey`]) et, une fois
//! persistée, un `id` attribué par le serveur qui fait foi pour les
//! modifications et suppressions suivantes.

use std::fmt;

use geo::Geometry;
use geojson::feature::Id;
use geojson::JsonObject;
use serde_json::Value;

use crate::{Error, Result};

/// Membre étranger GeoJSON portant l'ordre d'une entité
pub const ORDER_MEMBER: &str = "order";

/// Clé locale d'une entité, indépendante de l'id serveur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalKey(u64);

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Annotation (point, polygone, ...) dans la projection du frame
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationFeature {
    /// Id serveur, absent tant que l'entité n'a pas été persistée
    pub id: Option<String>,
    pub order: usize,
    pub geometry: Geometry<f64>,
    pub properties: JsonObject,
}

impl AnnotationFeature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            id: None,
            order: 0,
            geometry: geometry.into(),
            properties: JsonObject::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Jamais persistée
    pub fn pending_persist(&self) -> bool {
        self.id.is_none()
    }

    pub fn label(&self) -> Option<&str> {
        self.properties.get("label").and_then(Value::as_str)
    }

    /// Feature GeoJSON (id, `order`, géométrie, propriétés)
    pub fn to_geojson(&self) -> geojson::Feature {
        let mut members = JsonObject::new();
        members.insert(ORDER_MEMBER.to_string(), Value::from(self.order));
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&self.geometry))),
            id: self.id.clone().map(Id::String),
            properties: Some(self.properties.clone()),
            foreign_members: Some(members),
        }
    }

    /// Lit une feature GeoJSON ; l'id peut être une chaîne ou un nombre
    pub fn from_geojson(feature: geojson::Feature) -> Result<Self> {
        let id = feature.id.map(|id| match id {
            Id::String(s) => s,
            Id::Number(n) => n.to_string(),
        });
        let order = feature
            .foreign_members
            .as_ref()
            .and_then(|m| m.get(ORDER_MEMBER))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let entity = id.clone().unwrap_or_else(|| "<new>".to_string());
        let geometry = feature
            .geometry
            .ok_or_else(|| Error::invalid_geometry(&entity, "missing geometry"))?;
        let geometry = Geometry::<f64>::try_from(geometry.value)?;

        Ok(Self {
            id,
            order,
            geometry,
            properties: feature.properties.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: LocalKey,
    feature: AnnotationFeature,
    /// Incrémentée à chaque modification locale
    revision: u64,
    /// Dernière révision connue du serveur
    synced: u64,
}

impl Entry {
    /// Persistée mais modifiée depuis la dernière sauvegarde réussie
    fn has_unsaved_edits(&self) -> bool {
        self.feature.id.is_some() && self.revision > self.synced
    }
}

/// Lot soumis à une sauvegarde, dans l'ordre de soumission
#[derive(Debug, Clone, Default)]
pub struct SaveBatch {
    pub keys: Vec<LocalKey>,
    revisions: Vec<u64>,
    submitted_ids: Vec<Option<String>>,
    pub features: Vec<geojson::Feature>,
}

impl SaveBatch {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Résultat de la fusion d'une réponse de sauvegarde
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveMerge {
    /// Entités mises à jour (id et/ou propriétés)
    pub updated: Vec<LocalKey>,
    /// Ids attribués à des entités supprimées localement pendant l'envoi
    pub orphans: Vec<String>,
}

/// Ensemble ordonné des entités locales
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    entries: Vec<Entry>,
    next_key: u64,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: AnnotationFeature) -> LocalKey {
        let key = LocalKey(self.next_key);
        self.next_key += 1;
        self.entries.push(Entry {
            key,
            feature,
            revision: 0,
            synced: 0,
        });
        key
    }

    pub fn get(&self, key: LocalKey) -> Option<&AnnotationFeature> {
        self.entry(key).map(|e| &e.feature)
    }

    pub fn contains(&self, key: LocalKey) -> bool {
        self.entry(key).is_some()
    }

    /// Modifie une entité (révision incrémentée)
    pub fn modify<R>(&mut self, key: LocalKey, f: impl FnOnce(&mut AnnotationFeature) -> R) -> Result<R> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.key == key)
            .ok_or(Error::UnknownFeature(key))?;
        entry.revision += 1;
        Ok(f(&mut entry.feature))
    }

    pub fn remove(&mut self, key: LocalKey) -> Option<AnnotationFeature> {
        let pos = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(pos).feature)
    }

    pub fn key_of_id(&self, id: &str) -> Option<LocalKey> {
        self.entries
            .iter()
            .find(|e| e.feature.id.as_deref() == Some(id))
            .map(|e| e.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LocalKey, &AnnotationFeature)> {
        self.entries.iter().map(|e| (e.key, &e.feature))
    }

    /// Entités jamais persistées
    pub fn pending_persist(&self) -> impl Iterator<Item = LocalKey> + '_ {
        self.entries
            .iter()
            .filter(|e| e.feature.pending_persist())
            .map(|e| e.key)
    }

    /// Sérialise l'ensemble complet, avec un `order` recalculé par entité
    pub fn snapshot(&mut self) -> SaveBatch {
        let mut batch = SaveBatch::default();
        for (order, entry) in self.entries.iter_mut().enumerate() {
            entry.feature.order = order;
            batch.keys.push(entry.key);
            batch.revisions.push(entry.revision);
            batch.submitted_ids.push(entry.feature.id.clone());
            batch.features.push(entry.feature.to_geojson());
        }
        batch
    }

    /// Lot restreint à une seule entité (persistance individuelle)
    pub fn snapshot_one(&self, key: LocalKey) -> Option<SaveBatch> {
        let entry = self.entry(key)?;
        Some(SaveBatch {
            keys: vec![key],
            revisions: vec![entry.revision],
            submitted_ids: vec![entry.feature.id.clone()],
            features: vec![entry.feature.to_geojson()],
        })
    }

    /// Fusionne la réponse d'une sauvegarde, appariée par position
    ///
    /// L'id serveur est toujours appliqué ; les propriétés normalisées
    /// seulement si l'entité n'a pas été modifiée depuis la soumission.
    pub fn apply_saved(&mut self, batch: &SaveBatch, returned: Vec<geojson::Feature>) -> SaveMerge {
        let mut merge = SaveMerge::default();

        for (i, feature) in returned.into_iter().enumerate().take(batch.len()) {
            let key = batch.keys[i];
            let server_id = feature.id.map(|id| match id {
                Id::String(s) => s,
                Id::Number(n) => n.to_string(),
            });

            let Some(entry) = self.entries.iter_mut().find(|e| e.key == key) else {
                if batch.submitted_ids[i].is_none() {
                    merge.orphans.extend(server_id);
                }
                continue;
            };

            let mut changed = false;
            if server_id.is_some() && entry.feature.id != server_id {
                entry.feature.id = server_id;
                changed = true;
            }
            entry.synced = entry.synced.max(batch.revisions[i]);
            if entry.revision == batch.revisions[i] {
                if let Some(properties) = feature.properties {
                    if entry.feature.properties != properties {
                        entry.feature.properties = properties;
                        changed = true;
                    }
                }
            }
            if changed {
                merge.updated.push(key);
            }
        }
        merge
    }

    /// Remplace les entités persistées par le résultat d'une lecture
    ///
    /// Les entités jamais persistées survivent, placées après. Une entité
    /// persistée avec des éditions non enregistrées garde sa version locale
    /// (et sa clé) à la place de la version lue.
    pub fn replace_remote(&mut self, mut fetched: Vec<AnnotationFeature>) -> Vec<LocalKey> {
        fetched.sort_by_key(|f| f.order);
        let mut local: Vec<Entry> = self
            .entries
            .drain(..)
            .filter(|e| e.feature.pending_persist() || e.has_unsaved_edits())
            .collect();

        let mut keys = Vec::with_capacity(fetched.len());
        for feature in fetched {
            let edited = feature.id.as_deref().and_then(|id| {
                local
                    .iter()
                    .position(|e| e.has_unsaved_edits() && e.feature.id.as_deref() == Some(id))
            });
            match edited {
                Some(pos) => {
                    let entry = local.remove(pos);
                    keys.push(entry.key);
                    self.entries.push(entry);
                }
                None => keys.push(self.insert(feature)),
            }
        }
        self.entries.extend(local);
        keys
    }

    fn entry(&self, key: LocalKey) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }
}
