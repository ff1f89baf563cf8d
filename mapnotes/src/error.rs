//! Types d'erreurs pour le crate mapnotes

use bytes::Bytes;
use thiserror::Error;

use crate::sync::LocalKey;

/// Échec d'un appel réseau
///
/// Clonable : une même issue est partagée entre tous les appelants
/// d'une requête dédupliquée.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Le serveur a répondu avec un statut non 2xx
    #[error("HTTP {status}: {}", payload_preview(.payload))]
    Status {
        /// Statut HTTP
        status: u16,
        /// Corps brut de la réponse
        payload: Bytes,
    },

    /// La requête n'a pas pu aboutir (connexion, timeout, ...)
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Statut HTTP si le serveur a répondu
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// Crée une erreur de transport
    pub fn transport(reason: impl ToString) -> Self {
        Self::Transport(reason.to_string())
    }
}

fn payload_preview(payload: &Bytes) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(payload);
    if text.len() > MAX {
        let cut = (0..=MAX).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text.into_owned()
    }
}

/// Erreurs pouvant survenir dans le contrôleur d'annotations
#[derive(Debug, Error)]
pub enum Error {
    /// Erreur d'I/O (import/export de fichiers)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur réseau ou réponse HTTP en échec
    #[error(transparent)]
    Api(#[from] ApiError),

    /// JSON invalide (réponse serveur ou fichier)
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Document GeoJSON invalide
    #[error("Invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Géométrie absente ou non supportée
    #[error("Invalid geometry for {entity}: {reason}")]
    InvalidGeometry { entity: String, reason: String },

    /// Projection non reconnue
    #[error("Unknown projection: {0}")]
    UnknownProjection(String),

    /// Couche absente du catalogue
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    /// Catalogue sans aucune couche
    #[error("Layer catalog is empty")]
    EmptyCatalog,

    /// Entité locale inconnue (déjà supprimée ?)
    #[error("Unknown annotation: {0}")]
    UnknownFeature(LocalKey),

    /// Date invalide (format attendu YYYY-MM-DD)
    #[error("Invalid date: '{0}'. Expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Opération nécessitant un frame alors qu'aucun n'est actif
    #[error("No active viewport frame")]
    NoActiveFrame,
}

impl Error {
    /// Crée une erreur de géométrie invalide
    pub fn invalid_geometry(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

/// Alias de résultat pour le crate
pub type Result<T> = std::result::Result<T, Error>;
