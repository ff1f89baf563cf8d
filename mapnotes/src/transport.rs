//! Contrat de transport HTTP
//!
//! Seuls la méthode, le chemin, la query, le corps et les en-têtes comptent.
//! L'implémentation concrète (reqwest, mock de test, ...) est fournie par
//! l'appelant.

use std::fmt;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::Result;

/// Méthode HTTP utilisée par l'API d'annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    /// Méthodes sans effet de bord, dédupliquées par défaut
    pub fn is_idempotent(self) -> bool {
        matches!(self, Self::Get)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requête à émettre
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Chemin relatif à l'URL de base (`/v1/...`)
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Corps JSON sérialisé
    pub body: Option<Bytes>,
    pub headers: Vec<(String, String)>,
    /// Forcer la déduplication d'un appel non idempotent (lecture en POST)
    pub dedupe: bool,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            dedupe: method.is_idempotent(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Corps JSON (ajoute l'en-tête `Content-Type`)
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(self.header("Content-Type", "application/json"))
    }

    pub fn deduplicated(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// URL relative complète (`path?k=v&...`), pour les logs et la clé de cache
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}?{}", self.path, query.join("&"))
    }

    /// Clé de déduplication : blake3(méthode + url + corps)
    pub fn cache_key(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(self.url().as_bytes());
        hasher.update(b"\n");
        if let Some(body) = &self.body {
            hasher.update(body);
        }
        hex::encode(hasher.finalize().as_bytes())
    }
}

/// Réponse HTTP brute
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Réponse vide attendue (204 ou corps vide)
    pub fn is_empty(&self) -> bool {
        self.status == 204 || self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// Convertit un statut non 2xx en erreur typée
    pub fn error_for_status(self) -> std::result::Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Status {
                status: self.status,
                payload: self.body,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Transport asynchrone
///
/// Object-safe : les implémentations renvoient un `BoxFuture`.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, std::result::Result<HttpResponse, ApiError>>;
}
