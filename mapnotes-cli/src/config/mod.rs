//! Configuration du client

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use mapnotes::projection::DEFAULT_MAX_ZOOM;
use mapnotes::{SyncSettings, ViewportSize};
use serde::{Deserialize, Serialize};

/// Configuration principale
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub viewport: ViewportSection,
}

/// Section `api`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSection {
    /// URL de base du serveur (surchargée par `MAPNOTES_API_URL`)
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Section `sync` (délais en millisecondes)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSection {
    #[serde(default = "default_fetch_debounce")]
    pub fetch_debounce_ms: u64,
    #[serde(default = "default_save_debounce")]
    pub save_debounce_ms: u64,
    #[serde(default = "default_max_zoom")]
    pub default_max_zoom: f64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            fetch_debounce_ms: default_fetch_debounce(),
            save_debounce_ms: default_save_debounce(),
            default_max_zoom: default_max_zoom(),
        }
    }
}

/// Section `viewport` : taille de la fenêtre simulée en pixels
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewportSection {
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("mapnotes-cli/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_fetch_debounce() -> u64 {
    300
}

fn default_save_debounce() -> u64 {
    400
}

fn default_max_zoom() -> f64 {
    DEFAULT_MAX_ZOOM
}

fn default_width() -> f64 {
    1024.0
}

fn default_height() -> f64 {
    768.0
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => Self::load_embedded(include_str!("presets/default.json")),
            "responsive" => Self::load_embedded(include_str!("presets/responsive.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: default, responsive", preset),
        }
    }

    /// Nom de preset ou chemin vers un fichier JSON
    pub fn resolve(name: &str) -> Result<Self> {
        let path = Path::new(name);
        if name.ends_with(".json") || path.is_file() {
            Self::load(path)
        } else {
            Self::from_preset(name)
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            fetch_debounce: Duration::from_millis(self.sync.fetch_debounce_ms),
            save_debounce: Duration::from_millis(self.sync.save_debounce_ms),
        }
    }

    pub fn viewport_size(&self) -> ViewportSize {
        ViewportSize::new(self.viewport.width, self.viewport.height)
    }
}

/// Paramètres de connexion au serveur d'annotations
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub secret: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ApiConfig {
    /// Variables d'environnement, avec repli sur la section `api` du preset
    pub fn from_env(section: &ApiSection) -> Self {
        Self::from_lookup(section, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(section: &ApiSection, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup("MAPNOTES_API_URL")
            .or_else(|| section.base_url.clone())
            .unwrap_or_else(|| "http://localhost:8080".into());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: lookup("MAPNOTES_SECRET").filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(
                lookup("MAPNOTES_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(section.timeout_secs),
            ),
            user_agent: lookup("MAPNOTES_USER_AGENT").unwrap_or_else(|| section.user_agent.clone()),
        }
    }

    /// Applique les options de la ligne de commande
    pub fn apply_overrides(&mut self, base_url: Option<String>, secret: Option<String>) {
        if let Some(url) = base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secret) = secret {
            self.secret = Some(secret);
        }
    }
}
