//! Rapport d'envoi d'un fichier d'annotations
//!
//! Chaque entité est envoyée séparément : une entité rejetée est annulée
//! localement sans bloquer les suivantes.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Statut global de l'envoi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PushStatus {
    /// Toutes les entités ont été enregistrées
    Success,
    /// Certaines entités ont été annulées
    PartialSuccess,
    /// Aucune entité enregistrée
    Failed,
}

/// Entité rejetée par le serveur
#[derive(Debug, Clone, Serialize)]
pub struct PushError {
    /// Position dans le fichier source
    pub index: usize,
    pub label: Option<String>,
    pub message: String,
    /// Statut HTTP si le serveur a répondu
    pub status: Option<u16>,
}

/// Rapport complet d'envoi
#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    /// Fichier source
    pub source: String,
    pub layer_key: String,
    pub generated_at: String,
    pub duration_secs: f64,
    pub status: PushStatus,

    pub entities_read: usize,
    pub entities_imported: usize,
    pub entities_rolled_back: usize,

    pub errors: Vec<PushError>,
}

impl PushReport {
    pub fn new(source: &str, layer_key: &str) -> Self {
        Self {
            source: source.to_string(),
            layer_key: layer_key.to_string(),
            generated_at: OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default(),
            duration_secs: 0.0,
            status: PushStatus::Success,
            entities_read: 0,
            entities_imported: 0,
            entities_rolled_back: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_read(&mut self, count: usize) {
        self.entities_read += count;
    }

    pub fn record_import(&mut self) {
        self.entities_imported += 1;
    }

    /// Enregistre une entité annulée
    pub fn record_error(&mut self, error: PushError) {
        self.entities_rolled_back += 1;
        self.errors.push(error);
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let has_errors = !self.errors.is_empty();
        let has_success = self.entities_imported > 0;

        self.status = match (has_errors, has_success) {
            (false, _) => PushStatus::Success,
            (true, true) => PushStatus::PartialSuccess,
            (true, false) => PushStatus::Failed,
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("PUSH REPORT - {} -> {}", self.source, self.layer_key);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Entities: {} read, {} imported, {} rolled back",
            self.entities_read, self.entities_imported, self.entities_rolled_back
        );

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                let label = e.label.as_deref().unwrap_or("-");
                match e.status {
                    Some(status) => println!("  [#{} {}] HTTP {}: {}", e.index, label, status, e.message),
                    None => println!("  [#{} {}] {}", e.index, label, e.message),
                }
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} imported, {} rolled back",
            self.source, self.entities_imported, self.entities_rolled_back
        )
    }
}
