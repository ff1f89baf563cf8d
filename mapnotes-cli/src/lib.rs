//! Client en ligne de commande pour un serveur d'annotations cartographiques
//!
//! Le binaire `mapnotes` s'appuie sur ces modules ; ils sont exposés pour
//! les tests d'intégration.

pub mod cli;
pub mod config;
pub mod http;
pub mod report;
