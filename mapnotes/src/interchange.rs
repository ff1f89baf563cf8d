//! Import / export de fichiers GeoJSON
//!
//! Le fichier est toujours en géographique (EPSG:4326) avec 6 décimales,
//! quelle que soit la projection de travail de la vue.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use geojson::GeoJson;

use crate::projection::{round_geometry, transform_geometry};
use crate::sync::AnnotationFeature;
use crate::types::Projection;
use crate::{Error, Result};

/// Précision des coordonnées exportées
pub const EXPORT_DECIMALS: u8 = 6;

/// Projection des fichiers échangés
pub const INTERCHANGE_PROJECTION: Projection = Projection::Geographic;

/// Écrit une FeatureCollection (streaming, une feature à la fois)
pub fn write_geojson<W: Write>(
    writer: &mut W,
    features: &[AnnotationFeature],
    source: Projection,
) -> Result<()> {
    // Header FeatureCollection avec CRS
    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        INTERCHANGE_PROJECTION.epsg()
    )?;

    for (i, feature) in features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        let mut exported = feature.clone();
        exported.order = i;
        exported.geometry = round_geometry(
            &transform_geometry(&feature.geometry, source, INTERCHANGE_PROJECTION),
            EXPORT_DECIMALS,
        );
        serde_json::to_writer(&mut *writer, &exported.to_geojson())?;
    }

    write!(writer, "]}}")?;
    Ok(())
}

/// Exporte les entités vers un fichier
pub fn export_to_file(features: &[AnnotationFeature], source: Projection, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_geojson(&mut writer, features, source)?;
    writer.flush()?;
    Ok(())
}

/// Lit un document GeoJSON (FeatureCollection ou Feature) vers la projection `target`
///
/// Les ids éventuels sont ignorés : chaque entité importée est nouvelle.
pub fn parse_geojson(text: &str, target: Projection) -> Result<Vec<AnnotationFeature>> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(Error::invalid_geometry(
                "document",
                "expected a Feature or FeatureCollection",
            ))
        }
    };

    features
        .into_iter()
        .enumerate()
        .map(|(order, feature)| {
            let mut annotation = AnnotationFeature::from_geojson(feature)?;
            annotation.id = None;
            annotation.order = order;
            annotation.geometry =
                transform_geometry(&annotation.geometry, INTERCHANGE_PROJECTION, target);
            Ok(annotation)
        })
        .collect()
}

/// Lit un fichier GeoJSON
pub fn read_geojson(path: &Path, target: Projection) -> Result<Vec<AnnotationFeature>> {
    let text = std::fs::read_to_string(path)?;
    parse_geojson(&text, target)
}
