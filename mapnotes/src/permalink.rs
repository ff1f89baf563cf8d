//! Permalien de la vue : `#<lon>,<lat>,<zoom>,<date>,<layerKey>,<projection>`
//!
//! Format positionnel à six emplacements, chacun pouvant être vide.
//! Le décodage ne renvoie jamais d'erreur : un jeton vide ou illisible
//! donne simplement un champ absent.

use crate::types::{LonLat, Projection, ViewportFrame};

/// État décodé d'un permalien, tous les champs sont optionnels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermalinkState {
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    pub zoom: Option<f64>,
    pub date: Option<String>,
    pub layer_key: Option<String>,
    pub projection: Option<Projection>,
}

impl PermalinkState {
    /// Centre si les deux coordonnées sont présentes
    pub fn center(&self) -> Option<LonLat> {
        Some(LonLat::new(self.lon?, self.lat?))
    }

    /// Encode l'état courant
    pub fn encode(&self) -> String {
        encode(
            self.center(),
            self.zoom,
            self.date.as_deref(),
            self.layer_key.as_deref(),
            self.projection,
        )
    }
}

impl From<&ViewportFrame> for PermalinkState {
    fn from(frame: &ViewportFrame) -> Self {
        Self {
            lon: Some(frame.center.lon),
            lat: Some(frame.center.lat),
            zoom: frame.zoom,
            date: frame.date.clone(),
            layer_key: Some(frame.layer_key.clone()),
            projection: Some(frame.projection),
        }
    }
}

/// Encode la vue en chaîne positionnelle (sans le `#`)
///
/// lon/lat à 5 décimales, zoom à 2 ; les valeurs absentes laissent un
/// emplacement vide.
pub fn encode(
    center: Option<LonLat>,
    zoom: Option<f64>,
    date: Option<&str>,
    layer_key: Option<&str>,
    projection: Option<Projection>,
) -> String {
    let (lon, lat) = match center {
        Some(c) => (fixed(c.lon, 5), fixed(c.lat, 5)),
        None => (String::new(), String::new()),
    };
    let zoom = zoom.map(|z| fixed(z, 2)).unwrap_or_default();

    [
        lon.as_str(),
        lat.as_str(),
        zoom.as_str(),
        date.unwrap_or_default(),
        layer_key.unwrap_or_default(),
        projection.map(Projection::code).unwrap_or_default(),
    ]
    .join(",")
}

/// Virgule fixe, sans `-0.00000` pour les valeurs arrondies à zéro
fn fixed(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.bytes().all(|b| b == b'0' || b == b'.') => rest.to_string(),
        _ => text,
    }
}

/// Décode un fragment (avec ou sans `#`)
pub fn decode(fragment: &str) -> PermalinkState {
    let body = fragment.trim().trim_start_matches('#');
    let mut tokens = body.split(',').map(str::trim);

    PermalinkState {
        lon: tokens.next().and_then(parse_number),
        lat: tokens.next().and_then(parse_number),
        zoom: tokens.next().and_then(parse_number),
        date: tokens.next().and_then(non_empty),
        layer_key: tokens.next().and_then(non_empty),
        projection: tokens.next().and_then(|t| t.parse().ok()),
    }
}

fn parse_number(token: &str) -> Option<f64> {
    if token.is_empty() {
        return None;
    }
    fast_float::parse::<f64, _>(token)
        .ok()
        .filter(|v| v.is_finite())
}

fn non_empty(token: &str) -> Option<String> {
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Extent;

    #[test]
    fn test_decode_scenario() {
        let state = decode(
            "#10.50000,20.25000,3.00,2024-01-01,gibs:MODIS_Terra_CorrectedReflectance_TrueColor,EPSG:3857",
        );
        assert_eq!(state.lon, Some(10.5));
        assert_eq!(state.lat, Some(20.25));
        assert_eq!(state.zoom, Some(3.0));
        assert_eq!(state.date.as_deref(), Some("2024-01-01"));
        assert_eq!(
            state.layer_key.as_deref(),
            Some("gibs:MODIS_Terra_CorrectedReflectance_TrueColor")
        );
        assert_eq!(state.projection, Some(Projection::WebMercator));
    }

    #[test]
    fn test_decode_partial() {
        assert_eq!(decode(""), PermalinkState::default());

        let state = decode("10.5");
        assert_eq!(state.lon, Some(10.5));
        assert_eq!(
            state,
            PermalinkState {
                lon: Some(10.5),
                ..Default::default()
            }
        );

        let state = decode(",,,,,EPSG:4326");
        assert_eq!(
            state,
            PermalinkState {
                projection: Some(Projection::Geographic),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_decode_garbage_never_fails() {
        let state = decode("#abc,NaN,inf,,layer,EPSG:9999,extra,tokens");
        assert_eq!(state.lon, None);
        assert_eq!(state.lat, None);
        assert_eq!(state.zoom, None);
        assert_eq!(state.date, None);
        assert_eq!(state.layer_key.as_deref(), Some("layer"));
        assert_eq!(state.projection, None);

        let state = decode("#,,,");
        assert_eq!(state, PermalinkState::default());
    }

    #[test]
    fn test_encode_keeps_empty_slots() {
        assert_eq!(encode(None, None, None, None, None), ",,,,,");
        assert_eq!(
            encode(
                Some(LonLat::new(10.5, 20.25)),
                Some(3.0),
                None,
                Some("osm"),
                Some(Projection::WebMercator)
            ),
            "10.50000,20.25000,3.00,,osm,EPSG:3857"
        );
    }

    #[test]
    fn test_negative_zero_is_normalized() {
        assert_eq!(
            encode(Some(LonLat::new(-0.000001, -1e-15)), Some(-0.001), None, None, None),
            "0.00000,0.00000,0.00,,,"
        );
        assert_eq!(fixed(-1.5, 2), "-1.50");
    }

    #[test]
    fn test_roundtrip() {
        let samples = [
            (-179.99999, -89.5, 0.0, "2020-02-29", "a", Projection::Geographic),
            (0.123456, 45.987654, 7.456, "2024-01-01", "gibs:layer", Projection::WebMercator),
            (179.5, 85.0, 18.75, "1999-12-31", "x-y_z", Projection::WebMercator),
        ];
        for (lon, lat, zoom, date, key, projection) in samples {
            let encoded = encode(
                Some(LonLat::new(lon, lat)),
                Some(zoom),
                Some(date),
                Some(key),
                Some(projection),
            );
            let decoded = decode(&format!("#{}", encoded));
            assert!((decoded.lon.unwrap() - lon).abs() <= 1e-5, "{}", encoded);
            assert!((decoded.lat.unwrap() - lat).abs() <= 1e-5, "{}", encoded);
            assert!((decoded.zoom.unwrap() - zoom).abs() <= 1e-2, "{}", encoded);
            assert_eq!(decoded.date.as_deref(), Some(date));
            assert_eq!(decoded.layer_key.as_deref(), Some(key));
            assert_eq!(decoded.projection, Some(projection));
        }
    }

    #[test]
    fn test_from_frame() {
        let frame = ViewportFrame {
            layer_key: "osm".to_string(),
            projection: Projection::WebMercator,
            date: None,
            zoom: Some(4.0),
            opacity: Some(0.5),
            center: LonLat::new(1.0, 2.0),
            extent: Extent::default(),
        };
        assert_eq!(
            PermalinkState::from(&frame).encode(),
            "1.00000,2.00000,4.00,,osm,EPSG:3857"
        );
    }
}
