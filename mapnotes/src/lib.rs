//! # mapnotes
//!
//! Contrôleur d'un visualiseur de tuiles annoté : garde cohérents l'état de
//! la vue, le catalogue de couches distant, le stock d'annotations distant
//! et le permalien partageable, malgré une activité réseau asynchrone.
//!
//! ## Composants
//!
//! - [`permalink`] : codec positionnel `#lon,lat,zoom,date,layerKey,projection`
//! - [`projection`] : reprojection de la vue entre EPSG:4326 et EPSG:3857
//! - [`dedup`] / [`catalog`] : requêtes single-flight et cache du catalogue
//! - [`sync`] : synchronisation des annotations cadrée sur le frame
//! - [`view`] : contrôleur de vue (couche, date, permalien, tuiles)
//! - [`interchange`] : import / export GeoJSON
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mapnotes::{permalink, AnnotationSync, ApiClient, SyncSettings, ViewController, ViewportSize};
//!
//! let catalog = catalog_cache.get().await?;
//! let mut view = ViewController::from_permalink(
//!     &permalink::decode("#10.5,20.25,3,,osm,EPSG:3857"),
//!     &catalog,
//!     &mapnotes::view::today(),
//!     ViewportSize::default(),
//! )?;
//!
//! let sync = AnnotationSync::new(api, SyncSettings::default());
//! let (frame, link) = view.settle();
//! sync.set_frame(frame);
//! ```

pub mod api;
pub mod catalog;
pub mod debounce;
pub mod dedup;
pub mod error;
pub mod interchange;
pub mod permalink;
pub mod projection;
pub mod sync;
pub mod tiles;
pub mod transport;
pub mod types;
pub mod view;

pub use api::ApiClient;
pub use catalog::CatalogCache;
pub use dedup::RequestCache;
pub use error::{ApiError, Error, Result};
pub use permalink::PermalinkState;
pub use sync::{AnnotationFeature, AnnotationSync, LocalKey, StoreChange, SyncSettings, SyncStatus};
pub use transport::{HttpRequest, HttpResponse, Method, Transport};
pub use types::{Extent, LayerCatalog, LayerDescriptor, LonLat, Projection, ViewportFrame};
pub use view::{ViewController, ViewportSize};
