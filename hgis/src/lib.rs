//! HGIS - layer composition and coordinate transformation engine
//!
//! This library is the core of the HGIS desktop GIS: it ingests spatial data
//! from heterogeneous sources, reprojects it into a common working CRS and
//! composites the layers in z-order onto a pannable, zoomable viewport.
//!
//! # Architecture
//!
//! ```text
//!  Viewport change ──► RedrawCoordinator ──► per layer: cache ─► DataSource::fetch
//!                            │                                   │
//!                            │                    SpatialIndex ◄─┘ (vector files)
//!                            ▼
//!                      CrsEngine (reproject) ──► Surface (tiny-skia) ──► watch channel
//!
//!  Project <──► LayerStack + Viewport + CRS   (persisted as a `.hgis` JSON file)
//! ```
//!
//! # High-Level API
//!
//! ```ignore
//! use hgis::crs::CrsId;
//! use hgis::project::{Project, ProjectStore};
//!
//! let store = ProjectStore::new(factory);
//! let (project, warnings) = store.open(path).await?;
//! for warning in &warnings {
//!     eprintln!("{}", warning);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod crs;
pub mod geometry;
pub mod index;
pub mod layer;
pub mod logging;
pub mod project;
pub mod render;
pub mod source;
pub mod status;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod viewport;

/// Version of the HGIS library and CLI.
///
/// The version is defined in the workspace `Cargo.toml` and injected at
/// compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
