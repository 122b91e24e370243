//! Coordinate reference systems and reprojection.
//!
//! # Overview
//!
//! A CRS is looked up by identifier (`EPSG:5186`) from a process-wide,
//! immutable [`registry`]. The [`CrsEngine`] compiles a [`Pipeline`] for
//! every `(source, target)` pair it is asked about and caches it, so the
//! per-coordinate work is a plain chain of function calls:
//!
//! ```text
//!  source projected ─inverse─► source geographic ─┐
//!                                                 │ datum differs?
//!                          geocentric ◄───────────┘
//!                          Helmert to WGS84, Helmert from WGS84
//!                          geocentric ──► target geographic ─forward─► target projected
//! ```
//!
//! Projections are implemented in pure Rust: geographic longitude/latitude,
//! spherical Web Mercator and ellipsoidal transverse Mercator (Krüger series
//! to sixth order, after Karney 2011).

mod datum;
mod ellipsoid;
mod engine;
mod error;
mod id;
mod math;
mod projection;
pub mod registry;
mod tmerc;
pub mod wkt;

pub use datum::{Datum, Helmert};
pub use ellipsoid::Ellipsoid;
pub use engine::{BatchTransform, CrsEngine, Pipeline};
pub use error::CrsError;
pub use id::CrsId;
pub use projection::Projection;
pub use registry::{lookup, Crs, Units};
pub use tmerc::TransverseMercator;
