//! Geometry and feature model.
//!
//! Every [`Geometry`] carries the identifier of the CRS its coordinates are
//! expressed in. Reprojection (see [`crate::crs::CrsEngine`]) always produces
//! a new geometry; nothing in this module mutates coordinates in place.

mod bbox;
mod feature;
mod shape;

pub use bbox::BoundingBox;
pub use feature::{AttributeValue, Attributes, Feature, FeatureHandle, FeatureId};
pub use shape::{Coord, Geometry, GeometryType, RasterGrid, Shape};
