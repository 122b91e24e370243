//! CLI command implementations.
//!
//! - [`project`] - `new` and `info`
//! - [`layer`] - `add-layer`
//! - [`render`] - `render`
//! - [`transform`] - `transform`
//! - [`crs`] - `crs`

pub mod common;
pub mod crs;
pub mod layer;
pub mod project;
pub mod render;
pub mod transform;
