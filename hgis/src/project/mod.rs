//! Project persistence.
//!
//! A project is a [`LayerStack`](crate::layer::LayerStack), a
//! [`Viewport`](crate::viewport::Viewport) and the project CRS. It is
//! stored as a pretty-printed JSON `.hgis` document carrying a format
//! version.
//!
//! [`save`] and [`load`] work on bytes and never touch a data source.
//! [`ProjectStore`] adds the file system and binds the loaded layers; a
//! layer that cannot be bound becomes a [`ProjectLoadWarning`] and stays in
//! the stack, unbound, so saving the project again does not lose it.

mod document;
mod error;
mod model;
mod store;

pub use document::FORMAT_VERSION;
pub use error::{ProjectError, ProjectLoadWarning};
pub use model::{load, save, Project};
pub use store::ProjectStore;
