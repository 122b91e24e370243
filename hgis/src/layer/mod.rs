//! Layers and the layer stack.
//!
//! The stack is an ordered list where index 0 is the top (front-most) layer.
//! Painting walks the list from the last index up to index 0:
//!
//! ```text
//!   index 0  ── roads.shp      ◄─ painted last (top)
//!   index 1  ── parcels (PostGIS)
//!   index 2  ── ortho (WMS)    ◄─ painted first (bottom)
//! ```
//!
//! Z-order values always form the contiguous permutation `0..n`; every
//! insert, remove and reorder renumbers the whole list before returning.
//! Render passes read an immutable [`LayerSnapshot`], so edits never race a
//! pass in progress.

mod error;
mod stack;
mod types;

pub use error::LayerError;
pub use stack::{LayerSnapshot, LayerStack};
pub use types::{
    Layer, LayerId, LayerKind, LayerMetadata, LayerStatus, NewLayer, ScaleRange,
};
