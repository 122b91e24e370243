//! Read-only status projections for the UI shell.
//!
//! The shell's status bar shows the coordinate under the cursor, the scale
//! and the project CRS; its layer list shows each layer's load state. This
//! module turns engine state into those strings without exposing the
//! engine's internals.

mod board;
mod format;

pub use board::{LayerStatusLine, StatusBoard, StatusSnapshot};
pub use format::{format_coordinate, format_scale, group_thousands};
