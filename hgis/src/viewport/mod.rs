//! Viewport controller.
//!
//! The viewport maps a world extent in the project CRS onto a pixel grid:
//!
//! ```text
//!   world (project CRS)                 screen (pixels, y down)
//!   max_y ┌──────────────┐              (0,0) ┌──────────────┐
//!         │              │     ──►            │              │
//!   min_y └──────────────┘                    └──────────────┘ (w,h)
//!       min_x          max_x
//! ```
//!
//! Scale is never stored. It is derived from the extent width, the pixel
//! width and the OGC standard rendering pixel of 0.28 mm, so the extent and
//! the scale can never disagree.

mod error;
mod view;

pub use error::ViewportError;
pub use view::{ScreenPoint, ViewLimits, ViewState, Viewport, OGC_PIXEL_SIZE_M};
