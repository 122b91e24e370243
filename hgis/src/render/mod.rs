//! Render engine.
//!
//! Turns a layer stack and a viewport into composited frames:
//!
//! ```text
//!  for each drawn layer (concurrently, bounded by fetch permits):
//!      FetchCache ──miss──► DataSource::fetch ──► CrsEngine ──► Surface
//!                                                                  │
//!  bottom layer first, with opacity:                               ▼
//!      background ◄──────────────── composite ◄────────────── LayerImage
//! ```
//!
//! [`Renderer::render_once`] draws a single complete frame and is what the
//! CLI uses. [`RedrawCoordinator`] is the interactive path: it debounces
//! redraw requests, cancels superseded passes and publishes progressively
//! completed frames on a watch channel.

mod coordinator;
mod error;
mod frame;
mod pass;
mod surface;
mod symbol;

pub use coordinator::{RedrawCoordinator, RedrawReason, RedrawRequest};
pub use error::RenderError;
pub use frame::{Frame, LayerFrameStatus, LayerImage};
pub use pass::{LayerOutcome, RenderSettings, Renderer};
pub use surface::{pixel_rgba, pixmap_from_rgba, Surface};
pub use symbol::Symbol;
