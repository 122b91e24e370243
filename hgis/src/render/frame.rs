//! Published frames.

use std::path::Path;
use std::sync::Arc;
use tiny_skia::Pixmap;

use super::surface::pixel_rgba;
use super::RenderError;
use crate::crs::CrsId;
use crate::geometry::BoundingBox;
use crate::layer::{LayerId, LayerStatus};
use crate::viewport::ViewState;

/// The last successfully painted image of one layer.
///
/// Kept between passes so a layer stays visible, shifted and scaled to the
/// new view, until its fresh content arrives.
#[derive(Debug, Clone)]
pub struct LayerImage {
    pub layer: LayerId,
    /// Generation of the pass that painted it.
    pub generation: u64,
    pub extent: BoundingBox,
    pub crs: CrsId,
    pub pixmap: Arc<Pixmap>,
}

/// Per-layer line of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerFrameStatus {
    pub layer: LayerId,
    pub status: LayerStatus,
    /// Generation of the content shown for this layer, if any.
    pub content_generation: Option<u64>,
}

/// A composited map image and how it was produced.
#[derive(Debug, Clone)]
pub struct Frame {
    pub generation: u64,
    pub crs: CrsId,
    pub view: ViewState,
    pub image: Arc<Pixmap>,
    /// Drawn layers, top first.
    pub layers: Vec<LayerFrameStatus>,
    /// Every drawn layer has reported for this generation.
    pub complete: bool,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerFrameStatus> {
        self.layers.iter().find(|l| l.layer == id)
    }

    /// Straight-alpha RGBA of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        pixel_rgba(&self.image, x, y)
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        self.image
            .encode_png()
            .map_err(|e| RenderError::Encode(e.to_string()))
    }

    pub fn save_png(&self, path: &Path) -> Result<(), RenderError> {
        let bytes = self.encode_png()?;
        std::fs::write(path, bytes)
            .map_err(|e| RenderError::Encode(format!("{}: {}", path.display(), e)))
    }
}
