use thiserror::Error;

use crate::crs::CrsError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewportError {
    #[error("Viewport size must be at least 1x1 pixels, got {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Invalid viewport extent: {0}")]
    InvalidExtent(String),

    #[error("Invalid scale: {0}")]
    InvalidScale(String),

    #[error(transparent)]
    Crs(#[from] CrsError),
}
