//! Request and payload types shared by every adapter.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crs::CrsId;
use crate::geometry::{BoundingBox, Feature};

/// The family an adapter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    VectorFile,
    RasterTile,
    Service,
    Database,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::VectorFile => "vector_file",
            SourceKind::RasterTile => "raster_tile",
            SourceKind::Service => "service",
            SourceKind::Database => "database",
        };
        f.write_str(name)
    }
}

/// What a render pass asks an adapter for.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Area to cover, in `crs` coordinates.
    pub extent: BoundingBox,
    pub crs: CrsId,
    /// Scale denominator of the view.
    pub scale: f64,
    /// Output size in pixels.
    pub width: u32,
    pub height: u32,
}

impl FetchRequest {
    pub fn new(extent: BoundingBox, crs: CrsId, scale: f64, width: u32, height: u32) -> Self {
        Self {
            extent,
            crs,
            scale,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Ground size of one output pixel, in `crs` units.
    pub fn resolution(&self) -> f64 {
        self.extent.width() / self.width as f64
    }
}

/// A decoded image and the area it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTile {
    pub image: RgbaImage,
    pub extent: BoundingBox,
    pub crs: CrsId,
}

impl RasterTile {
    pub fn new(image: RgbaImage, extent: BoundingBox, crs: CrsId) -> Self {
        Self { image, extent, crs }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn estimated_size(&self) -> usize {
        self.image.as_raw().len() + std::mem::size_of::<Self>()
    }
}

/// Data returned by a fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Features in the adapter's native CRS.
    Features(Vec<Feature>),
    Image(RasterTile),
}

impl Payload {
    /// Approximate heap footprint, used by the cache budget.
    pub fn estimated_size(&self) -> usize {
        match self {
            Payload::Features(features) => features.iter().map(Feature::estimated_size).sum(),
            Payload::Image(tile) => tile.estimated_size(),
        }
    }

    pub fn features(&self) -> Option<&[Feature]> {
        match self {
            Payload::Features(features) => Some(features),
            Payload::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<&RasterTile> {
        match self {
            Payload::Image(tile) => Some(tile),
            Payload::Features(_) => None,
        }
    }
}
