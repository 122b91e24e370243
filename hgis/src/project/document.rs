//! On-disk shape of a `.hgis` project.
//!
//! ```json
//! {
//!   "version": 1,
//!   "crs": "EPSG:5186",
//!   "viewport": { "extent": {...}, "scale": 25000.0, "width": 1024, "height": 768 },
//!   "layers": [
//!     { "id": 2, "name": "Roads", "kind": "vector", "z_order": 0,
//!       "source": { "kind": "vector_file", "path": "data/roads.shp" },
//!       "source_crs": "EPSG:5186", "visible": true, "opacity": 1.0 }
//!   ]
//! }
//! ```
//!
//! Layers are written top first; `z_order` is authoritative on load.

use serde::{Deserialize, Serialize};

use crate::crs::CrsId;
use crate::layer::{Layer, LayerId, LayerKind, LayerMetadata, ScaleRange};
use crate::source::SourceBinding;
use crate::viewport::ViewState;

/// Newest format this build writes and reads.
pub const FORMAT_VERSION: u32 = 1;

/// Only the version, read before committing to a layout.
#[derive(Deserialize)]
pub(super) struct VersionHeader {
    pub version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct ProjectDocument {
    pub version: u32,
    pub crs: CrsId,
    pub viewport: ViewState,
    #[serde(default)]
    pub layers: Vec<LayerRecord>,
}

fn visible_default() -> bool {
    true
}

fn opacity_default() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct LayerRecord {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub z_order: usize,
    pub source: SourceBinding,
    pub source_crs: CrsId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default = "visible_default")]
    pub visible: bool,
    #[serde(default = "opacity_default")]
    pub opacity: f64,
    #[serde(default)]
    pub scale_range: ScaleRange,
    #[serde(default)]
    pub metadata: LayerMetadata,
}

impl From<&Layer> for LayerRecord {
    fn from(layer: &Layer) -> Self {
        Self {
            id: layer.id,
            name: layer.name.clone(),
            kind: layer.kind,
            z_order: layer.z_order(),
            source: layer.binding.clone(),
            source_crs: layer.source_crs.clone(),
            style: layer.style.clone(),
            visible: layer.visible,
            opacity: layer.opacity,
            scale_range: layer.scale_range,
            metadata: layer.metadata.clone(),
        }
    }
}
