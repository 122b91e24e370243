//! Serializable description of where a layer's data lives.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::{PostgisConfig, SourceKind, WmsConfig};

/// What a project file records about a layer's source.
///
/// A binding is inert data; [`super::SourceFactory`] turns it into a live
/// adapter when the layer is added or the project is opened.
///
/// ```text
/// { "kind": "vector_file", "path": "data/roads.shp" }
/// { "kind": "service", "url": "https://...", "layers": "ortho", "crs": "EPSG:3857" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceBinding {
    VectorFile { path: PathBuf },
    RasterTile { path: PathBuf },
    Service(WmsConfig),
    Database(PostgisConfig),
}

impl SourceBinding {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceBinding::VectorFile { .. } => SourceKind::VectorFile,
            SourceBinding::RasterTile { .. } => SourceKind::RasterTile,
            SourceBinding::Service(_) => SourceKind::Service,
            SourceBinding::Database(_) => SourceKind::Database,
        }
    }

    /// Path, URL or table, with credentials masked.
    pub fn describe(&self) -> String {
        match self {
            SourceBinding::VectorFile { path } | SourceBinding::RasterTile { path } => {
                path.display().to_string()
            }
            SourceBinding::Service(config) => format!("{} ({})", config.url, config.layers),
            SourceBinding::Database(config) => {
                format!("{} {}", config.redacted_connection(), config.table)
            }
        }
    }

    /// Local file backing the binding, if any.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            SourceBinding::VectorFile { path } | SourceBinding::RasterTile { path } => Some(path),
            _ => None,
        }
    }

    /// Resolve a relative file path against `base` (the project directory).
    pub fn resolved(&self, base: &std::path::Path) -> SourceBinding {
        match self {
            SourceBinding::VectorFile { path } if path.is_relative() => SourceBinding::VectorFile {
                path: base.join(path),
            },
            SourceBinding::RasterTile { path } if path.is_relative() => SourceBinding::RasterTile {
                path: base.join(path),
            },
            other => other.clone(),
        }
    }
}
