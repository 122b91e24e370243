use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::crs::CrsId;
use crate::layer::{LayerError, LayerId};
use crate::viewport::ViewportError;

/// Failures that stop a project from being opened or saved.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project file is not valid: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported project format version {found} (supported: 1 to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Unknown project CRS {0}")]
    UnknownCrs(CrsId),

    #[error(transparent)]
    Viewport(#[from] ViewportError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ProjectError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProjectError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A layer-level problem found while opening a project. The layer is kept;
/// the rest of the project opens normally.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectLoadWarning {
    pub layer: LayerId,
    pub name: String,
    pub reason: String,
}

impl ProjectLoadWarning {
    pub(crate) fn new(layer: LayerId, name: &str, reason: impl Into<String>) -> Self {
        Self {
            layer,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProjectLoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layer '{}' ({}): {}", self.name, self.layer, self.reason)
    }
}
