use thiserror::Error;

use super::LayerId;

/// Errors from layer stack edits.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerError {
    #[error("No layer with id {0}")]
    UnknownLayer(LayerId),

    #[error("Layer index {index} is out of range for a stack of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Layer id {0} is already in use")]
    DuplicateId(LayerId),

    #[error("Invalid opacity {0}: must be a number between 0 and 1")]
    InvalidOpacity(f64),

    #[error("Invalid scale range: {0}")]
    InvalidScaleRange(String),
}
