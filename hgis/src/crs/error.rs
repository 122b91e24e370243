//! CRS error types.

use thiserror::Error;

use super::CrsId;

/// Errors raised while resolving or applying a coordinate transformation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CrsError {
    /// The identifier is not present in the registry.
    #[error("Unsupported CRS: {0}")]
    Unsupported(String),

    /// A coordinate lies outside the validity domain of a projection.
    #[error("Coordinate ({x}, {y}) is outside the domain of {crs}: {reason}")]
    OutOfDomain {
        crs: CrsId,
        x: f64,
        y: f64,
        reason: String,
    },
}

impl CrsError {
    pub fn is_out_of_domain(&self) -> bool {
        matches!(self, CrsError::OutOfDomain { .. })
    }
}

/// Domain violation reported by a projection, before the caller attaches
/// the CRS identifier and offending coordinate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DomainViolation(pub String);

impl DomainViolation {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub(crate) fn into_error(self, crs: &CrsId, x: f64, y: f64) -> CrsError {
        CrsError::OutOfDomain {
            crs: crs.clone(),
            x,
            y,
            reason: self.0,
        }
    }
}
