use thiserror::Error;

use crate::crs::CrsError;
use crate::index::IndexError;

/// Errors raised by data source adapters.
///
/// A failing adapter only affects its own layer: the render engine logs the
/// error, marks the layer broken and keeps compositing the rest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// The source cannot be reached right now (connection refused, timeout,
    /// server error, missing file). The only retryable class.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// The source answered with data that cannot be decoded.
    #[error("Malformed source data: {0}")]
    FormatError(String),

    /// The fetch was cancelled because its redraw was superseded.
    #[error("Fetch cancelled")]
    Cancelled,

    #[error(transparent)]
    Crs(#[from] CrsError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl SourceError {
    /// Whether the retry loop should try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::SourceUnavailable(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceError::Cancelled)
    }

    /// Map an I/O error from opening or reading a local file.
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                SourceError::SourceUnavailable(format!("{}: {}", path.display(), err))
            }
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData => {
                SourceError::FormatError(format!("{}: {}", path.display(), err))
            }
            _ => SourceError::SourceUnavailable(format!("{}: {}", path.display(), err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::Path;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(SourceError::SourceUnavailable("503".into()).is_retryable());
        assert!(!SourceError::AuthFailure("401".into()).is_retryable());
        assert!(!SourceError::FormatError("xml".into()).is_retryable());
        assert!(!SourceError::Cancelled.is_retryable());
    }

    #[test]
    fn test_io_mapping() {
        let path = Path::new("/data/roads.shp");
        let missing = SourceError::from_io(path, io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(missing, SourceError::SourceUnavailable(_)));
        assert!(missing.to_string().contains("roads.shp"));

        let truncated = SourceError::from_io(path, io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(truncated, SourceError::FormatError(_)));
    }
}
