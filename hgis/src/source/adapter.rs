//! The capability trait every data source implements.

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::{FetchRequest, Payload, SourceError, SourceKind};
use crate::crs::CrsId;
use crate::geometry::BoundingBox;

/// A provider of features or imagery for a requested extent.
///
/// The render engine depends only on `dyn DataSource`; adapters for files,
/// services and databases are interchangeable behind it.
///
/// # Cancellation
///
/// `fetch` receives the token of the redraw generation it serves. Network
/// adapters race their I/O against it and return [`SourceError::Cancelled`]
/// once it fires. File adapters may finish decoding the current tile first.
pub trait DataSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Short human-readable description (a path, URL or table name).
    fn describe(&self) -> String;

    /// CRS the adapter's data is natively stored in.
    fn native_crs(&self) -> &CrsId;

    /// Full extent in the native CRS, when the adapter knows it.
    fn full_extent(&self) -> Option<BoundingBox>;

    /// Whether transient failures are retried with backoff.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Check that the source is reachable. Used when a project is opened.
    fn check_reachable(&self) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async { Ok(()) })
    }

    /// Fetch data covering `request.extent`.
    ///
    /// Every returned geometry and image carries its own CRS. File adapters
    /// answer in [`DataSource::native_crs`]; the database adapter lets the
    /// server reproject into `request.crs`.
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Payload, SourceError>>;
}
