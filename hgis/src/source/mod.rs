//! Data source adapters.
//!
//! Every source a layer can draw from implements [`DataSource`]. The render
//! engine only sees the trait object; the concrete adapters are:
//!
//! | Adapter               | Binding                        | Payload  | Retried |
//! |-----------------------|--------------------------------|----------|---------|
//! | [`VectorFileAdapter`] | `.shp` + `.dbf` + `.prj`       | features | no      |
//! | [`RasterTileAdapter`] | GeoTIFF with overviews         | image    | no      |
//! | [`WmsAdapter`]        | WMS 1.3.0 GetMap endpoint      | image    | yes     |
//! | [`PostgisAdapter`]    | PostGIS table                  | features | yes     |
//!
//! A [`SourceBinding`] is the serializable description stored in a project;
//! [`SourceFactory`] turns it into an adapter.
//!
//! # Failures
//!
//! Adapter failures never escape their layer. [`SourceError`] separates
//! transient unavailability (the only retried class) from rejected
//! credentials and undecodable data.

mod adapter;
mod binding;
mod error;
mod factory;
mod http;
mod postgis;
mod raster;
mod retry;
pub mod shapefile;
mod types;
mod vector;
pub mod wkb;
mod wms;

pub use adapter::DataSource;
pub use binding::SourceBinding;
pub use error::SourceError;
pub use factory::{SourceFactory, SourceSettings};
pub use http::{HttpClient, HttpError, HttpResponse, ReqwestHttpClient, DEFAULT_USER_AGENT};
pub use postgis::{
    classify_sqlx_error, envelope_sql, EnvelopeQuery, FeatureQuery, FeatureRow, PgQueryClient,
    PostgisAdapter, PostgisConfig,
};
pub use raster::{OverviewLevel, RasterTileAdapter};
pub use retry::RetryPolicy;
pub use types::{FetchRequest, Payload, RasterTile, SourceKind};
pub use vector::{FieldStatistics, VectorFileAdapter};
pub use wms::{get_capabilities_url, get_map_url, WmsAdapter, WmsConfig};
