//! OGC WMS 1.3.0 GetMap adapter.

use futures::future::BoxFuture;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, Instrument};
use url::Url;

use super::http::{HttpClient, HttpResponse};
use super::{DataSource, FetchRequest, Payload, RasterTile, RetryPolicy, SourceError, SourceKind};
use crate::crs::{registry, CrsEngine, CrsId};
use crate::geometry::BoundingBox;

const WMS_VERSION: &str = "1.3.0";

fn default_format() -> String {
    "image/png".to_string()
}

fn default_true() -> bool {
    true
}

/// Connection details of a WMS layer, as stored in a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WmsConfig {
    /// GetMap endpoint; existing query parameters are kept.
    pub url: String,
    /// Comma-separated WMS layer names.
    pub layers: String,
    #[serde(default)]
    pub styles: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub transparent: bool,
    /// CRS images are requested in.
    pub crs: CrsId,
    /// Extra request headers (API keys, bearer tokens).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Advertised extent in `crs`, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<BoundingBox>,
}

impl WmsConfig {
    pub fn new(url: impl Into<String>, layers: impl Into<String>, crs: CrsId) -> Self {
        Self {
            url: url.into(),
            layers: layers.into(),
            styles: String::new(),
            format: default_format(),
            transparent: true,
            crs,
            headers: BTreeMap::new(),
            extent: None,
        }
    }
}

/// Build a GetMap URL.
///
/// WMS 1.3.0 honours the CRS axis order, so geographic systems put latitude
/// first in `BBOX`.
pub fn get_map_url(
    config: &WmsConfig,
    extent: &BoundingBox,
    width: u32,
    height: u32,
) -> Result<Url, SourceError> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| SourceError::FormatError(format!("invalid service URL {}: {}", config.url, e)))?;

    let lat_first = registry::lookup(&config.crs)
        .map(|crs| crs.is_geographic())
        .unwrap_or(false);
    let bbox = if lat_first {
        [extent.min_y, extent.min_x, extent.max_y, extent.max_x]
    } else {
        [extent.min_x, extent.min_y, extent.max_x, extent.max_y]
    };
    let bbox = bbox.map(|v| v.to_string()).join(",");

    url.query_pairs_mut()
        .append_pair("SERVICE", "WMS")
        .append_pair("VERSION", WMS_VERSION)
        .append_pair("REQUEST", "GetMap")
        .append_pair("LAYERS", &config.layers)
        .append_pair("STYLES", &config.styles)
        .append_pair("CRS", config.crs.as_str())
        .append_pair("BBOX", &bbox)
        .append_pair("WIDTH", &width.to_string())
        .append_pair("HEIGHT", &height.to_string())
        .append_pair("FORMAT", &config.format)
        .append_pair("TRANSPARENT", if config.transparent { "TRUE" } else { "FALSE" });
    Ok(url)
}

pub fn get_capabilities_url(config: &WmsConfig) -> Result<Url, SourceError> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| SourceError::FormatError(format!("invalid service URL {}: {}", config.url, e)))?;
    url.query_pairs_mut()
        .append_pair("SERVICE", "WMS")
        .append_pair("VERSION", WMS_VERSION)
        .append_pair("REQUEST", "GetCapabilities");
    Ok(url)
}

/// Map a response status onto the adapter failure classes.
fn check_status(response: &HttpResponse) -> Result<(), SourceError> {
    match response.status {
        200..=299 => Ok(()),
        401 | 403 => Err(SourceError::AuthFailure(format!(
            "service rejected credentials (HTTP {})",
            response.status
        ))),
        404 | 408 | 429 | 500..=599 => Err(SourceError::SourceUnavailable(format!(
            "service returned HTTP {}",
            response.status
        ))),
        other => Err(SourceError::FormatError(format!(
            "unexpected HTTP {}",
            other
        ))),
    }
}

/// Pull the message out of a `ServiceException` document.
fn service_exception_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let message = text
        .find("<ServiceException")
        .and_then(|start| {
            let rest = &text[start..];
            let open_end = rest.find('>')? + 1;
            let close = rest.find("</ServiceException>")?;
            (close >= open_end).then(|| rest[open_end..close].trim().to_string())
        })
        .filter(|m| !m.is_empty());
    message.unwrap_or_else(|| "service returned an XML document instead of an image".to_string())
}

/// Decode a GetMap response into an image.
pub(crate) fn decode_response(response: &HttpResponse) -> Result<RgbaImage, SourceError> {
    check_status(response)?;
    if response.looks_like_xml() {
        return Err(SourceError::FormatError(service_exception_message(
            &response.body,
        )));
    }
    image::load_from_memory(&response.body)
        .map(|img| img.to_rgba8())
        .map_err(|e| SourceError::FormatError(format!("undecodable image: {}", e)))
}

/// Serves imagery from a WMS endpoint.
pub struct WmsAdapter {
    config: WmsConfig,
    client: Arc<dyn HttpClient>,
    engine: Arc<CrsEngine>,
    retry: RetryPolicy,
    timeout: Duration,
    headers: Vec<(String, String)>,
}

impl WmsAdapter {
    pub fn new(
        config: WmsConfig,
        client: Arc<dyn HttpClient>,
        engine: Arc<CrsEngine>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        let headers = config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            config,
            client,
            engine,
            retry,
            timeout,
            headers,
        }
    }

    pub fn config(&self) -> &WmsConfig {
        &self.config
    }

    /// One GET, raced against cancellation and the per-request timeout.
    async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<HttpResponse, SourceError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SourceError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.client.get(url, &self.headers)) => {
                match result {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => Err(SourceError::SourceUnavailable(e.to_string())),
                    Err(_) => Err(SourceError::SourceUnavailable(format!(
                        "no response within {}s",
                        self.timeout.as_secs_f64()
                    ))),
                }
            }
        }
    }

    async fn get_map_once(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, SourceError> {
        let response = self.get(url, cancel).await?;
        tokio::task::spawn_blocking(move || decode_response(&response))
            .await
            .map_err(|e| SourceError::FormatError(format!("decode task failed: {}", e)))?
    }
}

impl DataSource for WmsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Service
    }

    fn describe(&self) -> String {
        format!("{} [{}]", self.config.url, self.config.layers)
    }

    fn native_crs(&self) -> &CrsId {
        &self.config.crs
    }

    fn full_extent(&self) -> Option<BoundingBox> {
        self.config.extent
    }

    fn is_retryable(&self) -> bool {
        true
    }

    /// A single GetCapabilities round trip; only the status is checked.
    fn check_reachable(&self) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async move {
            let url = get_capabilities_url(&self.config)?;
            let response = self.get(url.as_str(), &CancellationToken::new()).await?;
            check_status(&response)
        })
    }

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Payload, SourceError>> {
        let span = debug_span!("wms_fetch", layers = %self.config.layers);
        Box::pin(
            async move {
                let extent = self
                    .engine
                    .transform_bbox(&request.extent, &request.crs, &self.config.crs)?;
                let url = get_map_url(&self.config, &extent, request.width, request.height)?;
                debug!(url = %url, "GetMap");
                let image = self
                    .retry
                    .run(&self.config.url, cancel, || self.get_map_once(url.as_str(), cancel))
                    .await?;
                Ok(Payload::Image(RasterTile::new(
                    image,
                    extent,
                    self.config.crs.clone(),
                )))
            }
            .instrument(span),
        )
    }
}
