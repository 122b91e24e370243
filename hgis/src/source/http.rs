//! HTTP client abstraction for the service adapter.
//!
//! The adapter talks to an [`HttpClient`] trait object so tests can script
//! responses; [`ReqwestHttpClient`] is the production implementation.

use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;
use tracing::{trace, warn};

/// Transport-level failure: no HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Other(String),
}

/// A completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body is XML, judging by the content type or the first
    /// non-blank byte.
    pub fn looks_like_xml(&self) -> bool {
        if self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("xml"))
        {
            return true;
        }
        self.body
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|&b| b == b'<')
    }
}

/// Asynchronous GET with extra request headers.
pub trait HttpClient: Send + Sync {
    fn get<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>>;
}

/// Default User-Agent sent with service requests.
pub const DEFAULT_USER_AGENT: &str = concat!("hgis/", env!("CARGO_PKG_VERSION"));

/// [`HttpClient`] backed by a pooled `reqwest` client.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| HttpError::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn classify(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout
    } else if e.is_connect() {
        HttpError::Connect(e.to_string())
    } else {
        HttpError::Other(e.to_string())
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get<'a>(
        &'a self,
        url: &'a str,
        headers: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        Box::pin(async move {
            trace!(url = url, "HTTP GET request starting");
            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request.send().await.map_err(|e| {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                classify(e)
            })?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await.map_err(classify)?.to_vec();
            trace!(url = url, status, bytes = body.len(), "HTTP response received");

            Ok(HttpResponse {
                status,
                content_type,
                body,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: Option<&str>, body: &[u8]) -> HttpResponse {
        HttpResponse {
            status: 200,
            content_type: content_type.map(str::to_string),
            body: body.to_vec(),
        }
    }

    #[test]
    fn test_xml_detection() {
        assert!(response(Some("application/vnd.ogc.se_xml"), b"").looks_like_xml());
        assert!(response(None, b"  \n<?xml version=\"1.0\"?>").looks_like_xml());
        assert!(!response(Some("image/png"), b"\x89PNG").looks_like_xml());
        assert!(!response(None, b"").looks_like_xml());
    }

    #[test]
    fn test_success_range() {
        let mut r = response(None, b"");
        assert!(r.is_success());
        r.status = 304;
        assert!(!r.is_success());
    }

    #[test]
    fn test_client_builds() {
        assert!(ReqwestHttpClient::new(Duration::from_secs(5), DEFAULT_USER_AGENT).is_ok());
    }
}
