//! Turns [`SourceBinding`]s into live adapters.
//!
//! # Example
//!
//! ```ignore
//! use hgis::source::{SourceFactory, SourceSettings};
//!
//! let factory = SourceFactory::new(engine, SourceSettings::default())?;
//! let adapter = factory.bind(layer.id, &layer.binding, &layer.source_crs).await?;
//! ```

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::http::{HttpClient, ReqwestHttpClient, DEFAULT_USER_AGENT};
use super::postgis::{FeatureQuery, PgQueryClient, PostgisAdapter};
use super::{
    DataSource, RasterTileAdapter, RetryPolicy, SourceBinding, SourceError, VectorFileAdapter,
    WmsAdapter,
};
use crate::crs::{CrsEngine, CrsId};
use crate::layer::LayerId;

/// Network and database knobs applied to every adapter the factory builds.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
    pub db_connect_timeout: Duration,
    pub db_max_connections: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            db_connect_timeout: Duration::from_secs(10),
            db_max_connections: 4,
        }
    }
}

/// Builds adapters for layer bindings.
///
/// One HTTP client is shared by every service layer, and one connection
/// pool per distinct database URL.
pub struct SourceFactory {
    engine: Arc<CrsEngine>,
    http: Arc<dyn HttpClient>,
    settings: SourceSettings,
    pools: DashMap<String, Arc<dyn FeatureQuery>>,
    query_override: Option<Arc<dyn FeatureQuery>>,
}

impl SourceFactory {
    pub fn new(engine: Arc<CrsEngine>, settings: SourceSettings) -> Result<Self, SourceError> {
        let http = ReqwestHttpClient::new(settings.request_timeout, &settings.user_agent)
            .map_err(|e| SourceError::SourceUnavailable(e.to_string()))?;
        Ok(Self::with_http_client(engine, settings, Arc::new(http)))
    }

    pub fn with_http_client(
        engine: Arc<CrsEngine>,
        settings: SourceSettings,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            engine,
            http,
            settings,
            pools: DashMap::new(),
            query_override: None,
        }
    }

    /// Route every database binding through `client` instead of a pool.
    pub fn with_query_client(mut self, client: Arc<dyn FeatureQuery>) -> Self {
        self.query_override = Some(client);
        self
    }

    pub fn engine(&self) -> &Arc<CrsEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    fn query_client(&self, connection: &str) -> Result<Arc<dyn FeatureQuery>, SourceError> {
        if let Some(client) = &self.query_override {
            return Ok(Arc::clone(client));
        }
        if let Some(pool) = self.pools.get(connection) {
            return Ok(Arc::clone(pool.value()));
        }
        let client: Arc<dyn FeatureQuery> = Arc::new(PgQueryClient::connect_lazy(
            connection,
            self.settings.db_max_connections,
            self.settings.db_connect_timeout,
        )?);
        self.pools
            .insert(connection.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Build the adapter for `binding` without touching the network.
    ///
    /// File adapters open and decode their file here; service and database
    /// adapters are only configured.
    pub async fn create(
        &self,
        layer: LayerId,
        binding: &SourceBinding,
        source_crs: &CrsId,
    ) -> Result<Arc<dyn DataSource>, SourceError> {
        let engine = Arc::clone(&self.engine);
        let adapter: Arc<dyn DataSource> = match binding {
            SourceBinding::VectorFile { path } => Arc::new(
                VectorFileAdapter::open(layer, path.clone(), source_crs.clone(), engine).await?,
            ),
            SourceBinding::RasterTile { path } => Arc::new(
                RasterTileAdapter::open(path.clone(), source_crs.clone(), engine).await?,
            ),
            SourceBinding::Service(config) => Arc::new(WmsAdapter::new(
                config.clone(),
                Arc::clone(&self.http),
                engine,
                self.settings.retry,
                self.settings.request_timeout,
            )),
            SourceBinding::Database(config) => {
                let client = self.query_client(&config.connection)?;
                Arc::new(PostgisAdapter::new(
                    config.clone(),
                    client,
                    engine,
                    self.settings.retry,
                    self.settings.request_timeout,
                )?)
            }
        };
        debug!(layer = %layer, kind = %binding.kind(), source = %adapter.describe(), "Adapter created");
        Ok(adapter)
    }

    /// Create the adapter and check that its source answers.
    pub async fn bind(
        &self,
        layer: LayerId,
        binding: &SourceBinding,
        source_crs: &CrsId,
    ) -> Result<Arc<dyn DataSource>, SourceError> {
        let adapter = self.create(layer, binding, source_crs).await?;
        adapter.check_reachable().await?;
        info!(layer = %layer, source = %adapter.describe(), "Layer source bound");
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PostgisConfig, SourceKind, WmsConfig};
    use crate::testing::{write_point_shapefile, MockHttpClient, MockQueryClient, PointRecord};

    fn factory(http: Arc<MockHttpClient>) -> SourceFactory {
        let settings = SourceSettings {
            retry: RetryPolicy::NONE,
            ..Default::default()
        };
        SourceFactory::with_http_client(Arc::new(CrsEngine::new()), settings, http)
            .with_query_client(Arc::new(MockQueryClient::new()))
    }

    #[tokio::test]
    async fn test_bind_vector_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poi.shp");
        write_point_shapefile(&path, &[PointRecord::new(127.0, 37.5, "A", 2001)], None).unwrap();

        let adapter = factory(Arc::new(MockHttpClient::new()))
            .bind(
                LayerId(1),
                &SourceBinding::VectorFile { path },
                &CrsId::epsg(4326),
            )
            .await
            .unwrap();
        assert_eq!(adapter.kind(), SourceKind::VectorFile);
        assert_eq!(adapter.native_crs(), &CrsId::epsg(4326));
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let result = factory(Arc::new(MockHttpClient::new()))
            .bind(
                LayerId(1),
                &SourceBinding::VectorFile {
                    path: "/nonexistent/roads.shp".into(),
                },
                &CrsId::epsg(4326),
            )
            .await;
        assert!(matches!(result, Err(SourceError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service_fails_check_but_creates() {
        let http = Arc::new(MockHttpClient::new());
        let factory = factory(Arc::clone(&http));
        let binding = SourceBinding::Service(WmsConfig::new(
            "https://maps.example.com/wms",
            "ortho",
            CrsId::epsg(3857),
        ));

        let created = factory
            .create(LayerId(2), &binding, &CrsId::epsg(3857))
            .await
            .unwrap();
        assert!(created.is_retryable());
        assert!(http.requests().is_empty());

        let bound = factory.bind(LayerId(2), &binding, &CrsId::epsg(3857)).await;
        assert!(matches!(bound, Err(SourceError::SourceUnavailable(_))));
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_database_binding_uses_query_client() {
        let binding = SourceBinding::Database(PostgisConfig::new(
            "postgres://localhost/gis",
            "parcels",
            CrsId::epsg(5186),
        ));
        let adapter = factory(Arc::new(MockHttpClient::new()))
            .bind(LayerId(3), &binding, &CrsId::epsg(5186))
            .await
            .unwrap();
        assert_eq!(adapter.kind(), SourceKind::Database);
    }
}
