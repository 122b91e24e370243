//! Shared setup for commands that touch projects or data sources.

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use hgis::cache::FetchCache;
use hgis::config::ConfigFile;
use hgis::crs::CrsEngine;
use hgis::logging::{init_logging, LoggingGuard};
use hgis::project::ProjectStore;
use hgis::render::Renderer;
use hgis::source::SourceFactory;

use crate::error::CliError;

/// Configuration, logging and the engine objects every command shares.
pub struct CliRunner {
    config: ConfigFile,
    engine: Arc<CrsEngine>,
    store: ProjectStore,
    _logging_guard: LoggingGuard,
}

impl CliRunner {
    /// Load the configuration (from `config_path`, or the default
    /// location) and start logging.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let guard = init_logging(&config.logging.directory, &config.logging.file)
            .map_err(CliError::LoggingInit)?;
        info!(version = hgis::VERSION, log = %guard.path().display(), "HGIS starting");

        let engine = Arc::new(CrsEngine::new());
        let factory = SourceFactory::new(Arc::clone(&engine), config.source_settings())?;
        let store = ProjectStore::new(Arc::new(factory));

        Ok(Self {
            config,
            engine,
            store,
            _logging_guard: guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn engine(&self) -> &Arc<CrsEngine> {
        &self.engine
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// A renderer with a fresh cache sized from the configuration.
    pub fn renderer(&self) -> Renderer {
        let cache = Arc::new(FetchCache::new(self.config.cache.memory_size));
        Renderer::new(
            Arc::clone(&self.engine),
            cache,
            &self.config.render_settings(),
        )
    }
}
