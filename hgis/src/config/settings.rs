//! Configuration structs, their defaults and conversions into the
//! engine's settings types.

use std::path::PathBuf;
use std::time::Duration;

use crate::render::RenderSettings;
use crate::source::{RetryPolicy, SourceSettings, DEFAULT_USER_AGENT};
use crate::viewport::ViewLimits;

/// Default memory budget of the fetch cache (256 MB).
pub const DEFAULT_MEMORY_CACHE_SIZE: usize = 256 * 1024 * 1024;

pub const DEFAULT_LOG_FILE: &str = "hgis.log";

/// Everything `config.ini` can set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    pub render: RenderConfig,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub database: DatabaseConfig,
    pub viewport: ViewportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub debounce_ms: u64,
    pub max_concurrent_fetches: usize,
    /// RGBA, written as `#rrggbb` or `#rrggbbaa`.
    pub background: [u8; 4],
    /// Pixel size used by `hgis render` when none is given.
    pub default_width: u32,
    pub default_height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let settings = RenderSettings::default();
        Self {
            debounce_ms: settings.debounce.as_millis() as u64,
            max_concurrent_fetches: settings.max_concurrent_fetches,
            background: settings.background,
            default_width: 1024,
            default_height: 768,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Byte budget shared by all layers.
    pub memory_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_CACHE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            timeout_secs: 30,
            max_retries: retry.max_retries,
            retry_base_delay_ms: retry.base_delay.as_millis() as u64,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub connect_timeout_secs: u64,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    pub zoom_factor: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        let limits = ViewLimits::default();
        Self {
            min_scale: limits.min_scale,
            max_scale: limits.max_scale,
            zoom_factor: limits.zoom_factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: super::config_directory().join("logs"),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl ConfigFile {
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            debounce: Duration::from_millis(self.render.debounce_ms),
            max_concurrent_fetches: self.render.max_concurrent_fetches,
            background: self.render.background,
        }
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            request_timeout: Duration::from_secs(self.network.timeout_secs),
            retry: RetryPolicy {
                max_retries: self.network.max_retries,
                base_delay: Duration::from_millis(self.network.retry_base_delay_ms),
            },
            user_agent: self.network.user_agent.clone(),
            db_connect_timeout: Duration::from_secs(self.database.connect_timeout_secs),
            db_max_connections: self.database.max_connections,
        }
    }

    pub fn view_limits(&self) -> ViewLimits {
        ViewLimits {
            min_scale: self.viewport.min_scale,
            max_scale: self.viewport.max_scale,
            zoom_factor: self.viewport.zoom_factor,
        }
    }
}
