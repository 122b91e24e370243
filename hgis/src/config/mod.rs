//! User configuration.
//!
//! Settings are read from `~/.hgis/config.ini`. Every key is optional: the
//! parser starts from [`ConfigFile::default`] and overlays whatever the file
//! sets, so an empty or missing file yields the built-in defaults.
//!
//! ```text
//! [render]    debounce_ms, max_concurrent_fetches, background, default_width, default_height
//! [cache]     memory_size
//! [network]   timeout_secs, max_retries, retry_base_delay_ms, user_agent
//! [database]  connect_timeout_secs, max_connections
//! [viewport]  min_scale, max_scale, zoom_factor
//! [logging]   directory, file
//! ```

mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CacheConfig, ConfigFile, DatabaseConfig, LoggingConfig, NetworkConfig, RenderConfig,
    ViewportConfig, DEFAULT_LOG_FILE, DEFAULT_MEMORY_CACHE_SIZE,
};
pub use size::{format_size, parse_size, SizeParseError};
