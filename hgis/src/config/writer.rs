//! [`ConfigFile`] to commented INI text.

use super::settings::ConfigFile;
use super::size::format_size;

fn colour(rgba: [u8; 4]) -> String {
    let [r, g, b, a] = rgba;
    if a == 255 {
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
    }
}

pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[render]
; Quiet period before a burst of redraw requests is drawn
debounce_ms = {debounce_ms}
; Layer fetches allowed in flight at once
max_concurrent_fetches = {max_concurrent_fetches}
; Map background, #rrggbb or #rrggbbaa
background = {background}
; Image size used by `hgis render` when none is given
default_width = {default_width}
default_height = {default_height}

[cache]
; Memory budget for fetched features and tiles, shared by all layers
memory_size = {memory_size}

[network]
timeout_secs = {timeout_secs}
; Retries after the first attempt for service and database layers (0 disables)
max_retries = {max_retries}
; First backoff delay, doubled on every retry
retry_base_delay_ms = {retry_base_delay_ms}
user_agent = {user_agent}

[database]
connect_timeout_secs = {connect_timeout_secs}
; Pool size per database connection string
max_connections = {max_connections}

[viewport]
; Scale denominators the interactive zoom is clamped to
min_scale = {min_scale}
max_scale = {max_scale}
zoom_factor = {zoom_factor}

[logging]
directory = {log_dir}
file = {log_file}
"#,
        debounce_ms = config.render.debounce_ms,
        max_concurrent_fetches = config.render.max_concurrent_fetches,
        background = colour(config.render.background),
        default_width = config.render.default_width,
        default_height = config.render.default_height,
        memory_size = format_size(config.cache.memory_size),
        timeout_secs = config.network.timeout_secs,
        max_retries = config.network.max_retries,
        retry_base_delay_ms = config.network.retry_base_delay_ms,
        user_agent = config.network.user_agent,
        connect_timeout_secs = config.database.connect_timeout_secs,
        max_connections = config.database.max_connections,
        min_scale = config.viewport.min_scale,
        max_scale = config.viewport.max_scale,
        zoom_factor = config.viewport.zoom_factor,
        log_dir = config.logging.directory.display(),
        log_file = config.logging.file,
    )
}
