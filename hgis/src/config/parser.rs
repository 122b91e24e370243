//! INI to [`ConfigFile`]. The one place key names map to fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Typed access to one INI section.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn number<T: FromStr>(&self, key: &str, expected: &str) -> Result<Option<T>, ConfigFileError> {
        match self.props.get(key) {
            None => Ok(None),
            Some(v) => v
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| invalid(self.name, key, v, format!("expected {}", expected))),
        }
    }

    fn text(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).map(str::trim).filter(|v| !v.is_empty())
    }
}

pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();
    let section = |name: &'static str| ini.section(Some(name)).map(|props| Section { name, props });

    if let Some(s) = section("render") {
        if let Some(v) = s.number("debounce_ms", "milliseconds")? {
            config.render.debounce_ms = v;
        }
        if let Some(v) = s.number::<usize>("max_concurrent_fetches", "a positive integer")? {
            if v == 0 {
                return Err(invalid("render", "max_concurrent_fetches", "0", "must be at least 1"));
            }
            config.render.max_concurrent_fetches = v;
        }
        if let Some(v) = s.text("background") {
            config.render.background = parse_colour(v).ok_or_else(|| {
                invalid("render", "background", v, "expected '#rrggbb' or '#rrggbbaa'")
            })?;
        }
        if let Some(v) = s.number::<u32>("default_width", "a pixel count")? {
            config.render.default_width = positive("render", "default_width", v)?;
        }
        if let Some(v) = s.number::<u32>("default_height", "a pixel count")? {
            config.render.default_height = positive("render", "default_height", v)?;
        }
    }

    if let Some(s) = section("cache") {
        if let Some(v) = s.text("memory_size") {
            config.cache.memory_size = parse_size(v).map_err(|_| {
                invalid("cache", "memory_size", v, "expected a size like '256MB' or '1GB'")
            })?;
        }
    }

    if let Some(s) = section("network") {
        if let Some(v) = s.number::<u64>("timeout_secs", "seconds")? {
            if v == 0 {
                return Err(invalid("network", "timeout_secs", "0", "must be at least 1"));
            }
            config.network.timeout_secs = v;
        }
        if let Some(v) = s.number("max_retries", "a retry count")? {
            config.network.max_retries = v;
        }
        if let Some(v) = s.number("retry_base_delay_ms", "milliseconds")? {
            config.network.retry_base_delay_ms = v;
        }
        if let Some(v) = s.text("user_agent") {
            config.network.user_agent = v.to_string();
        }
    }

    if let Some(s) = section("database") {
        if let Some(v) = s.number::<u64>("connect_timeout_secs", "seconds")? {
            if v == 0 {
                return Err(invalid("database", "connect_timeout_secs", "0", "must be at least 1"));
            }
            config.database.connect_timeout_secs = v;
        }
        if let Some(v) = s.number::<u32>("max_connections", "a connection count")? {
            config.database.max_connections = positive("database", "max_connections", v)?;
        }
    }

    if let Some(s) = section("viewport") {
        if let Some(v) = s.number("min_scale", "a scale denominator")? {
            config.viewport.min_scale = v;
        }
        if let Some(v) = s.number("max_scale", "a scale denominator")? {
            config.viewport.max_scale = v;
        }
        if let Some(v) = s.number("zoom_factor", "a number")? {
            config.viewport.zoom_factor = v;
        }
        let vp = &config.viewport;
        if !(vp.min_scale.is_finite() && vp.min_scale > 0.0) {
            return Err(invalid(
                "viewport",
                "min_scale",
                &vp.min_scale.to_string(),
                "must be positive",
            ));
        }
        if !(vp.max_scale.is_finite() && vp.max_scale > vp.min_scale) {
            return Err(invalid(
                "viewport",
                "max_scale",
                &vp.max_scale.to_string(),
                "must be greater than min_scale",
            ));
        }
        if !(vp.zoom_factor.is_finite() && vp.zoom_factor > 1.0) {
            return Err(invalid(
                "viewport",
                "zoom_factor",
                &vp.zoom_factor.to_string(),
                "must be greater than 1",
            ));
        }
    }

    if let Some(s) = section("logging") {
        if let Some(v) = s.text("directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = s.text("file") {
            config.logging.file = v.to_string();
        }
    }

    Ok(config)
}

fn positive(section: &str, key: &str, v: u32) -> Result<u32, ConfigFileError> {
    if v == 0 {
        Err(invalid(section, key, "0", "must be at least 1"))
    } else {
        Ok(v)
    }
}

/// `#rrggbb` (opaque) or `#rrggbbaa`.
pub(super) fn parse_colour(s: &str) -> Option<[u8; 4]> {
    let hex = s.trim().strip_prefix('#')?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Some([channel(0)?, channel(2)?, channel(4)?, alpha])
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
