//! INI configuration file.
//!
//! ```text
//! [realtime]
//! url = wss://api.example.org/ws
//! mode = schematic
//! projection = EPSG:3857
//! ping_interval_ms = 10000
//! reconnect_timeout_ms = 100
//! reconnect = true
//! buffer_dx = 100
//! buffer_dy = 100
//! max_departure_age_min = 30
//! sort_by_min_arrival_time = false
//!
//! [render]
//! live = true
//! speed = 1.0
//! min_tick_ms = 25
//! pixel_ratio = 1.0
//!
//! [logging]
//! level = info
//! file = /var/log/livetrack/client.log
//! ansi = true
//! ```
//!
//! Every key is optional. Unknown keys are ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::realtime::RealtimeConfig;
use crate::render::RenderConfig;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid INI syntax: {0}")]
    Parse(String),

    #[error("invalid value for [{section}] {key}: '{value}'")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Everything the crate can be configured with.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveTrackConfig {
    pub realtime: RealtimeConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

impl LiveTrackConfig {
    /// `<config dir>/livetrack/config.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("livetrack").join("config.ini"))
    }

    /// Read and parse `path`.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parse INI text.
    pub fn from_ini_str(text: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("realtime")) {
            apply_realtime(&mut config.realtime, Section::new("realtime", section))?;
        }
        if let Some(section) = ini.section(Some("render")) {
            apply_render(&mut config.render, Section::new("render", section))?;
        }
        if let Some(section) = ini.section(Some("logging")) {
            apply_logging(&mut config.logging, Section::new("logging", section));
        }

        Ok(config)
    }
}

fn apply_realtime(config: &mut RealtimeConfig, section: Section<'_>) -> ConfigResult<()> {
    if let Some(url) = section.text("url") {
        config.url = url.to_string();
    }
    if let Some(mode) = section.parse("mode")? {
        config.mode = mode;
    }
    if let Some(projection) = section.text("projection") {
        config.projection = Some(projection.to_string());
    }
    if let Some(ms) = section.parse::<u64>("ping_interval_ms")? {
        config.ping_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = section.parse::<u64>("reconnect_timeout_ms")? {
        config.reconnect_timeout = Duration::from_millis(ms);
    }
    if let Some(reconnect) = section.flag("reconnect")? {
        config.reconnect = reconnect;
    }

    let dx = section.parse::<f64>("buffer_dx")?;
    let dy = section.parse::<f64>("buffer_dy")?;
    if dx.is_some() || dy.is_some() {
        config.buffer = Some((dx.unwrap_or(0.0), dy.unwrap_or(0.0)));
    }

    if let Some(minutes) = section.parse("max_departure_age_min")? {
        config.max_departure_age_min = minutes;
    }
    if let Some(sort) = section.flag("sort_by_min_arrival_time")? {
        config.sort_by_min_arrival_time = sort;
    }
    Ok(())
}

fn apply_render(config: &mut RenderConfig, section: Section<'_>) -> ConfigResult<()> {
    if let Some(live) = section.flag("live")? {
        config.live = live;
    }
    if let Some(speed) = section.parse("speed")? {
        config.speed = speed;
    }
    if let Some(ms) = section.parse::<u64>("min_tick_ms")? {
        config.min_tick = Duration::from_millis(ms);
    }
    if let Some(ratio) = section.parse("pixel_ratio")? {
        config.pixel_ratio = ratio;
    }
    Ok(())
}

fn apply_logging(config: &mut LoggingConfig, section: Section<'_>) {
    if let Some(level) = section.text("level") {
        config.level = level.to_string();
    }
    if let Some(file) = section.text("file") {
        config.file = Some(PathBuf::from(file));
    }
    if let Some(ansi) = section.text("ansi").and_then(parse_flag) {
        config.ansi = ansi;
    }
}

/// One INI section with typed accessors.
struct Section<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, properties: &'a Properties) -> Self {
        Self { name, properties }
    }

    /// Trimmed value; blank counts as unset.
    fn text(&self, key: &str) -> Option<&'a str> {
        self.properties
            .get(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &'static str) -> ConfigResult<Option<T>> {
        self.text(key)
            .map(|value| value.parse().map_err(|_| self.invalid(key, value)))
            .transpose()
    }

    fn flag(&self, key: &'static str) -> ConfigResult<Option<bool>> {
        self.text(key)
            .map(|value| parse_flag(value).ok_or_else(|| self.invalid(key, value)))
            .transpose()
    }

    fn invalid(&self, key: &'static str, value: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name,
            key,
            value: value.to_string(),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
