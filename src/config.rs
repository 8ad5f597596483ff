use crate::alerts::AlertThresholds;
use crate::snapshot::MetricKey;
use crate::source::SourceMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const MIN_REFRESH_RATE_MS: u64 = 500;
pub const MAX_REFRESH_RATE_MS: u64 = 5000;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub dashboard: Settings,
    #[serde(default)]
    pub serve: ServeConfig,
}

/// User-facing dashboard settings. Replaced only through an explicit save.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_server_address")]
    pub server_address: String,
    #[serde(default = "default_refresh_rate_ms")]
    pub refresh_rate_ms: u64,
    #[serde(default = "default_mode")]
    pub mode: SourceMode,
    #[serde(default)]
    pub selected_metrics: SelectedMetrics,
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(default)]
    pub alerts: AlertThresholds,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SelectedMetrics {
    #[serde(default = "enabled")]
    pub cpu_temp: bool,
    #[serde(default = "enabled")]
    pub gpu_temp: bool,
    #[serde(default = "enabled")]
    pub cpu_usage: bool,
    #[serde(default = "enabled")]
    pub gpu_usage: bool,
    #[serde(default = "enabled")]
    pub ram_usage: bool,
    #[serde(default = "enabled")]
    pub fan_speed: bool,
    #[serde(default = "enabled")]
    pub power_draw: bool,
    #[serde(default = "enabled")]
    pub uptime: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Appearance {
    #[serde(default = "default_theme")]
    pub theme: Theme,
    #[serde(default = "default_accent_color")]
    pub accent_color: String,
    #[serde(default)]
    pub custom_background: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServeConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            refresh_rate_ms: default_refresh_rate_ms(),
            mode: default_mode(),
            selected_metrics: SelectedMetrics::default(),
            appearance: Appearance::default(),
            alerts: AlertThresholds::default(),
        }
    }
}

impl Default for SelectedMetrics {
    fn default() -> Self {
        Self {
            cpu_temp: true,
            gpu_temp: true,
            cpu_usage: true,
            gpu_usage: true,
            ram_usage: true,
            fan_speed: true,
            power_draw: true,
            uptime: true,
        }
    }
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            accent_color: default_accent_color(),
            custom_background: None,
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl SelectedMetrics {
    fn slot(&mut self, key: MetricKey) -> &mut bool {
        match key {
            MetricKey::CpuTemp => &mut self.cpu_temp,
            MetricKey::GpuTemp => &mut self.gpu_temp,
            MetricKey::CpuUsage => &mut self.cpu_usage,
            MetricKey::GpuUsage => &mut self.gpu_usage,
            MetricKey::RamUsage => &mut self.ram_usage,
            MetricKey::FanSpeed => &mut self.fan_speed,
            MetricKey::PowerDraw => &mut self.power_draw,
            MetricKey::Uptime => &mut self.uptime,
        }
    }

    pub fn is_enabled(&self, key: MetricKey) -> bool {
        match key {
            MetricKey::CpuTemp => self.cpu_temp,
            MetricKey::GpuTemp => self.gpu_temp,
            MetricKey::CpuUsage => self.cpu_usage,
            MetricKey::GpuUsage => self.gpu_usage,
            MetricKey::RamUsage => self.ram_usage,
            MetricKey::FanSpeed => self.fan_speed,
            MetricKey::PowerDraw => self.power_draw,
            MetricKey::Uptime => self.uptime,
        }
    }

    #[cfg(test)]
    pub fn set(&mut self, key: MetricKey, enabled: bool) {
        *self.slot(key) = enabled;
    }

    pub fn toggle(&mut self, key: MetricKey) {
        let slot = self.slot(key);
        *slot = !*slot;
    }

    pub fn enabled(&self) -> Vec<MetricKey> {
        MetricKey::ALL
            .into_iter()
            .filter(|key| self.is_enabled(*key))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let mut cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.dashboard = cfg.dashboard.normalized();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dashboard.validate()?;
        validate_serve(&self.serve)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

impl Settings {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms)
    }

    /// Clamps the refresh rate into the supported range.
    pub fn normalized(mut self) -> Self {
        let clamped = self
            .refresh_rate_ms
            .clamp(MIN_REFRESH_RATE_MS, MAX_REFRESH_RATE_MS);
        if clamped != self.refresh_rate_ms {
            warn!(
                requested_ms = self.refresh_rate_ms,
                applied_ms = clamped,
                "частота обновления вне диапазона, значение ограничено"
            );
            self.refresh_rate_ms = clamped;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == SourceMode::Live && self.server_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dashboard.server_address обязателен в режиме live".to_string(),
            ));
        }
        if !(MIN_REFRESH_RATE_MS..=MAX_REFRESH_RATE_MS).contains(&self.refresh_rate_ms) {
            return Err(ConfigError::Validation(format!(
                "dashboard.refresh_rate_ms должно быть в диапазоне {MIN_REFRESH_RATE_MS}..{MAX_REFRESH_RATE_MS}"
            )));
        }
        if !is_hex_color(&self.appearance.accent_color) {
            return Err(ConfigError::Validation(format!(
                "dashboard.appearance.accent_color '{}' должен иметь вид #RRGGBB",
                self.appearance.accent_color
            )));
        }
        validate_thresholds(&self.alerts)
    }
}

fn validate_thresholds(alerts: &AlertThresholds) -> Result<(), ConfigError> {
    for (name, value) in [
        ("cpu_usage", alerts.cpu_usage),
        ("gpu_usage", alerts.gpu_usage),
        ("ram_usage", alerts.ram_usage),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "dashboard.alerts.{name} должно быть в диапазоне 0..100"
            )));
        }
    }
    for (name, value) in [("cpu_temp", alerts.cpu_temp), ("gpu_temp", alerts.gpu_temp)] {
        if value <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "dashboard.alerts.{name} должно быть > 0"
            )));
        }
    }
    Ok(())
}

fn validate_serve(cfg: &ServeConfig) -> Result<(), ConfigError> {
    if SocketAddr::from_str(&cfg.listen).is_err() {
        return Err(ConfigError::Validation(
            "serve.listen должно быть корректным адресом host:port".to_string(),
        ));
    }
    if cfg.interval_secs < 1 {
        return Err(ConfigError::Validation(
            "serve.interval_secs должно быть >= 1".to_string(),
        ));
    }
    Ok(())
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn default_server_address() -> String {
    "http://192.168.1.100:5000/data".to_string()
}

const fn default_refresh_rate_ms() -> u64 {
    1000
}

const fn default_mode() -> SourceMode {
    SourceMode::Live
}

const fn enabled() -> bool {
    true
}

const fn default_theme() -> Theme {
    Theme::Dark
}

fn default_accent_color() -> String {
    "#1ABC9C".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

const fn default_interval_secs() -> u64 {
    1
}
