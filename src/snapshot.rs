use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One complete telemetry reading. Replaced wholesale on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSnapshot {
    pub cpu_temp: f64,
    pub gpu_temp: f64,
    pub ram_usage: RamUsage,
    pub fan_speed: f64,
    pub uptime: String,
    pub power_draw: String,
    pub cpu_usage: f64,
    pub gpu_usage: f64,
}

/// Servers report RAM either as a percentage or as a ready-made string ("12.4 GB").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RamUsage {
    Numeric(f64),
    Preformatted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    CpuTemp,
    GpuTemp,
    CpuUsage,
    GpuUsage,
    RamUsage,
    FanSpeed,
    PowerDraw,
    Uptime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue<'a> {
    Number(f64),
    Text(&'a str),
}

impl MetricKey {
    /// Display order of the dashboard cards.
    pub const ALL: [MetricKey; 8] = [
        MetricKey::CpuTemp,
        MetricKey::GpuTemp,
        MetricKey::CpuUsage,
        MetricKey::GpuUsage,
        MetricKey::RamUsage,
        MetricKey::FanSpeed,
        MetricKey::PowerDraw,
        MetricKey::Uptime,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKey::CpuTemp => "cpu_temp",
            MetricKey::GpuTemp => "gpu_temp",
            MetricKey::CpuUsage => "cpu_usage",
            MetricKey::GpuUsage => "gpu_usage",
            MetricKey::RamUsage => "ram_usage",
            MetricKey::FanSpeed => "fan_speed",
            MetricKey::PowerDraw => "power_draw",
            MetricKey::Uptime => "uptime",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MetricKey::CpuTemp => "Температура CPU",
            MetricKey::GpuTemp => "Температура GPU",
            MetricKey::CpuUsage => "Загрузка CPU",
            MetricKey::GpuUsage => "Загрузка GPU",
            MetricKey::RamUsage => "Использование RAM",
            MetricKey::FanSpeed => "Скорость вентиляторов",
            MetricKey::PowerDraw => "Потребление",
            MetricKey::Uptime => "Время работы",
        }
    }

    pub fn is_temperature(self) -> bool {
        matches!(self, MetricKey::CpuTemp | MetricKey::GpuTemp)
    }

    pub fn is_usage(self) -> bool {
        matches!(
            self,
            MetricKey::CpuUsage | MetricKey::GpuUsage | MetricKey::RamUsage
        )
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("неизвестная метрика '{s}'"))
    }
}

impl HardwareSnapshot {
    pub fn value(&self, key: MetricKey) -> MetricValue<'_> {
        match key {
            MetricKey::CpuTemp => MetricValue::Number(self.cpu_temp),
            MetricKey::GpuTemp => MetricValue::Number(self.gpu_temp),
            MetricKey::CpuUsage => MetricValue::Number(self.cpu_usage),
            MetricKey::GpuUsage => MetricValue::Number(self.gpu_usage),
            MetricKey::RamUsage => match &self.ram_usage {
                RamUsage::Numeric(v) => MetricValue::Number(*v),
                RamUsage::Preformatted(s) => MetricValue::Text(s),
            },
            MetricKey::FanSpeed => MetricValue::Number(self.fan_speed),
            MetricKey::PowerDraw => MetricValue::Text(&self.power_draw),
            MetricKey::Uptime => MetricValue::Text(&self.uptime),
        }
    }

    /// Numeric reading of a metric, `None` for string-only fields.
    pub fn numeric(&self, key: MetricKey) -> Option<f64> {
        match self.value(key) {
            MetricValue::Number(v) => Some(v),
            MetricValue::Text(_) => None,
        }
    }
}
