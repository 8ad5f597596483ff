use crate::notify::Notification;
use crate::snapshot::{HardwareSnapshot, MetricKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ALERT_COOLDOWN_MS: i64 = 60_000;

/// The subset of metrics that carry a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertMetric {
    CpuTemp,
    GpuTemp,
    CpuUsage,
    GpuUsage,
    RamUsage,
}

impl AlertMetric {
    /// Evaluation order.
    pub const ALL: [AlertMetric; 5] = [
        AlertMetric::CpuTemp,
        AlertMetric::GpuTemp,
        AlertMetric::CpuUsage,
        AlertMetric::GpuUsage,
        AlertMetric::RamUsage,
    ];

    pub fn key(self) -> MetricKey {
        match self {
            AlertMetric::CpuTemp => MetricKey::CpuTemp,
            AlertMetric::GpuTemp => MetricKey::GpuTemp,
            AlertMetric::CpuUsage => MetricKey::CpuUsage,
            AlertMetric::GpuUsage => MetricKey::GpuUsage,
            AlertMetric::RamUsage => MetricKey::RamUsage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlertThresholds {
    #[serde(default = "default_alerts_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cpu_temp_threshold")]
    pub cpu_temp: f64,
    #[serde(default = "default_gpu_temp_threshold")]
    pub gpu_temp: f64,
    #[serde(default = "default_usage_threshold")]
    pub cpu_usage: f64,
    #[serde(default = "default_usage_threshold")]
    pub gpu_usage: f64,
    #[serde(default = "default_usage_threshold")]
    pub ram_usage: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            enabled: default_alerts_enabled(),
            cpu_temp: default_cpu_temp_threshold(),
            gpu_temp: default_gpu_temp_threshold(),
            cpu_usage: default_usage_threshold(),
            gpu_usage: default_usage_threshold(),
            ram_usage: default_usage_threshold(),
        }
    }
}

impl AlertThresholds {
    pub fn threshold(&self, metric: AlertMetric) -> f64 {
        match metric {
            AlertMetric::CpuTemp => self.cpu_temp,
            AlertMetric::GpuTemp => self.gpu_temp,
            AlertMetric::CpuUsage => self.cpu_usage,
            AlertMetric::GpuUsage => self.gpu_usage,
            AlertMetric::RamUsage => self.ram_usage,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlertCooldowns {
    last_fired_ms: HashMap<AlertMetric, i64>,
}

impl AlertCooldowns {
    #[cfg(test)]
    pub fn last_fired(&self, key: AlertMetric) -> Option<i64> {
        self.last_fired_ms.get(&key).copied()
    }

    fn should_emit(&mut self, key: AlertMetric, now_ms: i64) -> bool {
        if let Some(last) = self.last_fired_ms.get(&key) {
            if now_ms - *last <= ALERT_COOLDOWN_MS {
                return false;
            }
        }
        self.last_fired_ms.insert(key, now_ms);
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub metric: AlertMetric,
    pub value: f64,
    pub threshold: f64,
}

impl AlertEvent {
    pub fn to_notification(&self) -> Notification {
        let (title, subject, unit) = match self.metric {
            AlertMetric::CpuTemp => ("⚠ Температура CPU", "Температура CPU достигла", "°C"),
            AlertMetric::GpuTemp => ("⚠ Температура GPU", "Температура GPU достигла", "°C"),
            AlertMetric::CpuUsage => ("⚠ Загрузка CPU", "Загрузка CPU достигла", "%"),
            AlertMetric::GpuUsage => ("⚠ Загрузка GPU", "Загрузка GPU достигла", "%"),
            AlertMetric::RamUsage => ("⚠ Использование RAM", "Использование RAM достигло", "%"),
        };
        Notification::destructive(
            title,
            format!(
                "{subject} {}{unit} (порог {}{unit})",
                self.value, self.threshold
            ),
        )
    }
}

/// Checks a snapshot against the thresholds. Preformatted RAM readings carry no
/// percentage and are never alerted on.
pub fn evaluate(
    snapshot: &HardwareSnapshot,
    thresholds: &AlertThresholds,
    cooldowns: &mut AlertCooldowns,
    now_ms: i64,
) -> Vec<AlertEvent> {
    if !thresholds.enabled {
        return Vec::new();
    }

    let mut out = Vec::new();
    for metric in AlertMetric::ALL {
        let Some(value) = snapshot.numeric(metric.key()) else {
            continue;
        };
        let threshold = thresholds.threshold(metric);
        if value >= threshold && cooldowns.should_emit(metric, now_ms) {
            out.push(AlertEvent {
                metric,
                value,
                threshold,
            });
        }
    }
    out
}

const fn default_alerts_enabled() -> bool {
    true
}

const fn default_cpu_temp_threshold() -> f64 {
    85.0
}

const fn default_gpu_temp_threshold() -> f64 {
    80.0
}

const fn default_usage_threshold() -> f64 {
    90.0
}
