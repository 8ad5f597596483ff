use crate::snapshot::{MetricKey, MetricValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "норма",
            Severity::Medium => "повышено",
            Severity::High => "высоко",
        }
    }
}

pub fn temperature_severity(temp: f64) -> Severity {
    if temp < 50.0 {
        Severity::Low
    } else if temp < 70.0 {
        Severity::Medium
    } else {
        Severity::High
    }
}

pub fn usage_severity(usage: f64) -> Severity {
    if usage < 30.0 {
        Severity::Low
    } else if usage < 70.0 {
        Severity::Medium
    } else {
        Severity::High
    }
}

/// Progress bars share the usage cut-offs.
pub fn progress_severity(value: f64) -> Severity {
    usage_severity(value)
}

/// Severity bucket for a card, `None` for metrics that are not color-coded.
pub fn metric_severity(key: MetricKey, value: MetricValue<'_>) -> Option<Severity> {
    match value {
        MetricValue::Number(v) if key.is_temperature() => Some(temperature_severity(v)),
        MetricValue::Number(v) if key.is_usage() => Some(usage_severity(v)),
        _ => None,
    }
}

pub fn format_temp(temp: f64) -> String {
    format!("{}°C", number(temp))
}

pub fn format_percentage(percentage: f64) -> String {
    format!("{}%", number(percentage))
}

pub fn format_fan_speed(speed: f64) -> String {
    format!("{} RPM", number(speed))
}

pub fn format_metric(key: MetricKey, value: MetricValue<'_>) -> String {
    match value {
        MetricValue::Text(s) => s.to_string(),
        MetricValue::Number(v) if key.is_temperature() => format_temp(v),
        MetricValue::Number(v) if key.is_usage() => format_percentage(v),
        MetricValue::Number(v) if key == MetricKey::FanSpeed => format_fan_speed(v),
        MetricValue::Number(v) => number(v),
    }
}

pub fn format_uptime(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{hours}:{mins:02}:{secs:02}")
}

pub fn parse_uptime(text: &str) -> Option<u64> {
    let mut parts = text.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let mins: u64 = parts.next()?.parse().ok()?;
    let secs: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || mins >= 60 || secs >= 60 {
        return None;
    }
    Some(hours * 3600 + mins * 60 + secs)
}

fn number(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() {
        format!("{}", v as i64)
    } else {
        format!("{v:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_boundaries() {
        assert_eq!(temperature_severity(49.0), Severity::Low);
        assert_eq!(temperature_severity(49.9), Severity::Low);
        assert_eq!(temperature_severity(50.0), Severity::Medium);
        assert_eq!(temperature_severity(69.0), Severity::Medium);
        assert_eq!(temperature_severity(70.0), Severity::High);
    }

    #[test]
    fn usage_boundaries() {
        assert_eq!(usage_severity(29.0), Severity::Low);
        assert_eq!(usage_severity(30.0), Severity::Medium);
        assert_eq!(usage_severity(69.0), Severity::Medium);
        assert_eq!(usage_severity(70.0), Severity::High);
        assert_eq!(progress_severity(100.0), Severity::High);
    }

    #[test]
    fn formats_units_and_passes_strings_through() {
        assert_eq!(format_metric(MetricKey::CpuTemp, MetricValue::Number(55.0)), "55°C");
        assert_eq!(format_metric(MetricKey::GpuUsage, MetricValue::Number(42.5)), "42.5%");
        assert_eq!(format_metric(MetricKey::FanSpeed, MetricValue::Number(1200.0)), "1200 RPM");
        assert_eq!(format_metric(MetricKey::RamUsage, MetricValue::Text("8.1 GB")), "8.1 GB");
        assert_eq!(format_metric(MetricKey::PowerDraw, MetricValue::Text("123 W")), "123 W");
    }

    #[test]
    fn string_ram_is_not_color_coded() {
        assert_eq!(metric_severity(MetricKey::RamUsage, MetricValue::Text("8.1 GB")), None);
        assert_eq!(
            metric_severity(MetricKey::RamUsage, MetricValue::Number(80.0)),
            Some(Severity::High)
        );
        assert_eq!(metric_severity(MetricKey::FanSpeed, MetricValue::Number(3000.0)), None);
    }

    #[test]
    fn uptime_text() {
        assert_eq!(format_uptime(2 * 3600 + 15 * 60 + 47), "2:15:47");
        assert_eq!(format_uptime(59), "0:00:59");
        assert_eq!(parse_uptime("2:15:47"), Some(8147));
        assert_eq!(parse_uptime("2:75:00"), None);
        assert_eq!(parse_uptime("abc"), None);
    }
}
