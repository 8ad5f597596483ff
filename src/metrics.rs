use crate::snapshot::{HardwareSnapshot, MetricKey};
use prometheus::core::Collector;
use prometheus::{opts, Counter, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub hw_temperature_celsius: GaugeVec,
    pub hw_usage_percent: GaugeVec,
    pub hw_fan_speed_rpm: Gauge,
    pub hw_power_draw_watts: Gauge,
    pub hw_uptime_seconds: Gauge,
    pub hw_scrape_count_total: Counter,
    pub hw_data_requests_total: Counter,
    pub hw_last_collect_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let hw_temperature_celsius = GaugeVec::new(
            opts!("hw_temperature_celsius", "Temperature by device in Celsius"),
            &["device"],
        )?;
        let hw_usage_percent = GaugeVec::new(
            opts!("hw_usage_percent", "Utilization by resource in percent (0..100)"),
            &["resource"],
        )?;
        let hw_fan_speed_rpm = Gauge::with_opts(opts!("hw_fan_speed_rpm", "Fan speed in RPM"))?;
        let hw_power_draw_watts = Gauge::with_opts(opts!(
            "hw_power_draw_watts",
            "Reported power draw in watts, 0 when unknown"
        ))?;
        let hw_uptime_seconds =
            Gauge::with_opts(opts!("hw_uptime_seconds", "Host uptime in seconds"))?;
        let hw_scrape_count_total = Counter::with_opts(opts!(
            "hw_scrape_count_total",
            "Number of /metrics scrapes served"
        ))?;
        let hw_data_requests_total = Counter::with_opts(opts!(
            "hw_data_requests_total",
            "Number of /data snapshots served"
        ))?;
        let hw_last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "hw_last_collect_timestamp_seconds",
            "Unix time of the last successful collection"
        ))?;

        register(&registry, &hw_temperature_celsius)?;
        register(&registry, &hw_usage_percent)?;
        register(&registry, &hw_fan_speed_rpm)?;
        register(&registry, &hw_power_draw_watts)?;
        register(&registry, &hw_uptime_seconds)?;
        register(&registry, &hw_scrape_count_total)?;
        register(&registry, &hw_data_requests_total)?;
        register(&registry, &hw_last_collect_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            hw_temperature_celsius,
            hw_usage_percent,
            hw_fan_speed_rpm,
            hw_power_draw_watts,
            hw_uptime_seconds,
            hw_scrape_count_total,
            hw_data_requests_total,
            hw_last_collect_timestamp_seconds,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &HardwareSnapshot) {
        self.hw_temperature_celsius
            .with_label_values(&["cpu"])
            .set(snapshot.cpu_temp);
        self.hw_temperature_celsius
            .with_label_values(&["gpu"])
            .set(snapshot.gpu_temp);
        self.hw_usage_percent
            .with_label_values(&["cpu"])
            .set(snapshot.cpu_usage);
        self.hw_usage_percent
            .with_label_values(&["gpu"])
            .set(snapshot.gpu_usage);
        // preformatted RAM strings carry no percentage
        if let Some(ram) = snapshot.numeric(MetricKey::RamUsage) {
            self.hw_usage_percent.with_label_values(&["ram"]).set(ram);
        }
        self.hw_fan_speed_rpm.set(snapshot.fan_speed);
        self.hw_power_draw_watts
            .set(leading_number(&snapshot.power_draw).unwrap_or(0.0));
        if let Some(secs) = crate::format::parse_uptime(&snapshot.uptime) {
            self.hw_uptime_seconds.set(secs as f64);
        }
        self.hw_last_collect_timestamp_seconds.set(now_unix() as f64);
    }

    pub fn inc_scrape_count(&self) {
        self.hw_scrape_count_total.inc();
    }

    pub fn inc_data_requests(&self) {
        self.hw_data_requests_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn leading_number(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
