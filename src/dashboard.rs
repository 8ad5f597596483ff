use crate::alerts::{evaluate, AlertCooldowns};
use crate::config::{ConfigError, Settings};
use crate::format::{format_metric, metric_severity, progress_severity, Severity};
use crate::notify::{Notification, Notifier};
use crate::snapshot::MetricKey;
use crate::source::bridge::{BridgeSource, HostChannel};
use crate::source::demo::DemoSource;
use crate::source::live::LiveSource;
use crate::source::{DataSource, SourceContext, SourceHandle, SourceMode, SourceState};
use reqwest::Client;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::info;

/// Composition root: owns the settings, the alert cooldowns and the single active source.
pub struct Dashboard {
    settings: Settings,
    client: Client,
    host: Arc<HostChannel>,
    display: Arc<watch::Sender<SourceState>>,
    notifier: Arc<dyn Notifier>,
    cooldowns: AlertCooldowns,
    active: Option<SourceHandle>,
    last_evaluated: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub mode: Option<SourceMode>,
    pub connected: bool,
    pub server_address: Option<String>,
    pub last_updated: Option<SystemTime>,
    pub is_loading: bool,
    pub banner: Option<Banner>,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    Connecting,
    /// Last known values stay on screen; retry and demo mode are offered.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub metric: MetricKey,
    pub title: &'static str,
    pub value: String,
    pub severity: Option<Severity>,
    pub progress: Option<(f64, Severity)>,
}

/// Operator commands read from the terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refetch,
    Switch(SourceMode),
    RefreshRate(u64),
    Server(String),
    Toggle(MetricKey),
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let head = parts.next().ok_or_else(|| "пустая команда".to_string())?;
        let arg = parts.next();
        match (head, arg) {
            ("r" | "refresh", None) => Ok(Self::Refetch),
            ("q" | "quit", None) => Ok(Self::Quit),
            ("live", None) => Ok(Self::Switch(SourceMode::Live)),
            ("demo", None) => Ok(Self::Switch(SourceMode::Demo)),
            ("bridge", None) => Ok(Self::Switch(SourceMode::Bridge)),
            ("rate", Some(ms)) => ms
                .parse()
                .map(Self::RefreshRate)
                .map_err(|_| format!("некорректная частота '{ms}'")),
            ("server", Some(addr)) => Ok(Self::Server(addr.to_string())),
            ("toggle", Some(metric)) => metric.parse().map(Self::Toggle),
            _ => Err(format!("неизвестная команда '{}'", line.trim())),
        }
    }
}

impl Dashboard {
    pub fn new(settings: Settings, client: Client, notifier: Arc<dyn Notifier>) -> Self {
        let (display, _) = watch::channel(SourceState::default());
        Self {
            settings,
            client,
            host: Arc::new(HostChannel::new()),
            display: Arc::new(display),
            notifier,
            cooldowns: AlertCooldowns::default(),
            active: None,
            last_evaluated: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<SourceState> {
        self.display.subscribe()
    }

    pub fn active_mode(&self) -> Option<SourceMode> {
        self.active.as_ref().map(SourceHandle::mode)
    }

    pub async fn start(&mut self) {
        self.activate(self.settings.mode).await;
    }

    /// Stops the current source before the next one may write to the display.
    pub async fn activate(&mut self, mode: SourceMode) {
        if let Some(handle) = self.active.take() {
            handle.stop().await;
        }
        self.settings.mode = mode;
        self.last_evaluated = None;
        self.display.send_replace(SourceState::default());

        let source = self.build_source(mode);
        let ctx = SourceContext {
            sink: self.display.clone(),
            notifier: self.notifier.clone(),
        };
        info!(
            mode = %source.kind(),
            refresh_ms = self.settings.refresh_rate_ms,
            "активирован источник данных"
        );
        self.active = Some(source.start(ctx));
    }

    fn build_source(&self, mode: SourceMode) -> Box<dyn DataSource> {
        let period = self.settings.refresh_period();
        match mode {
            SourceMode::Live => Box::new(LiveSource::new(
                self.client.clone(),
                self.settings.server_address.clone(),
                period,
            )),
            SourceMode::Demo => Box::new(DemoSource::new(period)),
            SourceMode::Bridge => Box::new(BridgeSource::new(self.host.clone(), period)),
        }
    }

    pub fn refetch(&self) {
        if let Some(handle) = &self.active {
            handle.refetch();
        }
    }

    pub async fn enter_demo_mode(&mut self) {
        self.activate(SourceMode::Demo).await;
    }

    /// Applies a settings save. The source is recreated only when connection
    /// parameters changed.
    pub async fn save_settings(&mut self, new: Settings) -> Result<(), ConfigError> {
        let new = new.normalized();
        new.validate()?;

        let restart = new.mode != self.settings.mode
            || new.server_address != self.settings.server_address
            || new.refresh_rate_ms != self.settings.refresh_rate_ms;
        self.settings = new;
        if restart && self.active.is_some() {
            self.activate(self.settings.mode).await;
        }
        self.notifier.notify(Notification::normal(
            "Настройки сохранены",
            "Параметры панели успешно обновлены.",
        ));
        Ok(())
    }

    /// Applies an operator command; returns `false` when the dashboard should exit.
    pub async fn apply(&mut self, command: Command) -> Result<bool, ConfigError> {
        match command {
            Command::Refetch => self.refetch(),
            Command::Switch(SourceMode::Demo) => self.enter_demo_mode().await,
            Command::Switch(mode) => self.activate(mode).await,
            Command::RefreshRate(ms) => {
                let mut next = self.settings.clone();
                next.refresh_rate_ms = ms;
                self.save_settings(next).await?;
            }
            Command::Server(addr) => {
                let mut next = self.settings.clone();
                next.server_address = addr;
                self.save_settings(next).await?;
            }
            Command::Toggle(metric) => {
                let mut next = self.settings.clone();
                next.selected_metrics.toggle(metric);
                self.save_settings(next).await?;
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    pub async fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop().await;
        }
    }

    /// Runs alerts on a fresh snapshot and builds the view for the current state.
    pub fn on_update(&mut self, state: &SourceState, now_ms: i64) -> DashboardView {
        if let Some(data) = &state.data {
            if state.last_updated != self.last_evaluated {
                self.last_evaluated = state.last_updated;
                for event in evaluate(data, &self.settings.alerts, &mut self.cooldowns, now_ms) {
                    info!(metric = %event.metric.key(), value = event.value, threshold = event.threshold, "порог превышен");
                    self.notifier.notify(event.to_notification());
                }
            }
        }
        build_view(&self.settings, self.active_mode(), state)
    }
}

pub fn build_view(
    settings: &Settings,
    mode: Option<SourceMode>,
    state: &SourceState,
) -> DashboardView {
    let connected = !state.is_error && state.data.is_some();
    let banner = if state.is_error {
        Some(Banner::Disconnected)
    } else if state.data.is_none() {
        Some(Banner::Connecting)
    } else {
        None
    };

    let cards = state
        .data
        .as_ref()
        .map(|data| {
            settings
                .selected_metrics
                .enabled()
                .into_iter()
                .map(|metric| {
                    let value = data.value(metric);
                    let progress = match metric {
                        MetricKey::CpuUsage | MetricKey::GpuUsage => data
                            .numeric(metric)
                            .map(|v| (v.clamp(0.0, 100.0), progress_severity(v))),
                        _ => None,
                    };
                    Card {
                        metric,
                        title: metric.title(),
                        value: format_metric(metric, value),
                        severity: metric_severity(metric, value),
                        progress,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    DashboardView {
        mode,
        connected,
        server_address: (mode == Some(SourceMode::Live) && connected)
            .then(|| settings.server_address.clone()),
        last_updated: state.last_updated,
        is_loading: state.is_loading,
        banner,
        cards,
    }
}

pub fn render_text(view: &DashboardView) -> String {
    let mut out = String::new();
    let mode = view.mode.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string());
    let status = if view.connected { "подключено" } else { "отключено" };
    let updated = view
        .last_updated
        .map(|t| humantime::format_rfc3339_seconds(t).to_string())
        .unwrap_or_else(|| "никогда".to_string());
    let _ = write!(out, "[{mode}] {status}");
    if let Some(addr) = &view.server_address {
        let _ = write!(out, " {addr}");
    }
    let _ = writeln!(
        out,
        " | последнее обновление: {updated}{}",
        if view.is_loading { " ..." } else { "" }
    );

    match view.banner {
        Some(Banner::Connecting) => {
            let _ = writeln!(out, "Подключение к серверу...");
        }
        Some(Banner::Disconnected) => {
            let _ = writeln!(
                out,
                "Не удалось подключиться к серверу. Команды: 'r' повторить, 'demo' демо-режим."
            );
        }
        None => {}
    }

    for card in &view.cards {
        let _ = write!(out, "{:<24} {:>12}", card.title, card.value);
        if let Some(severity) = card.severity {
            let _ = write!(out, "  [{}]", severity.label());
        }
        if let Some((pct, _)) = card.progress {
            let filled = (pct / 10.0).round() as usize;
            let _ = write!(out, "  {}{}", "#".repeat(filled), ".".repeat(10 - filled));
        }
        out.push('\n');
    }
    out
}
