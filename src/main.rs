mod alerts;
mod collectors;
mod config;
mod dashboard;
mod format;
mod http;
mod metrics;
mod notify;
mod snapshot;
mod source;

use axum::serve;
use clap::{Parser, Subcommand};
use collectors::collect_hardware;
use config::{Config, ConfigError, ServeConfig, Settings};
use dashboard::{render_text, Command, Dashboard};
use http::SharedSnapshot;
use metrics::Metrics;
use notify::{LatestNotifier, Notifier, TracingNotifier};
use reqwest::Client;
use source::SourceMode;
use std::io::{ErrorKind, IsTerminal};
use sysinfo::SystemExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hwdash")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml", global = true)]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Overrides `dashboard.mode`.
    #[arg(long, value_enum)]
    mode: Option<SourceMode>,
    /// Overrides `dashboard.server_address`.
    #[arg(long)]
    server: Option<String>,
    /// Overrides `dashboard.refresh_rate_ms`.
    #[arg(long)]
    refresh_ms: Option<u64>,
    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Mode {
    /// Terminal dashboard (default).
    Run,
    /// Local telemetry endpoint the live source can poll.
    Serve,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Mode::Run) {
        Mode::Run => {
            let settings = match apply_overrides(cfg.dashboard, &cli) {
                Ok(settings) => settings,
                Err(err) => {
                    error!(error = %err, "некорректные параметры запуска");
                    std::process::exit(1);
                }
            };
            run_dashboard(settings).await;
        }
        Mode::Serve => run_serve(cfg.serve).await,
    }
}

fn load_config(path: &str) -> Result<Config, ConfigError> {
    match Config::load_from_file(path) {
        Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
            info!(path, "файл конфигурации не найден, используются значения по умолчанию");
            Ok(Config::default())
        }
        other => other,
    }
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Result<Settings, ConfigError> {
    if let Some(mode) = cli.mode {
        settings.mode = mode;
    }
    if let Some(server) = &cli.server {
        settings.server_address = server.clone();
    }
    if let Some(ms) = cli.refresh_ms {
        settings.refresh_rate_ms = ms;
    }
    let settings = settings.normalized();
    settings.validate()?;
    Ok(settings)
}

async fn run_dashboard(settings: Settings) {
    let client = Client::builder()
        .user_agent("hwdash/0.1.0")
        .build()
        .unwrap_or_else(|_| Client::new());
    let (latest, mut notes) = LatestNotifier::new();
    // Without a terminal notifications go to the log.
    let notifier: Arc<dyn Notifier> = if std::io::stdin().is_terminal() {
        Arc::new(latest)
    } else {
        Arc::new(TracingNotifier)
    };
    let mut notes_open = true;
    let mut dashboard = Dashboard::new(settings, client, notifier);
    let settings = dashboard.settings();
    info!(
        mode = %settings.mode,
        server = %settings.server_address,
        refresh_ms = settings.refresh_rate_ms,
        "запуск hwdash"
    );
    let mut display = dashboard.subscribe();
    dashboard.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(err) = res {
                    error!(error = %err, "не удалось дождаться Ctrl+C");
                }
                info!("получен Ctrl+C, выполняется остановка");
                break;
            }
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = display.borrow_and_update().clone();
                let view = dashboard.on_update(&state, now_ms());
                println!("{}", render_text(&view));
            }
            changed = notes.changed(), if notes_open => {
                if changed.is_err() {
                    notes_open = false;
                } else if let Some(n) = notes.borrow_and_update().clone() {
                    println!("[{}] {}", n.title, n.description);
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match Command::parse(&line) {
                    Ok(command) => match dashboard.apply(command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(err) => warn!(error = %err, "настройки не сохранены"),
                    },
                    Err(msg) => warn!("{msg}"),
                },
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!(error = %err, "ошибка чтения команд");
                    stdin_open = false;
                }
            },
        }
    }

    dashboard.stop().await;
}

async fn run_serve(cfg: ServeConfig) {
    info!(
        listen = %cfg.listen,
        interval_secs = cfg.interval_secs,
        "запуск сервера телеметрии"
    );

    let shared: SharedSnapshot = Arc::new(RwLock::new(None));
    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let listen = cfg.listen.clone();
        let metrics = metrics.clone();
        let shared = shared.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, shared);
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "некорректный адрес listen");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "не удалось запустить HTTP-сервер");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    let collector_task = {
        let metrics = metrics.clone();
        let shared = shared.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut system = sysinfo::System::new();
            let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("получен сигнал остановки цикла сбора");
                        break;
                    }
                    _ = ticker.tick() => {
                        // nvidia-smi and sysfs reads block
                        let snapshot = tokio::task::block_in_place(|| collect_hardware(&mut system));
                        metrics.update_from_snapshot(&snapshot);
                        *shared.write().await = Some(snapshot);
                    }
                }
            }
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);

    let _ = collector_task.await;
    let _ = http_task.await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
