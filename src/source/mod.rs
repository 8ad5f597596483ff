pub mod bridge;
pub mod demo;
pub mod live;
mod poll;

use crate::notify::Notifier;
use crate::snapshot::HardwareSnapshot;
use bridge::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

/// What the dashboard sees of a data source at any moment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceState {
    pub data: Option<HardwareSnapshot>,
    pub is_loading: bool,
    pub is_error: bool,
    pub last_updated: Option<SystemTime>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("сервер ответил статусом {0}")]
    Status(u16),
    #[error("ошибка HTTP-запроса: {0}")]
    Request(#[from] reqwest::Error),
    #[error("некорректный JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Live,
    Demo,
    Bridge,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceMode::Live => "live",
            SourceMode::Demo => "demo",
            SourceMode::Bridge => "bridge",
        })
    }
}

/// Receives every state change of a running source.
pub trait StateSink: Send + Sync + 'static {
    fn publish(&self, state: SourceState);
}

impl StateSink for watch::Sender<SourceState> {
    fn publish(&self, state: SourceState) {
        self.send_replace(state);
    }
}

#[derive(Clone)]
pub struct SourceContext {
    pub sink: Arc<dyn StateSink>,
    pub notifier: Arc<dyn Notifier>,
}

/// A configured source. Starting consumes it; the returned handle is the only
/// way to reach the running driver.
pub trait DataSource: Send + 'static {
    fn kind(&self) -> SourceMode;
    fn start(self: Box<Self>, ctx: SourceContext) -> SourceHandle;
}

pub struct SourceHandle {
    mode: SourceMode,
    refetch: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SourceHandle {
    pub(crate) fn new(
        mode: SourceMode,
        refetch: Arc<Notify>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            mode,
            refetch,
            shutdown,
            task,
        }
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    /// Asks for one immediate update; the timer keeps its phase.
    pub fn refetch(&self) {
        self.refetch.notify_one();
    }

    /// Stops the driver and waits for it, so nothing is published after return.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            if !err.is_cancelled() {
                tracing::warn!(mode = %self.mode, error = %err, "источник данных завершился с ошибкой");
            }
        }
        debug!(mode = %self.mode, "источник данных остановлен");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct CountingSink {
        pub calls: AtomicUsize,
        pub last: Mutex<Option<SourceState>>,
    }

    impl CountingSink {
        pub fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last(&self) -> Option<SourceState> {
            self.last.lock().unwrap().clone()
        }
    }

    impl StateSink for CountingSink {
        fn publish(&self, state: SourceState) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(state);
        }
    }
}
