use super::poll::{spawn_poller, Fetch};
use super::{DataSource, SourceContext, SourceError, SourceHandle, SourceMode};
use crate::collectors::collect_hardware;
use crate::snapshot::HardwareSnapshot;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{System, SystemExt};
use thiserror::Error;

pub const GET_HARDWARE_DATA: &str = "get_hardware_data";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("хост не знает команду '{0}'")]
    UnknownCommand(String),
    #[error("хост отклонил вызов: {0}")]
    Rejected(String),
    #[error("некорректный ответ хоста: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Request/response channel into the embedding host process.
pub trait CommandChannel: Send + Sync + 'static {
    fn invoke(&self, command: &str) -> impl Future<Output = Result<Value, BridgeError>> + Send;
}

/// Polls the host for snapshots through a [`CommandChannel`].
pub struct BridgeSource<C> {
    channel: Arc<C>,
    period: Duration,
}

impl<C: CommandChannel> BridgeSource<C> {
    pub fn new(channel: Arc<C>, period: Duration) -> Self {
        Self { channel, period }
    }
}

impl<C: CommandChannel> DataSource for BridgeSource<C> {
    fn kind(&self) -> SourceMode {
        SourceMode::Bridge
    }

    fn start(self: Box<Self>, ctx: SourceContext) -> SourceHandle {
        let fetcher = BridgeFetcher {
            channel: self.channel,
        };
        spawn_poller(SourceMode::Bridge, fetcher, self.period, ctx)
    }
}

struct BridgeFetcher<C> {
    channel: Arc<C>,
}

impl<C> Clone for BridgeFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<C: CommandChannel> Fetch for BridgeFetcher<C> {
    async fn fetch(&self) -> Result<HardwareSnapshot, SourceError> {
        let value = self.channel.invoke(GET_HARDWARE_DATA).await?;
        serde_json::from_value(value).map_err(|err| SourceError::Bridge(BridgeError::Decode(err)))
    }

    fn target(&self) -> String {
        GET_HARDWARE_DATA.to_string()
    }
}

/// In-process host that answers hardware queries from the local machine.
#[derive(Clone)]
pub struct HostChannel {
    system: Arc<Mutex<System>>,
}

impl HostChannel {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for HostChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel for HostChannel {
    async fn invoke(&self, command: &str) -> Result<Value, BridgeError> {
        if command != GET_HARDWARE_DATA {
            return Err(BridgeError::UnknownCommand(command.to_string()));
        }
        let system = self.system.clone();
        let snapshot = tokio::task::spawn_blocking(move || {
            let mut system = system
                .lock()
                .map_err(|_| BridgeError::Rejected("состояние sysinfo повреждено".to_string()))?;
            Ok::<_, BridgeError>(collect_hardware(&mut system))
        })
        .await
        .map_err(|err| BridgeError::Rejected(err.to_string()))??;
        Ok(serde_json::to_value(snapshot)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::source::testing::CountingSink;
    use crate::source::SourceState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::watch;

    struct ScriptedHost {
        calls: AtomicUsize,
        fail_from: usize,
    }

    impl CommandChannel for ScriptedHost {
        async fn invoke(&self, command: &str) -> Result<Value, BridgeError> {
            assert_eq!(command, GET_HARDWARE_DATA);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_from {
                return Err(BridgeError::Rejected("host gone".to_string()));
            }
            Ok(serde_json::json!({
                "cpu_temp": 50 + n,
                "gpu_temp": 60,
                "ram_usage": 42.0,
                "fan_speed": 1100,
                "uptime": "0:01:00",
                "power_draw": "90 W",
                "cpu_usage": 12,
                "gpu_usage": 3
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_host_on_interval_and_surfaces_rejection() {
        let host = Arc::new(ScriptedHost {
            calls: AtomicUsize::new(0),
            fail_from: 3,
        });
        let sink = Arc::new(CountingSink::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let handle = Box::new(BridgeSource::new(host.clone(), Duration::from_millis(1000))).start(
            SourceContext {
                sink: sink.clone(),
                notifier: notifier.clone(),
            },
        );

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(host.calls.load(Ordering::SeqCst), 3);
        let state = sink.last().expect("есть состояние");
        assert_eq!(state.data.as_ref().map(|d| d.cpu_temp), Some(52.0));
        assert!(!state.is_error);

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let state = sink.last().expect("есть состояние");
        assert!(state.is_error);
        assert_eq!(state.data.as_ref().map(|d| d.cpu_temp), Some(52.0));
        assert_eq!(notifier.count(), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_fetches_now_and_keeps_timer_phase() {
        let host = Arc::new(ScriptedHost {
            calls: AtomicUsize::new(0),
            fail_from: usize::MAX,
        });
        let sink = Arc::new(CountingSink::default());
        let handle = Box::new(BridgeSource::new(host.clone(), Duration::from_millis(1000))).start(
            SourceContext {
                sink: sink.clone(),
                notifier: Arc::new(RecordingNotifier::default()),
            },
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(host.calls.load(Ordering::SeqCst), 1);
        let first = sink.last().expect("есть состояние");

        handle.refetch();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(host.calls.load(Ordering::SeqCst), 2);
        let refetched = sink.last().expect("есть состояние");
        assert_eq!(refetched.data.as_ref().map(|d| d.cpu_temp), Some(51.0));
        assert!(refetched.last_updated > first.last_updated);

        // the tick still lands at 1000 ms, not 1300 ms
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(host.calls.load(Ordering::SeqCst), 3);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(host.calls.load(Ordering::SeqCst), 3);
        handle.stop().await;
    }

    #[tokio::test]
    async fn local_host_answers_hardware_query() {
        let host = HostChannel::new();
        let value = host.invoke(GET_HARDWARE_DATA).await.expect("ответ хоста");
        let snap: HardwareSnapshot = serde_json::from_value(value).expect("формат снимка");
        assert!((0.0..=100.0).contains(&snap.cpu_usage));

        assert!(matches!(
            host.invoke("reboot").await,
            Err(BridgeError::UnknownCommand(_))
        ));
    }

    #[tokio::test]
    async fn bridge_source_publishes_into_watch() {
        let (tx, mut rx) = watch::channel(SourceState::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let handle = Box::new(BridgeSource::new(
            Arc::new(HostChannel::new()),
            Duration::from_secs(3600),
        ))
        .start(SourceContext {
            sink: Arc::new(tx),
            notifier,
        });

        let state = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| s.data.is_some()))
            .await
            .expect("данные от хоста")
            .expect("канал открыт")
            .clone();
        assert!(!state.is_error);
        handle.stop().await;
    }
}
