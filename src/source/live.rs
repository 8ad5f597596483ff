use super::poll::{spawn_poller, Fetch};
use super::{DataSource, SourceContext, SourceError, SourceHandle, SourceMode};
use crate::snapshot::HardwareSnapshot;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls `GET <address>` for a JSON snapshot.
pub struct LiveSource {
    client: Client,
    address: String,
    period: Duration,
}

impl LiveSource {
    pub fn new(client: Client, address: impl Into<String>, period: Duration) -> Self {
        Self {
            client,
            address: address.into(),
            period,
        }
    }
}

impl DataSource for LiveSource {
    fn kind(&self) -> SourceMode {
        SourceMode::Live
    }

    fn start(self: Box<Self>, ctx: SourceContext) -> SourceHandle {
        let address = self.address.trim().to_string();
        if address.is_empty() {
            warn!("адрес сервера не задан, опрос не выполняется");
        }
        let fetcher = HttpFetcher {
            client: self.client,
            address,
        };
        spawn_poller(SourceMode::Live, fetcher, self.period, ctx)
    }
}

#[derive(Clone)]
struct HttpFetcher {
    client: Client,
    address: String,
}

impl Fetch for HttpFetcher {
    async fn fetch(&self) -> Result<HardwareSnapshot, SourceError> {
        let resp = self
            .client
            .get(&self.address)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn ready(&self) -> bool {
        !self.address.is_empty()
    }

    fn target(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::source::SourceState;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    const BODY: &str = r#"{"cpu_temp":55,"gpu_temp":60,"ram_usage":"8.2 GB","fan_speed":1500,"uptime":"1:00:00","power_draw":"120 W","cpu_usage":25,"gpu_usage":35}"#;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/data")
    }

    /// Answers with the snapshot on the first call and 500 afterwards.
    fn flaky_router(calls: Arc<AtomicUsize>) -> Router {
        Router::new().route(
            "/data",
            get(move || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::OK, BODY).into_response()
                    } else {
                        (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
                    }
                }
            }),
        )
    }

    fn start(
        address: String,
        notifier: Arc<RecordingNotifier>,
    ) -> (SourceHandle, watch::Receiver<SourceState>) {
        let (tx, rx) = watch::channel(SourceState::default());
        let source = LiveSource::new(Client::new(), address, Duration::from_secs(3600));
        let handle = Box::new(source).start(SourceContext {
            sink: Arc::new(tx),
            notifier,
        });
        (handle, rx)
    }

    async fn wait_for(
        rx: &mut watch::Receiver<SourceState>,
        pred: impl FnMut(&SourceState) -> bool,
    ) -> SourceState {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("состояние не дождались")
            .expect("канал закрыт")
            .clone()
    }

    #[tokio::test]
    async fn successful_fetch_replaces_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let address = serve(flaky_router(calls)).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (handle, mut rx) = start(address, notifier.clone());

        let state = wait_for(&mut rx, |s| s.data.is_some() && !s.is_loading).await;
        let expected: HardwareSnapshot = serde_json::from_str(BODY).unwrap();
        assert_eq!(state.data, Some(expected));
        assert!(!state.is_error);
        assert!(state.last_updated.is_some());
        assert_eq!(notifier.count(), 0);
        handle.stop().await;
    }

    #[tokio::test]
    async fn server_error_keeps_previous_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let address = serve(flaky_router(calls.clone())).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (handle, mut rx) = start(address, notifier.clone());

        let first = wait_for(&mut rx, |s| s.data.is_some() && !s.is_loading).await;
        handle.refetch();
        let failed = wait_for(&mut rx, |s| s.is_error && !s.is_loading).await;

        assert_eq!(failed.data, first.data);
        assert_eq!(failed.last_updated, first.last_updated);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.count(), 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn first_failure_leaves_data_empty() {
        let router = Router::new().route(
            "/data",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        );
        let address = serve(router).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (handle, mut rx) = start(address, notifier.clone());

        let state = wait_for(&mut rx, |s| s.is_error).await;
        assert_eq!(state.data, None);
        assert_eq!(state.last_updated, None);
        assert_eq!(notifier.count(), 1);
        handle.stop().await;
    }

    #[tokio::test]
    async fn malformed_json_is_a_fetch_failure() {
        let router = Router::new().route("/data", get(|| async { r#"{"cpu_temp":"#.to_string() }));
        let address = serve(router).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let (handle, mut rx) = start(address, notifier);

        let state = wait_for(&mut rx, |s| s.is_error).await;
        assert_eq!(state.data, None);
        handle.stop().await;
    }

    #[tokio::test]
    async fn empty_address_never_fetches() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (handle, rx) = start("  ".to_string(), notifier.clone());
        handle.refetch();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*rx.borrow(), SourceState::default());
        assert_eq!(notifier.count(), 0);
        handle.stop().await;
    }
}
