use super::{SourceContext, SourceError, SourceHandle, SourceMode, SourceState};
use crate::notify::Notification;
use crate::snapshot::HardwareSnapshot;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// One request for a full snapshot, shared by the HTTP and bridge sources.
pub(crate) trait Fetch: Clone + Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<HardwareSnapshot, SourceError>> + Send;

    /// Sources with nothing to talk to skip their fetches silently.
    fn ready(&self) -> bool {
        true
    }

    fn target(&self) -> String;
}

pub(crate) fn spawn_poller<F: Fetch>(
    mode: SourceMode,
    fetcher: F,
    period: Duration,
    ctx: SourceContext,
) -> SourceHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refetch = Arc::new(Notify::new());
    let task = tokio::spawn(run_poller(
        mode,
        fetcher,
        period,
        ctx,
        shutdown_rx,
        refetch.clone(),
    ));
    SourceHandle::new(mode, refetch, shutdown_tx, task)
}

async fn run_poller<F: Fetch>(
    mode: SourceMode,
    fetcher: F,
    period: Duration,
    ctx: SourceContext,
    mut shutdown: watch::Receiver<bool>,
    refetch: Arc<Notify>,
) {
    let mut state = SourceState::default();
    // Dropping the set aborts fetches still in flight.
    let mut inflight: JoinSet<Result<HardwareSnapshot, SourceError>> = JoinSet::new();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(%mode, target = %fetcher.target(), period_ms = period.as_millis() as u64, "запуск опроса");
    begin_fetch(&fetcher, &mut inflight, &mut state, &ctx);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                let result = match joined {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(%mode, error = %err, "задача запроса прервана");
                        state.is_loading = !inflight.is_empty();
                        ctx.sink.publish(state.clone());
                        continue;
                    }
                };
                complete_fetch(mode, &fetcher, result, &inflight, &mut state, &ctx);
            }
            _ = ticker.tick() => begin_fetch(&fetcher, &mut inflight, &mut state, &ctx),
            _ = refetch.notified() => begin_fetch(&fetcher, &mut inflight, &mut state, &ctx),
        }
    }
}

fn begin_fetch<F: Fetch>(
    fetcher: &F,
    inflight: &mut JoinSet<Result<HardwareSnapshot, SourceError>>,
    state: &mut SourceState,
    ctx: &SourceContext,
) {
    if !fetcher.ready() {
        return;
    }
    let fetcher = fetcher.clone();
    inflight.spawn(async move { fetcher.fetch().await });
    state.is_loading = true;
    ctx.sink.publish(state.clone());
}

fn complete_fetch<F: Fetch>(
    mode: SourceMode,
    fetcher: &F,
    result: Result<HardwareSnapshot, SourceError>,
    inflight: &JoinSet<Result<HardwareSnapshot, SourceError>>,
    state: &mut SourceState,
    ctx: &SourceContext,
) {
    match result {
        Ok(snapshot) => {
            state.data = Some(snapshot);
            state.is_error = false;
            state.last_updated = Some(SystemTime::now());
        }
        Err(err) => {
            warn!(%mode, target = %fetcher.target(), error = %err, "не удалось получить данные");
            state.is_error = true;
            ctx.notifier.notify(Notification::connection_failed());
        }
    }
    state.is_loading = !inflight.is_empty();
    ctx.sink.publish(state.clone());
}
