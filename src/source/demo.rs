use super::{DataSource, SourceContext, SourceHandle, SourceMode, SourceState};
use crate::format::format_uptime;
use crate::snapshot::{HardwareSnapshot, RamUsage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{watch, Notify};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Targets are re-rolled on this fixed period, whatever the refresh rate.
pub const RETARGET_PERIOD: Duration = Duration::from_millis(5000);

const INITIAL_UPTIME_SECS: u64 = 2 * 3600 + 15 * 60 + 47;
const NEARBY_TARGET_SPREAD: f64 = 5.0;

/// Synthetic telemetry model driven by the demo source.
pub trait DemoModel: Send + 'static {
    fn current(&mut self) -> HardwareSnapshot;
    fn retarget(&mut self);
    fn step(&mut self, elapsed: Duration) -> HardwareSnapshot;
}

/// One random-walking metric: moves toward `target` by at most `max_delta` per step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drift {
    pub value: f64,
    pub target: f64,
    min: f64,
    max: f64,
    max_delta: f64,
}

impl Drift {
    fn new<R: Rng>(rng: &mut R, initial: (i64, i64), range: (i64, i64), max_delta: f64) -> Self {
        let value = rng.gen_range(initial.0..=initial.1) as f64;
        Self {
            value,
            target: value,
            min: range.0 as f64,
            max: range.1 as f64,
            max_delta,
        }
    }

    fn retarget<R: Rng>(&mut self, rng: &mut R) {
        self.target = rng.gen_range(self.min as i64..=self.max as i64) as f64;
    }

    fn step<R: Rng>(&mut self, rng: &mut R) {
        // Close enough: wander to a nearby target instead of stalling.
        if (self.value - self.target).abs() < self.max_delta {
            let lo = (self.value - NEARBY_TARGET_SPREAD).max(self.min).round() as i64;
            let hi = (self.value + NEARBY_TARGET_SPREAD).min(self.max).round() as i64;
            self.target = rng.gen_range(lo..=hi) as f64;
        }
        let gap = self.target - self.value;
        let delta = (rng.gen::<f64>() * self.max_delta).min(gap.abs());
        self.value = (self.value + delta.copysign(gap)).clamp(self.min, self.max);
    }

    pub fn surfaced(&self) -> f64 {
        self.value.round()
    }

    #[cfg(test)]
    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

pub struct DemoGenerator<R = StdRng> {
    rng: R,
    pub cpu_temp: Drift,
    pub gpu_temp: Drift,
    pub cpu_usage: Drift,
    pub gpu_usage: Drift,
    pub fan_speed: Drift,
    uptime_ms: u64,
}

impl DemoGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> DemoGenerator<R> {
    pub fn new(mut rng: R) -> Self {
        Self {
            cpu_temp: Drift::new(&mut rng, (40, 65), (40, 70), 1.0),
            gpu_temp: Drift::new(&mut rng, (55, 75), (50, 80), 1.0),
            cpu_usage: Drift::new(&mut rng, (10, 70), (5, 95), 3.0),
            gpu_usage: Drift::new(&mut rng, (5, 90), (5, 95), 4.0),
            fan_speed: Drift::new(&mut rng, (1000, 2500), (900, 3000), 50.0),
            uptime_ms: INITIAL_UPTIME_SECS * 1000,
            rng,
        }
    }

    #[cfg(test)]
    pub fn drifts(&self) -> [&Drift; 5] {
        [
            &self.cpu_temp,
            &self.gpu_temp,
            &self.cpu_usage,
            &self.gpu_usage,
            &self.fan_speed,
        ]
    }

    fn each_drift(&mut self, mut f: impl FnMut(&mut Drift, &mut R)) {
        let Self {
            rng,
            cpu_temp,
            gpu_temp,
            cpu_usage,
            gpu_usage,
            fan_speed,
            ..
        } = self;
        for drift in [cpu_temp, gpu_temp, cpu_usage, gpu_usage, fan_speed] {
            f(drift, &mut *rng);
        }
    }

    /// RAM and power are re-rolled on every reading, outside the drift model.
    fn snapshot(&mut self) -> HardwareSnapshot {
        let ram = format!(
            "{}.{} GB",
            self.rng.gen_range(4..=16),
            self.rng.gen_range(0..=9)
        );
        let power = format!("{} W", self.rng.gen_range(80..=250));
        HardwareSnapshot {
            cpu_temp: self.cpu_temp.surfaced(),
            gpu_temp: self.gpu_temp.surfaced(),
            ram_usage: RamUsage::Preformatted(ram),
            fan_speed: self.fan_speed.surfaced(),
            uptime: format_uptime(self.uptime_ms / 1000),
            power_draw: power,
            cpu_usage: self.cpu_usage.surfaced(),
            gpu_usage: self.gpu_usage.surfaced(),
        }
    }
}

impl<R: Rng + Send + 'static> DemoModel for DemoGenerator<R> {
    fn current(&mut self) -> HardwareSnapshot {
        self.snapshot()
    }

    fn retarget(&mut self) {
        self.each_drift(|drift, rng| drift.retarget(rng));
    }

    fn step(&mut self, elapsed: Duration) -> HardwareSnapshot {
        self.each_drift(|drift, rng| drift.step(rng));
        // Uptime follows elapsed time, not the tick count.
        self.uptime_ms += elapsed.as_millis() as u64;
        self.snapshot()
    }
}

/// Offline source producing drifting synthetic readings. Never loads, never fails.
pub struct DemoSource<M = DemoGenerator> {
    model: M,
    period: Duration,
}

impl DemoSource<DemoGenerator> {
    pub fn new(period: Duration) -> Self {
        Self::with_model(DemoGenerator::from_entropy(), period)
    }
}

impl<M: DemoModel> DemoSource<M> {
    pub fn with_model(model: M, period: Duration) -> Self {
        Self { model, period }
    }
}

impl<M: DemoModel> DataSource for DemoSource<M> {
    fn kind(&self) -> SourceMode {
        SourceMode::Demo
    }

    fn start(self: Box<Self>, ctx: SourceContext) -> SourceHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let refetch = Arc::new(Notify::new());
        let task = tokio::spawn(run_demo(
            self.model,
            self.period,
            ctx,
            shutdown_rx,
            refetch.clone(),
        ));
        SourceHandle::new(SourceMode::Demo, refetch, shutdown_tx, task)
    }
}

async fn run_demo<M: DemoModel>(
    mut model: M,
    period: Duration,
    ctx: SourceContext,
    mut shutdown: watch::Receiver<bool>,
    refetch: Arc<Notify>,
) {
    let mut state = SourceState {
        data: Some(model.current()),
        is_loading: false,
        is_error: false,
        last_updated: Some(SystemTime::now()),
    };
    ctx.sink.publish(state.clone());

    let start = Instant::now();
    let mut last_step = start;
    let mut retarget = time::interval_at(start + RETARGET_PERIOD, RETARGET_PERIOD);
    let mut ticker = time::interval_at(start + period, period);
    retarget.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!(period_ms = period.as_millis() as u64, "запуск демо-режима");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = retarget.tick() => model.retarget(),
            scheduled = ticker.tick() => {
                // Skipped ticks still count toward uptime.
                state.data = Some(model.step(scheduled.duration_since(last_step)));
                last_step = scheduled;
                state.last_updated = Some(SystemTime::now());
                ctx.sink.publish(state.clone());
            }
            // Refetch only re-stamps the reading; the next tick brings new values.
            _ = refetch.notified() => {
                state.last_updated = Some(SystemTime::now());
                ctx.sink.publish(state.clone());
            }
        }
    }
}
