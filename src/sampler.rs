use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::callbacks::CallbackRegistry;
use crate::histogram::Histogram;
use crate::settings::{SamplerConfig, Settings};
use crate::source::MetricSource;
use crate::window::SlidingWindow;

/// Percentile published to callbacks.
pub const PUBLISHED_PERCENTILE: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Window not yet full; ticks only collect snapshots.
    Warming,
    /// Window full; every tick publishes a measurement.
    Steady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplerStatus {
    pub phase: Phase,
    pub capacity: usize,
    pub window_len: usize,
    #[serde(flatten)]
    pub config: SamplerConfig,
}

/// Turns a cumulative scheduling-latency histogram into a rolling p99.
///
/// Each tick reads a fresh cumulative snapshot and pushes it into a sliding
/// window sized `duration / period`. Once the window is full, the newest
/// snapshot minus the oldest gives the latency distribution over roughly the
/// last `duration`, and its p99 is handed to every registered callback.
pub struct Sampler<S> {
    source: S,
    callbacks: Arc<CallbackRegistry>,
    state: Mutex<State>,
    on_reconfigure: Mutex<Vec<ReconfigureHook>>,
}

type ReconfigureHook = Arc<dyn Fn(SamplerConfig) + Send + Sync>;

struct State {
    config: SamplerConfig,
    window: SlidingWindow<Arc<Histogram>>,
}

impl<S: MetricSource> Sampler<S> {
    pub fn new(source: S, config: SamplerConfig, callbacks: Arc<CallbackRegistry>) -> Self {
        Self {
            source,
            callbacks,
            state: Mutex::new(State {
                config,
                window: SlidingWindow::new(config.capacity()),
            }),
            on_reconfigure: Mutex::new(Vec::new()),
        }
    }

    /// Run `hook` after every reconfiguration, once the window has been
    /// reset and before the next tick samples under the new settings.
    pub fn on_reconfigure<F>(&self, hook: F)
    where
        F: Fn(SamplerConfig) + Send + Sync + 'static,
    {
        self.on_reconfigure.lock().push(Arc::new(hook));
    }

    pub fn config(&self) -> SamplerConfig {
        self.state.lock().config
    }

    pub fn phase(&self) -> Phase {
        self.status().phase
    }

    pub fn status(&self) -> SamplerStatus {
        let state = self.state.lock();
        SamplerStatus {
            phase: if state.window.is_full() {
                Phase::Steady
            } else {
                Phase::Warming
            },
            capacity: state.window.capacity(),
            window_len: state.window.len(),
            config: state.config,
        }
    }

    /// Apply new timing parameters. All collected snapshots are discarded and
    /// the sampler warms up again from scratch.
    pub fn reconfigure(&self, config: SamplerConfig) {
        let capacity = config.capacity();
        {
            let mut state = self.state.lock();
            state.config = config;
            state.window.resize(capacity);
        }
        tracing::info!(
            period_ms = config.period().as_millis() as u64,
            duration_ms = config.duration().as_millis() as u64,
            capacity,
            "scheduler latency sampler reconfigured"
        );

        let hooks: Vec<ReconfigureHook> = self.on_reconfigure.lock().clone();
        for hook in hooks {
            hook(config);
        }
    }

    /// Run one tick: sample, track, and once warmed up publish the p99 to
    /// every callback. Returns the published latency, if any.
    pub fn sample_on_tick_and_invoke_callbacks(&self) -> Option<Duration> {
        let latest = Arc::new(self.source.sample());
        let (oldest, period) = self.track_sample(latest.clone())?;

        let interval = Histogram::sub(&latest, &oldest);
        let latency = latency_from_seconds(interval.percentile(PUBLISHED_PERCENTILE));
        tracing::debug!(
            p99_us = latency.as_micros() as u64,
            period_ms = period.as_millis() as u64,
            observations = interval.total(),
            "scheduler latency sample"
        );

        for cb in self.callbacks.snapshot() {
            cb(latency, period);
        }
        Some(latency)
    }

    /// Push `latest` into the window. Once full, returns the oldest retained
    /// snapshot to diff against, along with the period it was taken under.
    fn track_sample(&self, latest: Arc<Histogram>) -> Option<(Arc<Histogram>, Duration)> {
        let mut state = self.state.lock();
        state.window.push_front(latest);
        if !state.window.is_full() {
            tracing::trace!(
                len = state.window.len(),
                capacity = state.window.capacity(),
                "scheduler latency sampler warming"
            );
            return None;
        }
        let oldest = state.window.oldest().cloned()?;
        Some((oldest, state.config.period()))
    }
}

impl<S: MetricSource + 'static> Sampler<S> {
    /// Start the background tick task. It samples every period and applies
    /// settings changes as they arrive: each change reconfigures the
    /// sampler and restarts the tick timer at the new period.
    ///
    /// The task stops when `shutdown` fires, when [`SamplerHandle::stop`] is
    /// called, or when the handle is dropped.
    pub fn start(
        self: Arc<Self>,
        settings: &Settings,
        shutdown: watch::Receiver<bool>,
    ) -> SamplerHandle {
        // Subscribe before reading so no update can fall between the two.
        let mut changes = settings.subscribe();
        let current = *changes.borrow_and_update();
        if self.config() != current {
            self.reconfigure(current);
        }

        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(run(self, changes, cancelled, shutdown));
        SamplerHandle { cancel, task }
    }
}

/// Owns the background task of a running sampler.
pub struct SamplerHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Cancel the sampler and wait for its task to exit.
    pub async fn stop(self) {
        // Err only means the task already exited
        let _ = self.cancel.send(true);
        let _ = self.task.await;
    }
}

async fn run<S: MetricSource>(
    sampler: Arc<Sampler<S>>,
    mut changes: watch::Receiver<SamplerConfig>,
    mut cancelled: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = sampler.config().period();
    let mut interval = tick_interval(period);
    let mut settings_open = true;
    tracing::info!(
        period_ms = period.as_millis() as u64,
        "scheduler latency sampler started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                sampler.sample_on_tick_and_invoke_callbacks();
            }
            changed = changes.changed(), if settings_open => {
                if changed.is_err() {
                    tracing::debug!("settings dropped; no further reconfiguration");
                    settings_open = false;
                } else {
                    let config = *changes.borrow_and_update();
                    sampler.reconfigure(config);
                    interval = tick_interval(config.period());
                }
            }
            _ = cancelled.changed() => break,
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("scheduler latency sampler stopped");
}

/// First tick one full period from now; late ticks are not made up.
fn tick_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Seconds → `Duration`, treating negative or non-finite values as zero.
pub fn latency_from_seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
