use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::histogram::Histogram;

/// Cumulative histogram of scheduling delay, in seconds.
pub const SCHED_LATENCIES: &str = "/sched/latencies:seconds";

/// Number of scheduling probes recorded so far.
pub const SCHED_PROBES: &str = "/sched/probes:probes";

// HdrHistogram range: 1 ns → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000_000;
const HIST_SIGFIG: u8 = 3;

/// Anything that can hand the sampler a fresh cumulative latency histogram.
pub trait MetricSource: Send + Sync {
    /// Read the cumulative scheduling-latency histogram.
    ///
    /// Implementations panic if the underlying metric is missing or has an
    /// unexpected shape; that is an environment defect, not a runtime error.
    fn sample(&self) -> Histogram;
}

impl<S: MetricSource + ?Sized> MetricSource for Arc<S> {
    fn sample(&self) -> Histogram {
        (**self).sample()
    }
}

/// Value of a named runtime metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Histogram(Histogram),
}

/// Measures how long freshly spawned tasks wait before the tokio scheduler
/// first polls them, and exposes the result as named metrics.
///
/// Recorded delays are never reset: every export is cumulative since the
/// probe was created, and always uses the same bucket boundaries.
#[derive(Clone)]
pub struct RuntimeProbe {
    state: Arc<Mutex<ProbeState>>,
    boundaries: Arc<[u64]>,
}

struct ProbeState {
    delays: hdrhistogram::Histogram<u64>,
    probes: u64,
}

impl Default for RuntimeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeProbe {
    pub fn new() -> Self {
        let delays = hdrhistogram::Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
            .expect("histogram creation");
        Self {
            state: Arc::new(Mutex::new(ProbeState { delays, probes: 0 })),
            boundaries: bucket_boundaries_ns().into(),
        }
    }

    /// Record one observed scheduling delay.
    pub fn record(&self, delay: Duration) {
        let ns = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX).max(HIST_LOW);
        let mut state = self.state.lock();
        state.delays.saturating_record(ns);
        state.probes += 1;
    }

    /// Look up a metric by name.
    pub fn read(&self, name: &str) -> Option<MetricValue> {
        match name {
            SCHED_LATENCIES => Some(MetricValue::Histogram(self.export())),
            SCHED_PROBES => Some(MetricValue::Counter(self.state.lock().probes)),
            _ => None,
        }
    }

    /// Start the background probe: every `every`, spawn a task and record
    /// how long it took to be polled. Stops when `shutdown` fires.
    pub fn spawn(&self, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let probe = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(every_ms = every.as_millis() as u64, "scheduler probe started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let spawned_at = Instant::now();
                        let probe = probe.clone();
                        tokio::spawn(async move {
                            probe.record(spawned_at.elapsed());
                        });
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("scheduler probe shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Bucket everything recorded so far into the fixed export boundaries.
    fn export(&self) -> Histogram {
        let bounds = &self.boundaries;
        let mut counts = vec![0u64; bounds.len()];
        {
            let state = self.state.lock();
            for iv in state.delays.iter_recorded() {
                let val = iv.value_iterated_to();
                // first boundary is 0, so the partition point is never 0
                let idx = bounds.partition_point(|&b| b <= val) - 1;
                counts[idx] += iv.count_at_value();
            }
        }

        let mut buckets: Vec<f64> = bounds.iter().map(|&ns| ns as f64 / 1e9).collect();
        buckets.push(f64::INFINITY);
        Histogram::new(buckets, counts)
            .unwrap_or_else(|e| panic!("scheduler latency export has unexpected shape: {e}"))
    }
}

impl MetricSource for RuntimeProbe {
    fn sample(&self) -> Histogram {
        match self.read(SCHED_LATENCIES) {
            Some(MetricValue::Histogram(h)) => h,
            Some(other) => panic!("unexpected metric type for {SCHED_LATENCIES}: {other:?}"),
            None => panic!("metric {SCHED_LATENCIES} not found"),
        }
    }
}

/// Finite bucket lower bounds in nanoseconds: zero, then four linear
/// sub-buckets per power of two from 2^10 ns up to 2^32 ns.
fn bucket_boundaries_ns() -> Vec<u64> {
    let mut bounds = vec![0];
    for exp in 10..32 {
        let base = 1u64 << exp;
        let step = base / 4;
        bounds.extend((0..4).map(|k| base + k * step));
    }
    bounds.push(1u64 << 32);
    bounds
}
