use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

// ─── Configuration ───────────────────────────────────────────────

/// How many published reports we keep for the live feed
const MAX_RECENT_REPORTS: usize = 200;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Keeps what the scheduler latency sampler has been publishing.
/// Registered as a sampler callback; the HTTP layer calls `snapshot()`.
pub struct LatencyTracker {
    inner: Mutex<Inner>,
}

/// One published measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyReport {
    pub observed_at: DateTime<Utc>,
    pub p99_us: u64,
    pub period_ms: u64,
}

/// How the published p99 has moved since the last reset. Every report
/// behind it was taken under the same sampler settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct P99Summary {
    pub period_ms: u64,
    pub best_us: u64,
    pub worst_us: u64,
    pub mean_us: f64,
    /// Typical published p99
    pub median_us: u64,
    /// Published p99 exceeded only by the worst tenth of reports
    pub p90_us: u64,
    /// Reports whose p99 reached at least one sampling period
    pub stalled_reports: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySnapshot {
    pub latest: Option<LatencyReport>,
    /// `None` until the sampler has published under the current settings
    pub summary: Option<P99Summary>,
    pub total_reports: u64,
    pub recent: Vec<LatencyReport>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    p99_hist: Histogram<u64>,
    total_reports: u64,
    stalled_reports: u64,
    recent: VecDeque<LatencyReport>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Record one published p99.
    pub fn record(&self, latency: Duration, period: Duration) {
        self.inner.lock().record(LatencyReport {
            observed_at: Utc::now(),
            p99_us: latency.as_micros() as u64,
            period_ms: period.as_millis() as u64,
        });
    }

    /// Wipe history — called when the sampler is reconfigured, since values
    /// measured under different settings are not comparable.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        self.inner.lock().snapshot()
    }

    /// Callback suitable for `CallbackRegistry::register`.
    pub fn callback(self: &Arc<Self>) -> impl Fn(Duration, Duration) + Send + Sync + 'static {
        let tracker = self.clone();
        move |latency, period| tracker.record(latency, period)
    }
}

impl Inner {
    fn new() -> Self {
        Self {
            p99_hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
            total_reports: 0,
            stalled_reports: 0,
            recent: VecDeque::with_capacity(MAX_RECENT_REPORTS + 1),
        }
    }

    fn record(&mut self, report: LatencyReport) {
        self.total_reports += 1;
        if report.p99_us >= report.period_ms.saturating_mul(1000) {
            self.stalled_reports += 1;
        }
        // clamp to ≥ 1 μs; out-of-range values saturate
        self.p99_hist.saturating_record(report.p99_us.max(HIST_LOW));

        self.recent.push_back(report);
        if self.recent.len() > MAX_RECENT_REPORTS {
            self.recent.pop_front();
        }
    }

    fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            latest: self.recent.back().cloned(),
            summary: self.summary(),
            total_reports: self.total_reports,
            recent: self.recent.iter().cloned().collect(),
        }
    }

    fn summary(&self) -> Option<P99Summary> {
        let latest = self.recent.back()?;
        Some(P99Summary {
            period_ms: latest.period_ms,
            best_us: self.p99_hist.min(),
            worst_us: self.p99_hist.max(),
            mean_us: self.p99_hist.mean(),
            median_us: self.p99_hist.value_at_quantile(0.5),
            p90_us: self.p99_hist.value_at_quantile(0.9),
            stalled_reports: self.stalled_reports,
        })
    }
}
