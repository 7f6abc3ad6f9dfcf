//! End-to-end behaviour of the background sampler under tokio's paused clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use sched_latency::observer::LatencyTracker;
use sched_latency::{
    CallbackRegistry, Histogram, MetricSource, Phase, Sampler, SamplerConfig, Settings,
};

const INF: f64 = f64::INFINITY;

/// Each snapshot adds 5 observations to [1ms, 2ms) on top of a large
/// backlog in [8ms, 16ms) that predates the sampler.
struct Synthetic {
    ticks: AtomicU64,
}

impl MetricSource for Synthetic {
    fn sample(&self) -> Histogram {
        let k = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        Histogram::new(
            vec![0.0, 0.001, 0.002, 0.004, 0.008, 0.016, INF],
            vec![0, 5 * k, 0, 0, 10_000, 0],
        )
        .unwrap()
    }
}

type Published = Arc<Mutex<Vec<(Duration, Duration)>>>;

struct Harness {
    settings: Arc<Settings>,
    registry: Arc<CallbackRegistry>,
    sampler: Arc<Sampler<Synthetic>>,
    published: Published,
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Sleep until `offset_ms` after `t0` on the paused clock.
async fn at(t0: Instant, offset_ms: u64) {
    tokio::time::sleep_until(t0 + ms(offset_ms)).await;
}

fn harness(period_ms: u64, duration_ms: u64) -> Harness {
    let config = SamplerConfig::new(ms(period_ms), ms(duration_ms)).unwrap();
    let settings = Arc::new(Settings::new(config).unwrap());

    let registry = Arc::new(CallbackRegistry::new());
    let published: Published = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    registry.register(move |latency, period| sink.lock().push((latency, period)));

    let sampler = Arc::new(Sampler::new(
        Synthetic {
            ticks: AtomicU64::new(0),
        },
        settings.get(),
        registry.clone(),
    ));
    Harness {
        settings,
        registry,
        sampler,
        published,
    }
}

#[tokio::test(start_paused = true)]
async fn first_callback_fires_on_capacity_th_tick() {
    let h = harness(100, 1000);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let t0 = Instant::now();
    let handle = h.sampler.clone().start(&h.settings, shutdown_rx);

    // ticks at 100ms..900ms: nine snapshots, still warming
    at(t0, 950).await;
    assert!(h.published.lock().is_empty());
    assert_eq!(h.sampler.status().window_len, 9);
    assert_eq!(h.sampler.phase(), Phase::Warming);

    // tick at 1000ms fills the window and publishes once
    at(t0, 1050).await;
    {
        let published = h.published.lock();
        assert_eq!(published.len(), 1);
        // interval mass is only the 45 new observations in [1ms, 2ms),
        // so p99 is that bucket's midpoint rather than the 8-16ms backlog
        let (latency, period) = published[0];
        assert!((latency.as_secs_f64() - 0.0015).abs() < 1e-6, "{latency:?}");
        assert_eq!(period, ms(100));
    }
    assert_eq!(h.sampler.phase(), Phase::Steady);

    // every later tick publishes exactly once
    at(t0, 1550).await;
    assert_eq!(h.published.lock().len(), 6);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn widening_duration_restarts_warm_up() {
    let h = harness(100, 1000);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let t0 = Instant::now();
    let handle = h.sampler.clone().start(&h.settings, shutdown_rx);

    at(t0, 1050).await;
    assert_eq!(h.published.lock().len(), 1);

    h.settings.set_duration(ms(2000)).unwrap();
    // let the sampler task pick the change up
    at(t0, 1051).await;
    let status = h.sampler.status();
    assert_eq!(status.capacity, 20);
    assert_eq!(status.window_len, 0);
    assert_eq!(status.phase, Phase::Warming);

    // the timer restarted at 1050ms: 19 fresh ticks (1150ms..2950ms) are
    // not enough
    at(t0, 3000).await;
    assert_eq!(h.published.lock().len(), 1);

    // the 20th (3050ms) publishes again
    at(t0, 3100).await;
    assert_eq!(h.published.lock().len(), 2);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn period_change_retimes_the_ticker() {
    let h = harness(100, 1000);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let t0 = Instant::now();
    let handle = h.sampler.clone().start(&h.settings, shutdown_rx);

    at(t0, 50).await;
    h.settings.set_period(ms(500)).unwrap();
    at(t0, 51).await;
    assert_eq!(h.sampler.status().capacity, 2);

    // the 100ms tick of the old schedule never happens; the first tick
    // comes one new period after the change
    at(t0, 500).await;
    assert_eq!(h.sampler.status().window_len, 0);
    at(t0, 600).await;
    assert_eq!(h.sampler.status().window_len, 1);
    assert!(h.published.lock().is_empty());

    // 1050ms fills the window
    at(t0, 1100).await;
    {
        let published = h.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, ms(500));
    }

    // then every 500ms
    at(t0, 1500).await;
    assert_eq!(h.published.lock().len(), 1);
    at(t0, 1600).await;
    assert_eq!(h.published.lock().len(), 2);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn shrinking_a_long_period_takes_effect_at_once() {
    let h = harness(10_000, 20_000);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let t0 = Instant::now();
    let handle = h.sampler.clone().start(&h.settings, shutdown_rx);

    at(t0, 10).await;
    h.settings.set_period(ms(1)).unwrap();

    // sampling at 1ms well before the old 10s tick would have fired
    at(t0, 1010).await;
    let status = h.sampler.status();
    assert_eq!(status.capacity, 20_000);
    assert!(
        (990..=1000).contains(&status.window_len),
        "window_len = {}",
        status.window_len
    );

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_signal_stops_ticking() {
    let h = harness(100, 1000);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let t0 = Instant::now();
    let handle = h.sampler.clone().start(&h.settings, shutdown_rx);

    at(t0, 350).await;
    assert_eq!(h.sampler.status().window_len, 3);

    shutdown_tx.send(true).unwrap();
    handle.stop().await;

    at(t0, 1350).await;
    assert_eq!(h.sampler.status().window_len, 3);
}

#[tokio::test(start_paused = true)]
async fn start_applies_settings_that_changed_before_launch() {
    let h = harness(100, 1000);
    h.settings.set_duration(ms(500)).unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let t0 = Instant::now();
    let handle = h.sampler.clone().start(&h.settings, shutdown_rx);
    assert_eq!(h.sampler.status().capacity, 5);

    at(t0, 550).await;
    assert_eq!(h.published.lock().len(), 1);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn update_right_after_start_is_applied() {
    let h = harness(100, 1000);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let t0 = Instant::now();
    let handle = h.sampler.clone().start(&h.settings, shutdown_rx);
    h.settings.set_duration(ms(500)).unwrap();

    at(t0, 1).await;
    assert_eq!(h.sampler.config().duration(), ms(500));
    assert_eq!(h.sampler.status().capacity, 5);

    // ticks at 100ms..500ms fill the smaller window
    at(t0, 550).await;
    assert_eq!(h.published.lock().len(), 1);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn tracker_reset_on_reconfigure_drops_only_stale_reports() {
    let h = harness(100, 1000);
    let tracker = Arc::new(LatencyTracker::new());
    h.registry.register(tracker.callback());
    let stale = tracker.clone();
    h.sampler.on_reconfigure(move |_| stale.reset());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let t0 = Instant::now();
    let handle = h.sampler.clone().start(&h.settings, shutdown_rx);

    at(t0, 1250).await;
    assert_eq!(tracker.snapshot().total_reports, 3);

    h.settings.set_duration(ms(500)).unwrap();
    at(t0, 1251).await;
    assert_eq!(tracker.snapshot().total_reports, 0);

    // timer restarted at 1250ms; the fifth fresh tick (1750ms) reports
    // under the new settings
    at(t0, 1700).await;
    assert_eq!(tracker.snapshot().total_reports, 0);
    at(t0, 1800).await;
    let snap = tracker.snapshot();
    assert_eq!(snap.total_reports, 1);
    assert_eq!(snap.latest.map(|r| r.period_ms), Some(100));

    handle.stop().await;
}
