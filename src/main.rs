use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use sched_latency::config::AppConfig;
use sched_latency::logging::init_logging;
use sched_latency::observer::LatencyTracker;
use sched_latency::{CallbackRegistry, RuntimeProbe, Sampler, Settings};
use tokio::sync::watch;

mod handlers;
mod load_generator;
mod server;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Live sampler settings; writes are validated before the sampler sees them.
    pub settings: Arc<Settings>,

    pub sampler: Arc<Sampler<RuntimeProbe>>,

    pub callbacks: Arc<CallbackRegistry>,

    /// Registered sampler callback — keeps recent p99 reports for the API.
    pub tracker: Arc<LatencyTracker>,

    /// Flag checked by every load-generator worker on each iteration.
    pub load_running: Arc<AtomicBool>,

    /// Handle to the spawned load-generator task so we can await clean shutdown.
    pub load_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[tokio::main]
async fn main() {
    // ── 1. Configuration & logging ───────────────────────────────
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("❌ Invalid configuration: {e}");
        std::process::exit(1);
    });
    if let Err(e) = init_logging(&config.log) {
        eprintln!("❌ Cannot initialise logging: {e}");
        std::process::exit(1);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── 2. Start the scheduler probe ─────────────────────────────
    let probe = RuntimeProbe::new();
    let probe_task = probe.spawn(config.probe_every, shutdown_rx.clone());

    // ── 3. Register observers, then start the sampler ────────────
    let settings = Arc::new(Settings::new(config.sampler).unwrap_or_else(|e| {
        eprintln!("❌ Invalid sampler settings: {e}");
        std::process::exit(1);
    }));
    let callbacks = Arc::new(CallbackRegistry::new());
    let tracker = Arc::new(LatencyTracker::new());
    callbacks.register(tracker.callback());

    let sampler = Arc::new(Sampler::new(probe, settings.get(), callbacks.clone()));
    // Reports taken under the old timing are not comparable
    let stale = tracker.clone();
    sampler.on_reconfigure(move |_| stale.reset());
    let sampler_handle = sampler.clone().start(&settings, shutdown_rx);

    // ── 4. Build shared state ────────────────────────────────────
    let state = Arc::new(AppState {
        settings,
        sampler,
        callbacks,
        tracker,
        load_running: Arc::new(AtomicBool::new(false)),
        load_handle: tokio::sync::Mutex::new(None),
    });

    // ── 5. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state.clone());

    // ── 6. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("❌ Failed to bind to {}: {e}", config.addr);
            std::process::exit(1);
        });

    tracing::info!(
        addr = %config.addr,
        period_ms = config.sampler.period().as_millis() as u64,
        duration_ms = config.sampler.duration().as_millis() as u64,
        "scheduler latency service listening"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server exited with error");
    }

    // ── 7. Tear down background work ─────────────────────────────
    handlers::load::stop_load(&state).await;
    let _ = shutdown_tx.send(true);
    sampler_handle.stop().await;
    let _ = probe_task.await;
    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c; shutting down");
    }
}
