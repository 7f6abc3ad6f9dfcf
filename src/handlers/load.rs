use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    /// Number of concurrent Tokio tasks hogging the scheduler
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// How long the load runs (seconds)
    #[serde(default = "default_duration")]
    pub duration_secs: u64,

    /// Upper bound on a single non-yielding burst (milliseconds)
    #[serde(default = "default_burst_ms")]
    pub max_burst_ms: u64,
}

fn default_workers() -> u32 {
    16
}
fn default_duration() -> u64 {
    30
}
fn default_burst_ms() -> u64 {
    5
}

#[derive(Debug, Serialize)]
pub struct LoadStatus {
    pub running: bool,
    pub message: String,
}

// ─── POST /api/load/start ────────────────────────────────────────

pub async fn start_load(
    State(state): State<Arc<AppState>>,
    Json(config): Json<LoadConfig>,
) -> Result<Json<LoadStatus>, AppError> {
    if config.workers == 0 || config.workers > 256 {
        return Err(AppError::BadRequest(
            "workers must be between 1 and 256".into(),
        ));
    }
    if config.duration_secs == 0 || config.duration_secs > 300 {
        return Err(AppError::BadRequest(
            "duration_secs must be between 1 and 300".into(),
        ));
    }
    if config.max_burst_ms == 0 || config.max_burst_ms > 50 {
        return Err(AppError::BadRequest(
            "max_burst_ms must be between 1 and 50".into(),
        ));
    }

    // Claim the flag BEFORE spawning so workers see it immediately;
    // only one load run at a time
    claim(&state.load_running)?;

    let msg = format!(
        "Started: {} workers × {}s, bursts up to {}ms",
        config.workers, config.duration_secs, config.max_burst_ms,
    );
    tracing::info!(
        workers = config.workers,
        duration_secs = config.duration_secs,
        max_burst_ms = config.max_burst_ms,
        "load generator started"
    );

    let running = state.load_running.clone();
    let handle = tokio::spawn(crate::load_generator::run(
        running,
        config.workers,
        config.duration_secs,
        config.max_burst_ms,
    ));

    // Stash the handle so `stop` can await clean shutdown
    *state.load_handle.lock().await = Some(handle);

    Ok(Json(LoadStatus {
        running: true,
        message: msg,
    }))
}

fn claim(running: &AtomicBool) -> Result<(), AppError> {
    running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .map(|_| ())
        .map_err(|_| AppError::AlreadyRunning)
}

// ─── POST /api/load/stop ─────────────────────────────────────────

pub async fn stop_load_handler(
    State(state): State<Arc<AppState>>,
) -> Json<LoadStatus> {
    let was_running = stop_load(&state).await;
    Json(LoadStatus {
        running: false,
        message: if was_running {
            "Load generator stopped".into()
        } else {
            "No load is running".into()
        },
    })
}

/// Signal every worker to stop and wait for them. Returns whether load
/// was running.
pub async fn stop_load(state: &AppState) -> bool {
    let was_running = state.load_running.swap(false, Ordering::SeqCst);

    let mut guard = state.load_handle.lock().await;
    if let Some(handle) = guard.take() {
        // Ignore JoinError — the task may have already finished
        let _ = handle.await;
    }
    if was_running {
        tracing::info!("load generator stopped");
    }
    was_running
}

// ─── GET /api/load/status ────────────────────────────────────────

pub async fn load_status(
    State(state): State<Arc<AppState>>,
) -> Json<LoadStatus> {
    let running = state.load_running.load(Ordering::SeqCst);
    Json(LoadStatus {
        running,
        message: if running {
            "Load in progress".into()
        } else {
            "Idle".into()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_claim_wins() {
        let running = Arc::new(AtomicBool::new(false));
        let winners: usize = std::thread::scope(|scope| {
            let attempts: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| claim(&running).is_ok()))
                .collect();
            attempts
                .into_iter()
                .map(|a| a.join().unwrap() as usize)
                .sum()
        });
        assert_eq!(winners, 1);
        assert!(running.load(Ordering::SeqCst));
        assert!(matches!(claim(&running), Err(AppError::AlreadyRunning)));

        running.store(false, Ordering::SeqCst);
        assert!(claim(&running).is_ok());
    }
}
