use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use sched_latency::SamplerConfig;

use crate::AppState;

use super::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsUpdate {
    pub period_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}

// ─── GET /api/settings ───────────────────────────────────────────

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Json<SamplerConfig> {
    Json(state.settings.get())
}

// ─── POST /api/settings ──────────────────────────────────────────
/// Validates and publishes new sampler timing. The sampler picks the
/// change up asynchronously, clears the tracker and starts a fresh warm-up.

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SamplerConfig>, AppError> {
    if update.period_ms.is_none() && update.duration_ms.is_none() {
        return Err(AppError::BadRequest(
            "expected period_ms and/or duration_ms".into(),
        ));
    }

    let applied = state.settings.update(
        update.period_ms.map(Duration::from_millis),
        update.duration_ms.map(Duration::from_millis),
    )?;

    Ok(Json(applied))
}
