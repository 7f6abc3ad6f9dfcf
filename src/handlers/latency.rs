use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use sched_latency::observer::LatencySnapshot;
use sched_latency::SamplerStatus;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SamplerView {
    #[serde(flatten)]
    pub status: SamplerStatus,
    pub callbacks: usize,
}

// ─── GET /api/latency ────────────────────────────────────────────
/// Returns a single JSON snapshot of published p99 values.

pub async fn get_latency(
    State(state): State<Arc<AppState>>,
) -> Json<LatencySnapshot> {
    Json(state.tracker.snapshot())
}

// ─── GET /api/latency/stream ─────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes a full `LatencySnapshot` as JSON every 500 ms.

pub async fn latency_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(500));

    let stream = IntervalStream::new(interval).map(move |_| {
        let snapshot = state.tracker.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok(Event::default().data(json))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// ─── GET /api/sampler ────────────────────────────────────────────
/// Warm-up phase and window fill of the running sampler.

pub async fn sampler_status(
    State(state): State<Arc<AppState>>,
) -> Json<SamplerView> {
    Json(SamplerView {
        status: state.sampler.status(),
        callbacks: state.callbacks.len(),
    })
}
