use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `workers` Tokio tasks that monopolise runtime threads in short
/// bursts until the deadline or the `running` flag is set to false.
/// Every burst keeps other ready tasks waiting, which is exactly the
/// scheduling delay the sampler measures.
pub async fn run(running: Arc<AtomicBool>, workers: u32, duration_secs: u64, max_burst_ms: u64) {
    let deadline = Instant::now() + Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(workers as usize);
    for worker_id in 0..workers {
        let running = running.clone();
        handles.push(tokio::spawn(async move {
            worker(worker_id, running, deadline, max_burst_ms).await;
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        let _ = h.await;
    }

    // Mark load as finished
    running.store(false, Ordering::SeqCst);
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(id: u32, running: Arc<AtomicBool>, deadline: Instant, max_burst_ms: u64) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    let mut bursts = 0u64;

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        let burst = Duration::from_micros(rng.gen_range(100..=max_burst_ms * 1000));
        spin_for(burst);
        bursts += 1;

        // Give the scheduler a chance before the next burst
        tokio::task::yield_now().await;
    }
    tracing::debug!(worker = id, bursts, "load worker finished");
}

/// Busy-wait without yielding to the runtime.
fn spin_for(burst: Duration) {
    let start = Instant::now();
    while start.elapsed() < burst {
        std::hint::spin_loop();
    }
}
