use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

/// Observer invoked once per steady-state tick with `(p99 latency, period)`.
///
/// Callbacks run on the sampler task and must not block.
pub type LatencyCallback = Arc<dyn Fn(Duration, Duration) + Send + Sync>;

/// Opaque handle identifying a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(Uuid);

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

struct Registered {
    id: CallbackId,
    cb: LatencyCallback,
}

/// Append-only set of latency observers.
///
/// Observers register before the sampler starts and live for the rest of
/// the process; there is no unregister.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: Mutex<Vec<Registered>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, cb: F) -> CallbackId
    where
        F: Fn(Duration, Duration) + Send + Sync + 'static,
    {
        let id = CallbackId(Uuid::new_v4());
        self.callbacks.lock().push(Registered {
            id,
            cb: Arc::new(cb),
        });
        tracing::debug!(callback_id = %id, "registered scheduler latency callback");
        id
    }

    /// Copy out the current callbacks so they can be invoked without
    /// holding the registry lock.
    pub fn snapshot(&self) -> Vec<LatencyCallback> {
        self.callbacks.lock().iter().map(|r| r.cb.clone()).collect()
    }

    pub fn ids(&self) -> Vec<CallbackId> {
        self.callbacks.lock().iter().map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn snapshot_invokes_every_registered_callback() {
        let registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            registry.register(move |latency, _period| {
                hits.fetch_add(latency.as_millis() as u64, Ordering::SeqCst);
            });
        }
        assert_eq!(registry.len(), 3);

        for cb in registry.snapshot() {
            cb(Duration::from_millis(2), Duration::from_millis(100));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn ids_are_unique() {
        let registry = CallbackRegistry::new();
        let a = registry.register(|_, _| {});
        let b = registry.register(|_, _| {});
        assert_ne!(a, b);
        assert_eq!(registry.ids(), vec![a, b]);
    }

    #[test]
    fn callback_may_register_while_snapshot_is_held() {
        let registry = Arc::new(CallbackRegistry::new());
        let inner = registry.clone();
        registry.register(move |_, _| {
            inner.register(|_, _| {});
        });

        for cb in registry.snapshot() {
            cb(Duration::ZERO, Duration::ZERO);
        }
        assert_eq!(registry.len(), 2);
    }
}
