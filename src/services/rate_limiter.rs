use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::kv_store::KeyValueStore;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Conversions counted for one client in the current window.
#[derive(Debug, Clone, Copy)]
pub struct WindowCount {
    pub count: u32,
    pub window_start: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

/// Fixed-window limiter over a [`KeyValueStore`]. A limit of zero disables it.
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore<WindowCount>>,
    locks: KeyedMutex,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore<WindowCount>>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            locks: KeyedMutex::new(),
            limit,
            window,
        }
    }

    pub fn per_hour(store: Arc<dyn KeyValueStore<WindowCount>>, limit: u32) -> Self {
        Self::new(store, limit, Duration::from_secs(3600))
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Counts one attempt for `key`, or refuses it once the window is full.
    pub async fn check(&self, key: &str) -> Result<(), RateLimitExceeded> {
        if !self.is_enabled() {
            return Ok(());
        }

        // Read-modify-write on the window must not interleave for one key
        let _guard = self.locks.lock(key).await;
        let now = Instant::now();

        let window = self.store.get(key).await.unwrap_or(WindowCount {
            count: 0,
            window_start: now,
        });
        let remaining = self
            .window
            .saturating_sub(now.duration_since(window.window_start));

        if window.count >= self.limit {
            tracing::warn!(
                "Client {} hit the limit of {} conversions per {:?}",
                key,
                self.limit,
                self.window
            );
            return Err(RateLimitExceeded {
                retry_after: remaining,
            });
        }

        self.store
            .put(
                key,
                WindowCount {
                    count: window.count + 1,
                    ..window
                },
                remaining,
            )
            .await;
        Ok(())
    }

    /// Drops expired windows and idle per-key locks.
    pub async fn purge(&self) -> usize {
        self.locks.cleanup();
        self.store.purge_expired().await
    }
}
