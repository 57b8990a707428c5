use crate::services::rate_limiter::RateLimiter;
use crate::services::staging::StagingStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically removes staged artifacts orphaned by crashes and expired
/// rate-limit windows.
pub struct SweepWorker {
    staging: Arc<StagingStore>,
    rate_limiter: Arc<RateLimiter>,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SweepWorker {
    pub fn new(
        staging: Arc<StagingStore>,
        rate_limiter: Arc<RateLimiter>,
        max_age: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            staging,
            rate_limiter,
            max_age,
            // Sweep at least every 10 minutes, more often for short ages
            interval: max_age.min(Duration::from_secs(600)).max(Duration::from_secs(1)),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Sweep worker started (interval {:?})", self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Sweep worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep_once().await;
                }
            }
        }
    }

    pub async fn sweep_once(&self) {
        match self.staging.sweep_stale(self.max_age).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("🧹 Removed {} stale staged artifacts", n),
            Err(e) => tracing::error!("Staging sweep failed: {}", e),
        }

        let purged = self.rate_limiter.purge().await;
        if purged > 0 {
            tracing::debug!("Purged {} expired rate-limit windows", purged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rate_limiter::WindowCount;
    use crate::utils::formats::FormatPair;
    use crate::utils::kv_store::MemoryKvStore;
    use tempfile::TempDir;

    fn worker(dir: &TempDir, max_age: Duration) -> (SweepWorker, watch::Sender<bool>) {
        let staging = Arc::new(StagingStore::new(dir.path(), FormatPair::default(), 1024));
        let limiter = Arc::new(RateLimiter::per_hour(
            Arc::new(MemoryKvStore::<WindowCount>::new()),
            10,
        ));
        let (tx, rx) = watch::channel(false);
        (SweepWorker::new(staging, limiter, max_age, rx), tx)
    }

    #[tokio::test]
    async fn test_sweep_once_removes_old_artifacts() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("1-0-old.ncm"), b"x").unwrap();

        let (worker, _tx) = worker(&dir, Duration::ZERO);
        worker.sweep_once().await;
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let (worker, tx) = worker(&dir, Duration::from_secs(3600));

        let handle = tokio::spawn(worker.run());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
