use crate::config::ServerConfig;
use crate::services::staging::StagingStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the staging store and clears anything a previous run left behind.
pub async fn setup_staging(config: &ServerConfig) -> Arc<StagingStore> {
    let store = StagingStore::new(
        config.staging_dir.clone(),
        config.formats.clone(),
        config.max_file_size,
    );

    match store.sweep_stale(config.staging_cleanup_age).await {
        Ok(0) => {}
        Ok(n) => info!("🧹 Removed {} leftover staged artifacts", n),
        Err(e) => warn!(
            "⚠️  Could not sweep staging dir {}: {}",
            store.root().display(),
            e
        ),
    }

    info!("📂 Staging directory: {}", store.root().display());
    Arc::new(store)
}
