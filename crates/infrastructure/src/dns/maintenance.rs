use crate::dns::cache::TieredCache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic cache upkeep: pressure-driven reclamation every interval, plus a
/// best-effort snapshot to disk when a path is configured. Runs until the
/// token cancels; a final save happens on the way out.
pub struct CacheMaintenance {
    cache: Arc<TieredCache>,
    interval_secs: u64,
    persist_path: Option<PathBuf>,
    shutdown: CancellationToken,
}

impl CacheMaintenance {
    pub fn new(cache: Arc<TieredCache>, interval_secs: u64, persist_path: Option<PathBuf>) -> Self {
        Self {
            cache,
            interval_secs: interval_secs.max(1),
            persist_path,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn the maintenance loop. Also starts the cache's expiry-index
    /// worker, which needs a runtime anyway.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        self.cache.start();
        info!(
            interval_secs = self.interval_secs,
            persisting = self.persist_path.is_some(),
            "Cache maintenance running"
        );
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.interval_secs));
            // The first tick fires immediately; skip it so startup isn't a
            // cleanup pass.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once();
                    }
                    _ = self.shutdown.cancelled() => {
                        self.persist();
                        debug!("Cache maintenance stopped");
                        return;
                    }
                }
            }
        })
    }

    fn run_once(&self) {
        self.cache.clean_expired();
        self.persist();
    }

    fn persist(&self) {
        let Some(path) = self.persist_path.as_deref() else {
            return;
        };
        if let Err(err) = self.cache.save_to_disk(path) {
            warn!(error = %err, path = %path.display(), "Cache snapshot failed");
        }
    }
}
