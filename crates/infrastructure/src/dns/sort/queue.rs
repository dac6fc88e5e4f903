use crate::dns::cache::SortedCacheEntry;
use compact_str::CompactString;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use velo_dns_domain::{DomainError, RecordType, SortConfig};
use velo_dns_application::RttRanker;

/// One rank-these-addresses job. The callback fires exactly once, on the
/// worker that processed the task.
pub struct SortTask {
    pub domain: CompactString,
    pub record_type: RecordType,
    pub ips: Vec<IpAddr>,
    pub ttl: u32,
    pub callback: Box<dyn FnOnce(Result<SortedCacheEntry, DomainError>) + Send>,
}

/// Bounded worker pool funnelling rank tasks through the injected RTT
/// ranker. Submission never blocks: a full queue hands the task back so the
/// caller can fail it (or fall back to serving unsorted).
pub struct SortQueue {
    tx: mpsc::Sender<SortTask>,
    shutdown: CancellationToken,
    tasks_processed: Arc<AtomicU64>,
    tasks_failed: Arc<AtomicU64>,
}

impl SortQueue {
    /// Spawns the worker pool; must be called within a tokio runtime.
    pub fn new(config: &SortConfig, ranker: Arc<dyn RttRanker>) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel::<SortTask>(config.queue_size.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();
        let task_timeout = Duration::from_millis(config.task_timeout_ms.max(1));
        let tasks_processed = Arc::new(AtomicU64::new(0));
        let tasks_failed = Arc::new(AtomicU64::new(0));

        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let ranker = Arc::clone(&ranker);
            let shutdown = shutdown.clone();
            let processed = Arc::clone(&tasks_processed);
            let failed = Arc::clone(&tasks_failed);
            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            task = rx.recv() => task,
                            _ = shutdown.cancelled() => None,
                        }
                    };
                    let Some(task) = task else { break };
                    Self::process(worker_id, task, &ranker, task_timeout, &processed, &failed)
                        .await;
                }
                debug!(worker_id, "Sort worker stopped");
            });
        }

        Self {
            tx,
            shutdown,
            tasks_processed,
            tasks_failed,
        }
    }

    async fn process(
        worker_id: usize,
        task: SortTask,
        ranker: &Arc<dyn RttRanker>,
        task_timeout: Duration,
        processed: &AtomicU64,
        failed: &AtomicU64,
    ) {
        debug!(
            worker_id,
            domain = %task.domain,
            candidates = task.ips.len(),
            "Ranking addresses"
        );

        let ranked = match timeout(task_timeout, ranker.rank(task.ips.clone())).await {
            Err(_) => Err(DomainError::RankingFailed("rank task timed out".into())),
            Ok(Err(err)) => Err(err),
            Ok(Ok(ranked)) => {
                if ranked.addresses.len() == ranked.rtts_ms.len() {
                    Ok(ranked)
                } else {
                    Err(DomainError::RankingFailed(
                        "ranker returned mismatched address/RTT lists".into(),
                    ))
                }
            }
        };

        match ranked {
            Ok(ranked) => {
                let entry = SortedCacheEntry::new(ranked.addresses, ranked.rtts_ms, task.ttl);
                (task.callback)(Ok(entry));
                processed.fetch_add(1, AtomicOrdering::Relaxed);
            }
            Err(err) => {
                warn!(worker_id, domain = %task.domain, error = %err, "Rank task failed");
                (task.callback)(Err(err));
                failed.fetch_add(1, AtomicOrdering::Relaxed);
            }
        }
    }

    /// Non-blocking submit. On overflow (or after shutdown) the task comes
    /// back in the error so its callback can still be failed.
    pub fn submit(&self, task: SortTask) -> Result<(), SortTask> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task))
            | Err(mpsc::error::TrySendError::Closed(task)) => Err(task),
        }
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.tasks_processed.load(AtomicOrdering::Relaxed),
            self.tasks_failed.load(AtomicOrdering::Relaxed),
        )
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
