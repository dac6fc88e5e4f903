use super::key::CacheKey;
use super::metrics::CacheMetrics;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Index entry: where to look, when it lapses, and which write it described.
/// A popped entry whose version disagrees with the live entry is a stale
/// index and is discarded without touching the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ExpireIndexEntry {
    pub expires_at_secs: u64,
    pub version: u64,
    pub key: CacheKey,
}

impl Ord for ExpireIndexEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expires_at_secs
            .cmp(&other.expires_at_secs)
            .then_with(|| self.version.cmp(&other.version))
            .then_with(|| self.key.domain.cmp(&other.key.domain))
            .then_with(|| self.key.record_type.to_u16().cmp(&other.key.record_type.to_u16()))
    }
}

impl PartialOrd for ExpireIndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type MinHeap = BinaryHeap<Reverse<ExpireIndexEntry>>;

/// Expiry index for the raw tier. Writers never touch the heap lock: they
/// post into a bounded channel drained by a single worker task. Overflow
/// drops the event; the entry is still reclaimed by a later pass or simply
/// overwritten.
pub(super) struct ExpiryIndex {
    heap: Arc<Mutex<MinHeap>>,
    tx: mpsc::Sender<ExpireIndexEntry>,
    /// Held until the worker is spawned; sync callers (tests, cleanup before
    /// startup) drain it inline instead.
    rx: Mutex<Option<mpsc::Receiver<ExpireIndexEntry>>>,
    shutdown: CancellationToken,
    metrics: Arc<CacheMetrics>,
}

impl ExpiryIndex {
    pub fn new(queue_size: usize, metrics: Arc<CacheMetrics>) -> Self {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        Self {
            heap: Arc::new(Mutex::new(BinaryHeap::new())),
            tx,
            rx: Mutex::new(Some(rx)),
            shutdown: CancellationToken::new(),
            metrics,
        }
    }

    /// Spawn the worker that absorbs insertion events. Idempotent; requires
    /// a tokio runtime.
    pub fn spawn_worker(&self) {
        let Some(mut rx) = self.rx.lock().expect("expiry rx lock").take() else {
            return;
        };
        let heap = Arc::clone(&self.heap);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(entry) => {
                            heap.lock().expect("expiry heap lock").push(Reverse(entry));
                        }
                        None => break,
                    },
                    _ = shutdown.cancelled() => {
                        // Absorb whatever is already queued, then stop.
                        while let Ok(entry) = rx.try_recv() {
                            heap.lock().expect("expiry heap lock").push(Reverse(entry));
                        }
                        break;
                    }
                }
            }
            debug!("Expiry index worker stopped");
        });
    }

    /// Non-blocking post from the write path.
    pub fn post(&self, key: CacheKey, expires_at_secs: u64, version: u64) {
        let entry = ExpireIndexEntry {
            expires_at_secs,
            version,
            key,
        };
        if self.tx.try_send(entry).is_err() {
            self.metrics
                .expiry_events_dropped
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    /// Move queued events into the heap without a worker. No-op once the
    /// worker owns the receiver.
    pub fn absorb_pending(&self) {
        let mut guard = self.rx.lock().expect("expiry rx lock");
        if let Some(rx) = guard.as_mut() {
            let mut heap = self.heap.lock().expect("expiry heap lock");
            while let Ok(entry) = rx.try_recv() {
                heap.push(Reverse(entry));
            }
        }
    }

    pub fn heap(&self) -> &Mutex<MinHeap> {
        &self.heap
    }

    pub fn len(&self) -> usize {
        self.heap.lock().expect("expiry heap lock").len()
    }

    pub fn clear(&self) {
        self.heap.lock().expect("expiry heap lock").clear();
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
