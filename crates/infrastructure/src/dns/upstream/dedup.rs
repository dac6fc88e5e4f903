use super::outcome::QueryReply;
use compact_str::CompactString;
use rustc_hash::FxHashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use velo_dns_domain::{DomainError, RecordType};

/// Identity of an outbound resolution: two queries collapse iff domain,
/// type and DNSSEC flag all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub domain: CompactString,
    pub record_type: RecordType,
    pub dnssec_ok: bool,
}

impl DedupKey {
    pub fn new(domain: &str, record_type: RecordType, dnssec_ok: bool) -> Self {
        Self {
            domain: CompactString::from(domain),
            record_type,
            dnssec_ok,
        }
    }
}

struct InflightSlot {
    done: watch::Sender<bool>,
    result: Mutex<Option<Result<QueryReply, DomainError>>>,
}

impl InflightSlot {
    fn new() -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            done,
            result: Mutex::new(None),
        })
    }

    fn complete(&self, result: Result<QueryReply, DomainError>) {
        *self.result.lock().expect("inflight result lock") = Some(result);
        self.done.send_replace(true);
    }

    async fn wait(&self) -> Result<QueryReply, DomainError> {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|finished| *finished).await;
        self.result
            .lock()
            .expect("inflight result lock")
            .clone()
            .unwrap_or(Err(DomainError::AllServersFailed))
    }
}

/// Collapses concurrent identical outbound queries into one dispatch. The
/// first caller becomes the leader and actually runs the orchestrator; all
/// later callers wait on the leader's slot and receive a clone of its
/// single result.
pub struct RequestDeduplicator {
    inflight: Mutex<FxHashMap<DedupKey, Arc<InflightSlot>>>,
}

impl Default for RequestDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDeduplicator {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().expect("inflight map lock").len()
    }

    /// Returns the result plus whether it was shared (this caller rode on
    /// someone else's dispatch).
    pub async fn run<F, Fut>(&self, key: DedupKey, op: F) -> (Result<QueryReply, DomainError>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<QueryReply, DomainError>>,
    {
        let (slot, is_leader) = {
            let mut inflight = self.inflight.lock().expect("inflight map lock");
            match inflight.get(&key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let slot = InflightSlot::new();
                    inflight.insert(key.clone(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !is_leader {
            return (slot.wait().await, true);
        }

        // If the leader's future is dropped mid-flight (caller went away),
        // the guard completes the slot with an error so followers never
        // hang on an abandoned dispatch.
        let guard = LeaderGuard {
            dedup: self,
            key: &key,
            slot: &slot,
            finished: false,
        };

        let result = op().await;
        guard.finish(result.clone());
        (result, false)
    }

    fn release(&self, key: &DedupKey) {
        self.inflight
            .lock()
            .expect("inflight map lock")
            .remove(key);
    }
}

struct LeaderGuard<'a> {
    dedup: &'a RequestDeduplicator,
    key: &'a DedupKey,
    slot: &'a Arc<InflightSlot>,
    finished: bool,
}

impl<'a> LeaderGuard<'a> {
    fn finish(mut self, result: Result<QueryReply, DomainError>) {
        self.dedup.release(self.key);
        self.slot.complete(result);
        self.finished = true;
    }
}

impl<'a> Drop for LeaderGuard<'a> {
    fn drop(&mut self) {
        if !self.finished {
            self.dedup.release(self.key);
            self.slot
                .complete(Err(DomainError::Transport("leader dispatch aborted".into())));
        }
    }
}
