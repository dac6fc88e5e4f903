use super::entry::SortedCacheEntry;
use super::key::CacheKey;
use super::storage::TieredCache;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use velo_dns_domain::{DomainError, RecordType};

/// In-flight rank task for one (domain, type) key. At most one live state
/// with `in_progress == true` exists per key; everyone else observes this
/// one and waits on its completion signal.
pub struct SortingState {
    inner: Mutex<SortingProgress>,
    done: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct SortingProgress {
    in_progress: bool,
    result: Option<SortedCacheEntry>,
    error: Option<DomainError>,
}

impl SortingState {
    fn new_in_progress() -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            inner: Mutex::new(SortingProgress {
                in_progress: true,
                result: None,
                error: None,
            }),
            done,
        })
    }

    /// Block until the owning task calls `finish_sort`. Returns immediately
    /// if it already has.
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        // wait_for checks the current value first, so a completion that
        // happened before we subscribed is not missed.
        let _ = rx.wait_for(|finished| *finished).await;
    }

    pub fn is_in_progress(&self) -> bool {
        self.inner.lock().expect("sorting state lock").in_progress
    }

    pub fn outcome(&self) -> Result<Option<SortedCacheEntry>, DomainError> {
        let inner = self.inner.lock().expect("sorting state lock");
        match &inner.error {
            Some(err) => Err(err.clone()),
            None => Ok(inner.result.clone()),
        }
    }

    fn complete(&self, result: Option<SortedCacheEntry>, error: Option<DomainError>) {
        {
            let mut inner = self.inner.lock().expect("sorting state lock");
            inner.in_progress = false;
            inner.result = result;
            inner.error = error;
        }
        self.done.send_replace(true);
    }

    /// Invalidate without signalling completion: waiters keep waiting for
    /// the runner's `finish_sort`, which fires regardless of registry
    /// membership.
    fn invalidate(&self) {
        self.inner.lock().expect("sorting state lock").in_progress = false;
    }

    /// Used on cache teardown, where no runner will ever finish the task.
    pub(super) fn cancel(&self) {
        self.complete(None, Some(DomainError::SortCancelled));
    }
}

impl TieredCache {
    /// Claim or observe the rank task for a key. The caller that receives
    /// `true` owns the task and must call `finish_sort` exactly once; every
    /// other caller gets the same state back and waits on it.
    pub fn get_or_start_sort(
        &self,
        domain: &str,
        record_type: RecordType,
    ) -> (Arc<SortingState>, bool) {
        let key = CacheKey::new(domain, record_type);
        let mut registry = self.sorting.lock().expect("sorting registry lock");
        if let Some(existing) = registry.get(&key) {
            return (Arc::clone(existing), false);
        }
        let state = SortingState::new_in_progress();
        registry.insert(key, Arc::clone(&state));
        (state, true)
    }

    /// Complete a task claimed through `get_or_start_sort`. The state is
    /// updated and signalled even if `cancel_sort` already dropped it from
    /// the registry, so waiters holding the old state still wake up.
    pub fn finish_sort(
        &self,
        _domain: &str,
        _record_type: RecordType,
        result: Option<SortedCacheEntry>,
        error: Option<DomainError>,
        state: &Arc<SortingState>,
    ) {
        let _registry = self.sorting.lock().expect("sorting registry lock");
        state.complete(result, error);
    }

    /// Invalidate an in-flight task and clear the sorted result so a fresh
    /// rank can start at once; used when new addresses arrive mid-sort.
    pub fn cancel_sort(&self, domain: &str, record_type: RecordType) {
        let key = CacheKey::new(domain, record_type);
        {
            let mut registry = self.sorting.lock().expect("sorting registry lock");
            if let Some(state) = registry.remove(&key) {
                state.invalidate();
            }
        }
        self.sorted.remove(&key);
    }

    /// Drop completed states so the registry only holds live tasks.
    pub(super) fn sweep_completed_sorts(&self) {
        let mut registry = self.sorting.lock().expect("sorting registry lock");
        registry.retain(|_, state| state.is_in_progress());
    }

    pub fn sorting_states_len(&self) -> usize {
        self.sorting.lock().expect("sorting registry lock").len()
    }
}
