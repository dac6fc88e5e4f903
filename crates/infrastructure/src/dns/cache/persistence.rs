use super::entry::PersistedCacheEntry;
use super::storage::{RawWrite, TieredCache};
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use tracing::{debug, info};
use velo_dns_domain::{DomainError, RecordType};

impl TieredCache {
    /// Snapshot the raw tier to disk. Atomic: the snapshot is written to a
    /// sibling temp file and renamed over the target, so a crash mid-write
    /// leaves the previous snapshot intact. Skips entirely when nothing
    /// changed since the last save.
    pub fn save_to_disk(&self, path: &Path) -> Result<(), DomainError> {
        let dirty = self.dirty.load(AtomicOrdering::Relaxed);
        if self.last_saved_dirty.load(AtomicOrdering::Relaxed) == dirty {
            return Ok(());
        }

        let entries: Vec<PersistedCacheEntry> = {
            let raw = self.raw.lock().expect("raw tier lock");
            raw.iter()
                .map(|(key, entry)| PersistedCacheEntry {
                    domain: key.domain.to_string(),
                    qtype: key.record_type.to_u16(),
                    ips: entry.ips.clone(),
                    cnames: entry.cnames.iter().map(|c| c.to_string()).collect(),
                })
                .collect()
        };

        let payload = serde_json::to_vec(&entries)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, payload)?;
        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }

        self.last_saved_dirty.store(dirty, AtomicOrdering::Relaxed);
        debug!(entries = entries.len(), path = %path.display(), "Raw cache persisted");
        Ok(())
    }

    /// Best-effort restore: a missing file is an empty cache, a malformed
    /// one is the caller's problem. Restored entries carry the configured
    /// default TTL and version 0, so any live resolution replaces them.
    pub fn load_from_disk(&self, path: &Path) -> Result<usize, DomainError> {
        let payload = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let entries: Vec<PersistedCacheEntry> = serde_json::from_slice(&payload)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;

        let loaded = entries.len();
        for persisted in entries {
            let cnames: Vec<Arc<str>> = persisted
                .cnames
                .iter()
                .map(|c| Arc::from(c.as_str()))
                .collect();
            let write = RawWrite {
                ips: persisted.ips,
                cnames,
                records: Vec::new(),
                ttl: self.config.persisted_entry_ttl_secs,
                authenticated: false,
            };
            self.set_raw(
                &persisted.domain,
                RecordType::from_u16(persisted.qtype),
                write,
                0,
            );
        }

        // The load itself dirtied the tier; don't save it straight back.
        self.last_saved_dirty
            .store(self.dirty.load(AtomicOrdering::Relaxed), AtomicOrdering::Relaxed);

        info!(loaded, path = %path.display(), "Raw cache restored from disk");
        Ok(loaded)
    }
}
