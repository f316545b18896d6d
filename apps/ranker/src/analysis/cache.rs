use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::fingerprint::Fingerprint;
use crate::models::analysis::AnalysisResult;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stored form of a cached result. The payload is kept as raw JSON so that an
/// entry written by an older build (or a damaged snapshot) surfaces as a miss
/// instead of an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    ttl_ms: i64,
}

impl CacheEntry {
    /// Expired strictly after `created_at + ttl`.
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self
            .created_at
            .checked_add_signed(chrono::Duration::milliseconds(self.ttl_ms))
        {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }
}

/// Fingerprint → analysis result, with per-entry TTL.
///
/// Purely an optimization: every result it serves is one the orchestrator could
/// have produced by calling the service. Expired and malformed entries are
/// dropped on lookup and never returned.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<AnalysisResult> {
        self.get_at(fingerprint, Utc::now())
    }

    pub fn get_at(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Option<AnalysisResult> {
        let mut entries = self.entries.lock();
        let entry = entries.get(fingerprint)?;

        if entry.is_expired(now) {
            debug!("Cache entry {fingerprint} expired, evicting");
            entries.remove(fingerprint);
            return None;
        }

        match serde_json::from_value::<AnalysisResult>(entry.payload.clone()) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Malformed cache entry {fingerprint} treated as miss: {e}");
                entries.remove(fingerprint);
                None
            }
        }
    }

    pub fn put(&self, fingerprint: &Fingerprint, result: &AnalysisResult, ttl: Duration) {
        self.put_at(fingerprint, result, ttl, Utc::now());
    }

    pub fn put_at(
        &self,
        fingerprint: &Fingerprint,
        result: &AnalysisResult,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        let payload = match serde_json::to_value(result) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Could not serialize analysis result for {fingerprint}, not caching: {e}");
                return;
            }
        };
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.entries.lock().insert(
            fingerprint.clone(),
            CacheEntry {
                payload,
                created_at: now,
                ttl_ms,
            },
        );
    }

    /// Sweeps expired entries. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now())
    }

    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Writes all live entries to `path` as JSON.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize, SnapshotError> {
        let now = Utc::now();
        let live: HashMap<Fingerprint, CacheEntry> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(fp, entry)| (fp.clone(), entry.clone()))
            .collect();

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &live)?;
        info!("Saved {} cache entries to {}", live.len(), path.display());
        Ok(live.len())
    }

    /// Restores a cache from `path`. Entries that fail to parse or have already
    /// expired are dropped; only an unreadable or non-JSON file is an error.
    pub fn load_snapshot(path: &Path) -> Result<Self, SnapshotError> {
        Self::load_snapshot_at(path, Utc::now())
    }

    pub fn load_snapshot_at(path: &Path, now: DateTime<Utc>) -> Result<Self, SnapshotError> {
        let reader = BufReader::new(File::open(path)?);
        let raw: HashMap<Fingerprint, serde_json::Value> = serde_json::from_reader(reader)?;
        let total = raw.len();

        let entries: HashMap<Fingerprint, CacheEntry> = raw
            .into_iter()
            .filter_map(|(fp, value)| match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) if !entry.is_expired(now) => Some((fp, entry)),
                Ok(_) => None,
                Err(e) => {
                    warn!("Dropping malformed snapshot entry {fp}: {e}");
                    None
                }
            })
            .collect();

        info!(
            "Restored {}/{} cache entries from {}",
            entries.len(),
            total,
            path.display()
        );
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    #[cfg(test)]
    fn put_raw(&self, fingerprint: &Fingerprint, payload: serde_json::Value, ttl: Duration) {
        self.entries.lock().insert(
            fingerprint.clone(),
            CacheEntry {
                payload,
                created_at: Utc::now(),
                ttl_ms: ttl.as_millis() as i64,
            },
        );
    }
}
