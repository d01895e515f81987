//! Validation result cache
//!
//! Read-through cache for successful Remote validation results. Entries are
//! keyed by a SHA-256 digest of the full token and expire at
//! `min(token exp, insertion + ceiling)`. Expired entries are purged lazily
//! on lookup, and an insert sweeps the whole map once the earliest stored
//! entry has expired. Failures are never stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::validator::ValidationResult;

/// Minimum spacing between two sweeps triggered by inserts
const PURGE_INTERVAL: Duration = Duration::from_secs(10);

/// Cache key for a token: base64url(SHA-256(token))
pub fn token_key(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ValidationResult,
    expires_at: SystemTime,
}

/// Concurrent cache of Remote validation results for one authority
#[derive(Debug)]
pub struct ValidationResultCache {
    entries: DashMap<String, CacheEntry>,
    ceiling: Duration,
    /// Earliest `expires_at` among stored entries, epoch millis
    next_expiry: AtomicU64,
    /// Time of the last sweep, epoch millis
    last_purge: AtomicU64,
}

impl ValidationResultCache {
    /// Create a cache whose entries live at most `ceiling`
    pub fn new(ceiling: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ceiling,
            next_expiry: AtomicU64::new(u64::MAX),
            last_purge: AtomicU64::new(0),
        }
    }

    /// TTL ceiling
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Look up a token
    pub fn get(&self, token: &str) -> Option<ValidationResult> {
        self.get_at(token, SystemTime::now())
    }

    /// Look up a token as of `now`. An entry at or past its expiry is a miss
    /// and is removed.
    pub fn get_at(&self, token: &str, now: SystemTime) -> Option<ValidationResult> {
        let key = token_key(token);

        if self
            .entries
            .remove_if(&key, |_, entry| now >= entry.expires_at)
            .is_some()
        {
            debug!("Evicted expired validation result");
            return None;
        }

        self.entries.get(&key).map(|entry| entry.result.clone())
    }

    /// Store a successful result
    pub fn put(&self, token: &str, result: ValidationResult) {
        self.put_at(token, result, SystemTime::now());
    }

    /// Store a successful result as of `now`.
    ///
    /// Expiry is the earlier of the result's `exp` and `now + ceiling`. A
    /// result that is already expired is not stored.
    pub fn put_at(&self, token: &str, result: ValidationResult, now: SystemTime) {
        let ceiling = now + self.ceiling;
        let expires_at = match result.expires_at {
            Some(exp) => ceiling.min(UNIX_EPOCH + Duration::from_secs(exp)),
            None => ceiling,
        };

        if expires_at <= now {
            debug!("Not caching validation result past its expiry");
            return;
        }

        let now_ms = epoch_millis(now);
        if now_ms >= self.next_expiry.load(Ordering::Relaxed)
            && now_ms >= self.last_purge.load(Ordering::Relaxed) + millis(PURGE_INTERVAL)
        {
            self.purge_expired_at(now);
        }

        self.entries.insert(token_key(token), CacheEntry { result, expires_at });
        self.next_expiry.fetch_min(epoch_millis(expires_at), Ordering::Relaxed);
    }

    /// Remove every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(SystemTime::now())
    }

    /// Remove every entry expired as of `now`
    pub fn purge_expired_at(&self, now: SystemTime) -> usize {
        self.last_purge.store(epoch_millis(now), Ordering::Relaxed);
        self.next_expiry.store(u64::MAX, Ordering::Relaxed);

        let mut purged = 0;
        let mut earliest = u64::MAX;
        self.entries.retain(|_, entry| {
            if now >= entry.expires_at {
                purged += 1;
                false
            } else {
                earliest = earliest.min(epoch_millis(entry.expires_at));
                true
            }
        });
        self.next_expiry.fetch_min(earliest, Ordering::Relaxed);

        if purged > 0 {
            debug!(purged, remaining = self.entries.len(), "Purged expired validation results");
        }
        purged
    }

    /// Drop the entry for a token, returning whether one existed
    pub fn invalidate(&self, token: &str) -> bool {
        self.entries.remove(&token_key(token)).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = SystemTime::now();
        let total_entries = self.entries.len();
        let expired_entries = self
            .entries
            .iter()
            .filter(|entry| now >= entry.expires_at)
            .count();

        CacheStats {
            total_entries,
            expired_entries,
            valid_entries: total_entries.saturating_sub(expired_entries),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn epoch_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(millis).unwrap_or(0)
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of cache entries
    pub total_entries: usize,

    /// Number of expired entries not yet purged
    pub expired_entries: usize,

    /// Number of valid entries
    pub valid_entries: usize,
}
