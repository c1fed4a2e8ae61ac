//! # Hot Tier
//!
//! Bounded in-memory tier with least-recently-used eviction and per-entry
//! expiry.
//!
//! ## Layout
//!
//! ```text
//! HotStorage
//!   └─ Mutex<HotInner>
//!        ├─ LruCache<String, StorageEntry>   (MRU ... LRU)
//!        └─ size_bytes                       (sum of serialized sizes)
//! ```
//!
//! The cache itself is unbounded; `max_entries` is enforced here so that
//! expired entries can be reclaimed before any live entry is evicted, and so
//! the mixed tier can intercept a victim before it is dropped.

use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use truestore_core::clock::{system_clock, Clock};
use truestore_core::config::HotConfig;
use truestore_core::entry::StorageEntry;
use truestore_core::error::{Error, Result};
use truestore_core::metrics::{TierMetrics, TierStats};
use truestore_core::serialization::{BincodeSerializer, Serializer};
use truestore_core::traits::Storage;
use truestore_core::value::{Metadata, Value};

/// What to do with the least-recently-used entry when room is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionDecision {
    /// Drop the victim and continue
    Evict,
    /// Leave the victim in place and skip the insertion
    Keep,
}

struct HotInner {
    entries: LruCache<String, StorageEntry>,
    size_bytes: u64,
}

impl HotInner {
    fn insert(&mut self, entry: StorageEntry) {
        self.size_bytes += entry.size_bytes as u64;
        if let Some(old) = self.entries.put(entry.key.clone(), entry) {
            self.size_bytes = self.size_bytes.saturating_sub(old.size_bytes as u64);
        }
    }

    fn remove(&mut self, key: &str) -> Option<StorageEntry> {
        let entry = self.entries.pop(key)?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes as u64);
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<StorageEntry> {
        let (_, entry) = self.entries.pop_lru()?;
        self.size_bytes = self.size_bytes.saturating_sub(entry.size_bytes as u64);
        Some(entry)
    }

    /// Drop every expired entry, returning how many went
    fn purge_expired(&mut self, now_ms: u64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

/// In-memory LRU tier
pub struct HotStorage {
    config: HotConfig,
    inner: Mutex<HotInner>,
    serializer: Arc<dyn Serializer>,
    clock: Arc<dyn Clock>,
    metrics: TierMetrics,
}

impl HotStorage {
    pub fn new(config: HotConfig) -> Result<Self> {
        Self::with_components(config, Arc::new(BincodeSerializer), system_clock())
    }

    /// Build with an explicit serializer (used for size accounting) and clock
    pub fn with_components(
        config: HotConfig,
        serializer: Arc<dyn Serializer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            "Hot tier initialized: max_entries={}, default_ttl={:?}, auto_evict={}",
            config.max_entries, config.default_ttl, config.auto_evict
        );

        Ok(Self {
            config,
            inner: Mutex::new(HotInner {
                entries: LruCache::unbounded(),
                size_bytes: 0,
            }),
            serializer,
            clock,
            metrics: TierMetrics::new(),
        })
    }

    /// Insert or replace `key`, evicting the LRU entry when full
    pub fn store(&self, key: &str, value: Value, metadata: Option<Metadata>) -> Result<()> {
        let entry = self.build_entry(key, value, metadata.unwrap_or_default())?;
        self.insert_with(entry, |_| Ok(EvictionDecision::Evict))
            .map(|_| ())
    }

    pub fn retrieve(&self, key: &str) -> Result<Value> {
        self.retrieve_entry(key).map(|entry| entry.value)
    }

    /// Remove `key`; returns whether a live entry was removed
    pub fn delete(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        let removed = self.inner.lock().remove(key);
        matches!(removed, Some(entry) if !entry.is_expired(now))
    }

    /// Live keys, most recently used first
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Presence check that leaves the recency order untouched
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        matches!(self.inner.lock().entries.peek(key), Some(entry) if !entry.is_expired(now))
    }

    /// Snapshot of an entry's bookkeeping without counting as an access
    pub fn entry_info(&self, key: &str) -> Option<StorageEntry> {
        let now = self.clock.now_ms();
        self.inner
            .lock()
            .entries
            .peek(key)
            .filter(|entry| !entry.is_expired(now))
            .cloned()
    }

    /// Evict up to `count` least-recently-used entries
    pub fn evict_least_used(&self, count: usize) -> usize {
        // The callback never fails or vetoes
        self.evict_with(count, |_| Ok(EvictionDecision::Evict))
            .unwrap_or(0)
    }

    /// Reclaim every expired entry
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let reclaimed = self.inner.lock().purge_expired(now);
        if reclaimed > 0 {
            self.metrics.record_evictions(reclaimed as u64);
            debug!("Hot tier reclaimed {} expired entries", reclaimed);
        }
        reclaimed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.size_bytes = 0;
    }

    /// Physical entry count, including expired entries not yet reclaimed
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.config.max_entries
    }

    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    pub fn get_stats(&self) -> TierStats {
        let inner = self.inner.lock();
        self.metrics.snapshot(inner.entries.len(), inner.size_bytes)
    }

    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    /// Fresh entry sized by this tier's serializer and stamped by its clock
    pub(crate) fn build_entry(&self, key: &str, value: Value, metadata: Metadata) -> Result<StorageEntry> {
        let size_bytes = self.serializer.encoded_len(&value)?;
        Ok(StorageEntry::new(
            key,
            value,
            metadata,
            size_bytes,
            self.clock.now_ms(),
            self.config.default_ttl,
        ))
    }

    /// Re-measure an entry produced by another tier and give it this tier's
    /// expiry unless it carries its own `ttl`
    pub(crate) fn adopt(&self, entry: &mut StorageEntry) -> Result<()> {
        entry.size_bytes = self.serializer.encoded_len(&entry.value)?;
        entry.expires_at_ms = entry.deadline_in_tier(self.clock.now_ms(), self.config.default_ttl);
        Ok(())
    }

    /// Read an entry, counting it as an access
    pub(crate) fn retrieve_entry(&self, key: &str) -> Result<StorageEntry> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.metrics.record_miss();
                return Err(Error::not_found(key));
            }
        };

        if expired {
            inner.remove(key);
            self.metrics.record_evictions(1);
            self.metrics.record_miss();
            trace!("Hot entry {} expired on read", key);
            return Err(Error::not_found(key));
        }

        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now);
                self.metrics.record_hit();
                Ok(entry.clone())
            }
            None => {
                self.metrics.record_miss();
                Err(Error::not_found(key))
            }
        }
    }

    /// Insert `entry`, consulting `on_evict` before each live victim is dropped.
    ///
    /// Returns `Ok(false)` when the callback kept its victim, in which case
    /// nothing was inserted. An error from the callback aborts the insertion
    /// with the victim still in place.
    pub(crate) fn insert_with<F>(&self, entry: StorageEntry, mut on_evict: F) -> Result<bool>
    where
        F: FnMut(&StorageEntry) -> Result<EvictionDecision>,
    {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        let existing = inner
            .entries
            .peek(entry.key.as_str())
            .map(|current| (current.is_expired(now), current.created_at_ms));

        match existing {
            Some((false, created_at_ms)) => {
                inner.insert(entry.with_created_at(created_at_ms));
                return Ok(true);
            }
            Some((true, _)) => {
                inner.remove(&entry.key);
                self.metrics.record_evictions(1);
            }
            None => {}
        }

        if inner.entries.len() >= self.config.max_entries {
            let reclaimed = inner.purge_expired(now);
            if reclaimed > 0 {
                self.metrics.record_evictions(reclaimed as u64);
                debug!("Hot tier reclaimed {} expired entries to make room", reclaimed);
            }
        }

        while inner.entries.len() >= self.config.max_entries {
            if !self.config.auto_evict {
                return Err(Error::Capacity {
                    capacity: self.config.max_entries,
                });
            }

            let Some((_, victim)) = inner.entries.peek_lru() else {
                break;
            };
            if on_evict(victim)? == EvictionDecision::Keep {
                return Ok(false);
            }

            if let Some(victim) = inner.pop_lru() {
                self.metrics.record_evictions(1);
                debug!("Evicted {} from hot tier", victim.key);
            }
        }

        inner.insert(entry);
        Ok(true)
    }

    /// Evict up to `count` LRU entries through `on_evict`; stops at the first veto
    pub(crate) fn evict_with<F>(&self, count: usize, mut on_evict: F) -> Result<usize>
    where
        F: FnMut(&StorageEntry) -> Result<EvictionDecision>,
    {
        let mut inner = self.inner.lock();
        let mut evicted = 0;

        while evicted < count {
            let Some((_, victim)) = inner.entries.peek_lru() else {
                break;
            };
            if on_evict(victim)? == EvictionDecision::Keep {
                break;
            }
            if inner.pop_lru().is_some() {
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.metrics.record_evictions(evicted as u64);
            debug!("Evicted {} entries from hot tier", evicted);
        }
        Ok(evicted)
    }
}

impl Storage for HotStorage {
    fn store(&self, key: &str, value: Value, metadata: Option<Metadata>) -> Result<()> {
        HotStorage::store(self, key, value, metadata)
    }

    fn retrieve(&self, key: &str) -> Result<Value> {
        HotStorage::retrieve(self, key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        HotStorage::delete(self, key);
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(HotStorage::contains(self, key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(HotStorage::keys(self))
    }

    fn clear(&self) -> Result<()> {
        HotStorage::clear(self);
        Ok(())
    }

    fn tier_stats(&self) -> TierStats {
        self.get_stats()
    }
}

impl std::fmt::Debug for HotStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotStorage")
            .field("max_entries", &self.config.max_entries)
            .field("len", &self.len())
            .finish()
    }
}
