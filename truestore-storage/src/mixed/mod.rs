//! # Mixed Tier
//!
//! Composes a [`HotStorage`] and a [`ColdStorage`] behind one interface and
//! moves keys between them by access frequency.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        MixedStorage                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  retrieve ──► Hot ──hit──► value                            │
//! │                │                                            │
//! │               miss ──► Cold ──hit──► score > threshold?     │
//! │                                        │ yes: promote (Both)│
//! │                                                             │
//! │  store ──► Hot (write-through to Cold when a copy exists)   │
//! │             └─ full: LRU victim demoted to Cold first       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every key touched through this tier has a [`MigrationRecord`] holding its
//! location and a score that gains 1.0 per access and halves once per
//! elapsed decay window.
//!
//! Lock order: policy state, then the hot tier, then a cold stripe.

mod batch;
mod policy;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use truestore_core::clock::{system_clock, Clock};
use truestore_core::config::Config;
use truestore_core::entry::StorageEntry;
use truestore_core::error::{Error, Result};
use truestore_core::metrics::{MixedStats, TierStats};
use truestore_core::traits::Storage;
use truestore_core::value::{metadata_tier_hint, Metadata, TierHint, Value};

use crate::cold::ColdStorage;
use crate::hot::{EvictionDecision, HotStorage};

pub use batch::MixedBatch;
pub use policy::{MigrationPolicy, MigrationRecord, TierLocation};

type Records = HashMap<String, MigrationRecord>;

#[derive(Debug, Default)]
struct MixedCounters {
    hot_hits: AtomicU64,
    cold_hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    demotions: AtomicU64,
}

impl MixedCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.hot_hits,
            &self.cold_hits,
            &self.misses,
            &self.promotions,
            &self.demotions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Hot + cold tiers with frequency-driven migration
pub struct MixedStorage {
    hot: HotStorage,
    cold: ColdStorage,
    policy: MigrationPolicy,
    clock: Arc<dyn Clock>,
    records: Mutex<Records>,
    counters: MixedCounters,
}

impl MixedStorage {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Build both tiers from `config`, sharing one clock
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let serializer = config.cold.serializer.build();
        let hot = HotStorage::with_components(config.hot.clone(), Arc::clone(&serializer), Arc::clone(&clock))?;
        let cold = ColdStorage::open_with(
            config.cold.clone(),
            serializer,
            config.cold.compression.build(),
            Arc::clone(&clock),
        )?;

        let policy = MigrationPolicy::from(&config.migration);
        info!(
            "Mixed tier initialized: promotion_threshold={}, decay_window_ms={}",
            policy.threshold(),
            policy.decay_window_ms()
        );

        Ok(Self {
            hot,
            cold,
            policy,
            clock,
            records: Mutex::new(HashMap::new()),
            counters: MixedCounters::default(),
        })
    }

    /// Store `key`, placing it according to its hint and access history
    pub fn store(&self, key: &str, value: Value, metadata: Option<Metadata>) -> Result<()> {
        let mut records = self.records.lock();
        self.store_locked(&mut records, key, value, metadata.unwrap_or_default())
    }

    /// Hot first, then cold; a frequently read cold key is promoted
    pub fn retrieve(&self, key: &str) -> Result<Value> {
        let now = self.clock.now_ms();
        let window = self.policy.decay_window_ms();
        let mut guard = self.records.lock();
        let records = &mut *guard;

        match self.hot.retrieve_entry(key) {
            Ok(entry) => {
                MixedCounters::bump(&self.counters.hot_hits);
                let location = if self.cold.contains(key) {
                    TierLocation::Both
                } else {
                    TierLocation::Hot
                };
                let record = records
                    .entry(key.to_string())
                    .or_insert_with(|| MigrationRecord::new(location, now));
                record.location = location;
                record.record_access(now, window);
                return Ok(entry.value);
            }
            Err(e) if !e.is_not_found() => return Err(e),
            Err(_) => {}
        }

        let entry = match self.cold.retrieve_entry(key) {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => {
                MixedCounters::bump(&self.counters.misses);
                records.remove(key);
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        MixedCounters::bump(&self.counters.cold_hits);

        let record = records
            .entry(key.to_string())
            .or_insert_with(|| MigrationRecord::new(TierLocation::Cold, now));
        record.location = TierLocation::Cold;
        record.record_access(now, window);
        let score = record.score;

        // Promotion is best effort; the cold read already succeeded
        if self.policy.should_promote(score) {
            if let Err(e) = self.promote(records, entry.clone(), score) {
                warn!("Promotion of {} skipped: {}", key, e);
            }
        }
        Ok(entry.value)
    }

    /// Remove `key` from both tiers
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut records = self.records.lock();
        self.cold.delete(key)?;
        self.hot.delete(key);
        records.remove(key);
        Ok(())
    }

    /// Buffer writes and apply them together on [`MixedBatch::commit`]
    pub fn batch(&self) -> MixedBatch<'_> {
        MixedBatch::new(self)
    }

    /// Run `f` against a batch and commit it when `f` succeeds
    pub fn batch_scope<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut MixedBatch<'_>) -> Result<T>,
    {
        let mut batch = self.batch();
        let out = f(&mut batch)?;
        batch.commit()?;
        Ok(out)
    }

    /// Load cold keys into the hot tier regardless of score.
    /// Returns how many keys were promoted; stops once a full hot tier
    /// cannot evict.
    pub fn warm_up<I, K>(&self, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let now = self.clock.now_ms();
        let mut guard = self.records.lock();
        let records = &mut *guard;
        let mut promoted = 0;

        for key in keys {
            let key = key.as_ref();
            if self.hot.contains(key) || !self.cold.contains(key) {
                continue;
            }

            let mut entry = match self.cold.retrieve_entry(key) {
                Ok(entry) => entry,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            self.hot.adopt(&mut entry)?;

            let inserted = match self.hot.insert_with(entry, |victim| self.demote(records, victim)) {
                Ok(inserted) => inserted,
                Err(Error::Capacity { .. }) => break,
                Err(e) => return Err(e),
            };
            if inserted {
                records
                    .entry(key.to_string())
                    .or_insert_with(|| MigrationRecord::new(TierLocation::Both, now))
                    .location = TierLocation::Both;
                MixedCounters::bump(&self.counters.promotions);
                promoted += 1;
            }
        }

        if promoted > 0 {
            info!("Warmed up hot tier with {} keys", promoted);
        }
        Ok(promoted)
    }

    /// Evict up to `count` hot entries, demoting hot-only ones to cold
    pub fn evict_least_used(&self, count: usize) -> Result<usize> {
        let mut guard = self.records.lock();
        let records = &mut *guard;
        self.hot.evict_with(count, |victim| self.demote(records, victim))
    }

    /// Reclaim expired entries in both tiers and forget keys that are gone
    pub fn cleanup_expired(&self) -> Result<usize> {
        let mut records = self.records.lock();
        let reclaimed = self.hot.cleanup_expired() + self.cold.cleanup_expired()?;

        records.retain(|key, record| {
            match TierLocation::from_presence(self.hot.contains(key), self.cold.contains(key)) {
                Some(location) => {
                    record.location = location;
                    true
                }
                None => false,
            }
        });
        Ok(reclaimed)
    }

    /// Live keys across both tiers, sorted and deduplicated
    pub fn keys(&self) -> Vec<String> {
        let mut keys = self.hot.keys();
        keys.extend(self.cold.keys());
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.hot.contains(key) || self.cold.contains(key)
    }

    pub fn clear(&self) -> Result<()> {
        let mut records = self.records.lock();
        self.cold.clear()?;
        self.hot.clear();
        records.clear();
        Ok(())
    }

    /// Where `key` lives right now
    pub fn location(&self, key: &str) -> Option<TierLocation> {
        let _records = self.records.lock();
        TierLocation::from_presence(self.hot.contains(key), self.cold.contains(key))
    }

    /// Current (decayed) frequency score of `key`
    pub fn score(&self, key: &str) -> Option<f64> {
        let now = self.clock.now_ms();
        self.records
            .lock()
            .get(key)
            .map(|record| record.score_at(now, self.policy.decay_window_ms()))
    }

    pub fn hot(&self) -> &HotStorage {
        &self.hot
    }

    pub fn cold(&self) -> &ColdStorage {
        &self.cold
    }

    pub fn get_stats(&self) -> MixedStats {
        let hot_hits = self.counters.hot_hits.load(Ordering::Relaxed);
        let cold_hits = self.counters.cold_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hot_hits + cold_hits + misses;

        MixedStats {
            hot: self.hot.get_stats(),
            cold: self.cold.get_stats(),
            hot_hits,
            cold_hits,
            misses,
            promotions: self.counters.promotions.load(Ordering::Relaxed),
            demotions: self.counters.demotions.load(Ordering::Relaxed),
            hot_hit_ratio: if lookups == 0 {
                0.0
            } else {
                hot_hits as f64 / lookups as f64
            },
        }
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
        self.hot.reset_stats();
        self.cold.reset_stats();
    }

    /// One policy evaluation for one write; callers hold the records lock
    pub(crate) fn store_locked(
        &self,
        records: &mut Records,
        key: &str,
        value: Value,
        metadata: Metadata,
    ) -> Result<()> {
        let now = self.clock.now_ms();
        let window = self.policy.decay_window_ms();
        let hint = metadata_tier_hint(&metadata);

        let current = match records.get(key) {
            Some(record) => Some(record.location),
            None => TierLocation::from_presence(self.hot.contains(key), self.cold.contains(key)),
        };
        let score = {
            let record = records
                .entry(key.to_string())
                .or_insert_with(|| MigrationRecord::new(current.unwrap_or(TierLocation::Hot), now));
            record.record_access(now, window);
            record.score
        };

        let cold_only = current == Some(TierLocation::Cold) && !self.hot.contains(key);
        let stay_cold = hint == Some(TierHint::Cold)
            || (hint.is_none() && cold_only && self.hot.is_full() && self.policy.keep_cold(score));

        if stay_cold {
            let result = self.cold.store(key, value, Some(metadata));
            if result.is_ok() {
                self.hot.delete(key);
            }
            self.sync_location(records, key);
            return result;
        }

        let entry = self.hot.build_entry(key, value, metadata)?;
        let has_cold_copy = self.cold.contains(key);
        if has_cold_copy {
            if let Err(e) = self.cold.put_entry(&entry) {
                self.sync_location(records, key);
                return Err(e);
            }
        }

        let result = self.hot.insert_with(entry, |victim| self.demote(records, victim));
        self.sync_location(records, key);
        match result {
            // The new value is already durable in cold; leave the key cold-only
            Err(e) if has_cold_copy => {
                debug!("Kept {} in cold tier only: {}", key, e);
                Ok(())
            }
            result => result.map(|_| ()),
        }
    }

    /// Copy a cold hit into the hot tier if it outranks the hot LRU entry
    fn promote(&self, records: &mut Records, mut entry: StorageEntry, score: f64) -> Result<()> {
        let now = self.clock.now_ms();
        let window = self.policy.decay_window_ms();
        let key = entry.key.clone();
        self.hot.adopt(&mut entry)?;

        let promoted = match self.hot.insert_with(entry, |victim| {
            let victim_score = records
                .get(&victim.key)
                .map_or(0.0, |record| record.score_at(now, window));
            if !self.policy.displaces(score, victim_score) {
                return Ok(EvictionDecision::Keep);
            }
            self.demote(records, victim)
        }) {
            Ok(promoted) => promoted,
            // Full with eviction disabled: no room to promote into
            Err(Error::Capacity { .. }) => false,
            Err(e) => return Err(e),
        };

        if promoted {
            if let Some(record) = records.get_mut(&key) {
                record.location = TierLocation::Both;
            }
            MixedCounters::bump(&self.counters.promotions);
            debug!("Promoted {} to hot tier (score {:.2})", key, score);
        }
        Ok(())
    }

    /// Make sure a hot victim survives in cold before the hot tier drops it
    fn demote(&self, records: &mut Records, victim: &StorageEntry) -> Result<EvictionDecision> {
        let now = self.clock.now_ms();
        let key = victim.key.as_str();

        let backed_by_cold = match records.get(key) {
            Some(record) => record.location == TierLocation::Both && self.cold.contains(key),
            None => self.cold.contains(key),
        };

        if !backed_by_cold {
            self.cold.put_entry(victim).map_err(|e| Error::Migration {
                key: key.to_string(),
                message: format!("Demotion to cold tier failed: {}", e),
            })?;
            MixedCounters::bump(&self.counters.demotions);
            debug!("Demoted {} to cold tier", key);
        }

        records
            .entry(key.to_string())
            .or_insert_with(|| MigrationRecord::new(TierLocation::Cold, now))
            .location = TierLocation::Cold;
        Ok(EvictionDecision::Evict)
    }

    /// Re-derive the record location from what the tiers hold
    fn sync_location(&self, records: &mut Records, key: &str) {
        match TierLocation::from_presence(self.hot.contains(key), self.cold.contains(key)) {
            Some(location) => {
                if let Some(record) = records.get_mut(key) {
                    record.location = location;
                }
            }
            None => {
                records.remove(key);
            }
        }
    }
}

impl Storage for MixedStorage {
    fn store(&self, key: &str, value: Value, metadata: Option<Metadata>) -> Result<()> {
        MixedStorage::store(self, key, value, metadata)
    }

    fn retrieve(&self, key: &str) -> Result<Value> {
        MixedStorage::retrieve(self, key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        MixedStorage::delete(self, key)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(MixedStorage::contains(self, key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(MixedStorage::keys(self))
    }

    fn clear(&self) -> Result<()> {
        MixedStorage::clear(self)
    }

    fn tier_stats(&self) -> TierStats {
        self.get_stats().combined()
    }
}

impl std::fmt::Debug for MixedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixedStorage")
            .field("hot", &self.hot)
            .field("cold", &self.cold)
            .field("policy", &self.policy)
            .finish()
    }
}
