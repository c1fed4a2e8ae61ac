//! # Cold Tier
//!
//! Durable, compressed, one-file-per-key storage on the local filesystem.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Cold Directory Layout                 │
//! ├──────────────────────────────────────────────────────────┤
//! │  <stem>.bin   Payload                                    │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │ Magic (4 bytes): "TSC1"                            │  │
//! │  │ Compression algorithm id (1 byte)                  │  │
//! │  │ CRC32 of body (4 bytes, little-endian)             │  │
//! │  │ Body: compressed serialized value                  │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │  <stem>.meta  JSON EntryRecord (key, sizes, timestamps)  │
//! │  .tsw-*.tmp   In-flight writes, removed at open          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! `<stem>` is `k` + hex(key) for short keys and `h` + hex(sha256(key))
//! otherwise.
//!
//! ## Write path
//!
//! serialize -> compress -> temp file -> fsync -> rename onto `<stem>.bin`,
//! then the same for `<stem>.meta`. A crash at any point leaves either the
//! previous payload or the new one; a payload whose record is missing or
//! stale is repaired by the scan at open.
//!
//! ## Concurrency
//!
//! Writers to the same key serialize on one of 64 striped locks; the index
//! is a `RwLock<HashMap>` so lookups on disjoint keys never contend on I/O.

mod file;
mod types;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, trace};

use truestore_core::clock::{deadline_after, system_clock, Clock};
use truestore_core::compression::{Codec, Compressor};
use truestore_core::config::ColdConfig;
use truestore_core::entry::StorageEntry;
use truestore_core::error::{Error, Result};
use truestore_core::metrics::{TierMetrics, TierStats};
use truestore_core::serialization::Serializer;
use truestore_core::traits::Storage;
use truestore_core::value::{Metadata, Value};

pub use types::{EntryRecord, RecoveryReport, MAX_PLAIN_KEY_BYTES, PAYLOAD_MAGIC};

/// Compressed on-disk tier
pub struct ColdStorage {
    config: ColdConfig,
    root: PathBuf,
    index: RwLock<HashMap<String, EntryRecord>>,
    stripes: Box<[Mutex<()>]>,
    serializer: Arc<dyn Serializer>,
    compressor: Arc<dyn Compressor>,
    clock: Arc<dyn Clock>,
    metrics: TierMetrics,
    recovery: RecoveryReport,
}

impl ColdStorage {
    /// Open (or create) the tier at `config.root_dir`
    pub fn open(config: ColdConfig) -> Result<Self> {
        let serializer = config.serializer.build();
        let compressor = config.compression.build();
        Self::open_with(config, serializer, compressor, system_clock())
    }

    pub fn open_with(
        config: ColdConfig,
        serializer: Arc<dyn Serializer>,
        compressor: Arc<dyn Compressor>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let root = config.root_dir.clone();
        fs::create_dir_all(&root)
            .map_err(|e| Error::io(format!("Failed to create cold directory {:?}", root), e))?;

        let default_ttl = config.default_ttl;
        let (index, recovery) = file::recover(
            &root,
            clock.now_ms(),
            |now| default_ttl.map(|ttl| deadline_after(now, ttl)),
            config.sync_writes,
        )?;

        info!(
            "Cold tier opened at {:?}: {} entries, compression={}, serializer={} \
             (rebuilt={}, dropped={}, temp_removed={}, orphan_meta_removed={})",
            root,
            index.len(),
            compressor.algorithm().name(),
            serializer.name(),
            recovery.rebuilt,
            recovery.dropped,
            recovery.temp_files_removed,
            recovery.orphan_meta_removed,
        );

        Ok(Self {
            config,
            root,
            index: RwLock::new(index),
            stripes: (0..types::LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            serializer,
            compressor,
            clock,
            metrics: TierMetrics::new(),
            recovery,
        })
    }

    /// Insert or replace `key` durably
    pub fn store(&self, key: &str, value: Value, metadata: Option<Metadata>) -> Result<()> {
        let body = self.serializer.encode(&value)?;
        let entry = StorageEntry::new(
            key,
            value,
            metadata.unwrap_or_default(),
            body.len(),
            self.clock.now_ms(),
            self.config.default_ttl,
        );
        self.write_encoded(&entry, body, entry.expires_at_ms)
    }

    pub fn retrieve(&self, key: &str) -> Result<Value> {
        self.retrieve_entry(key).map(|entry| entry.value)
    }

    /// Remove `key`; returns whether a live entry was removed
    pub fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        let _guard = self.stripe(key);
        let removed = self.remove_locked(key)?;
        Ok(matches!(removed, Some(record) if !record.is_expired(now)))
    }

    /// Live keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut keys: Vec<String> = self
            .index
            .read()
            .values()
            .filter(|record| !record.is_expired(now))
            .map(|record| record.key.clone())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        matches!(self.index.read().get(key), Some(record) if !record.is_expired(now))
    }

    /// Stored record for `key` without reading the payload
    pub fn entry_info(&self, key: &str) -> Option<EntryRecord> {
        let now = self.clock.now_ms();
        self.index
            .read()
            .get(key)
            .filter(|record| !record.is_expired(now))
            .cloned()
    }

    /// Delete every expired entry from disk
    pub fn cleanup_expired(&self) -> Result<usize> {
        let now = self.clock.now_ms();
        let expired: Vec<String> = self
            .index
            .read()
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.key.clone())
            .collect();

        let mut reclaimed = 0;
        for key in &expired {
            let _guard = self.stripe(key);
            // Re-check under the stripe lock; the key may have been rewritten
            let still_expired = matches!(self.index.read().get(key), Some(record) if record.is_expired(now));
            if still_expired && self.remove_locked(key)?.is_some() {
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            self.metrics.record_evictions(reclaimed as u64);
            debug!("Cold tier reclaimed {} expired entries", reclaimed);
        }
        Ok(reclaimed)
    }

    /// Delete every entry
    pub fn clear(&self) -> Result<()> {
        let keys: Vec<String> = self.index.read().keys().cloned().collect();
        for key in &keys {
            let _guard = self.stripe(key);
            self.remove_locked(key)?;
        }
        info!("Cold tier cleared: {} entries removed", keys.len());
        Ok(())
    }

    /// Indexed entry count, including expired entries not yet reclaimed
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Repairs performed when this instance was opened
    pub fn recovery_report(&self) -> RecoveryReport {
        self.recovery
    }

    pub fn get_stats(&self) -> TierStats {
        let index = self.index.read();
        let disk_bytes = index.values().map(|record| record.stored_size).sum();
        self.metrics.snapshot(index.len(), disk_bytes)
    }

    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    /// Write an entry carried over from another tier, keeping its bookkeeping.
    /// Expiry is re-derived for this tier unless the entry has its own `ttl`.
    pub(crate) fn put_entry(&self, entry: &StorageEntry) -> Result<()> {
        let body = self.serializer.encode(&entry.value)?;
        let expires_at_ms = entry.deadline_in_tier(self.clock.now_ms(), self.config.default_ttl);
        self.write_encoded(entry, body, expires_at_ms)
    }

    /// Read an entry, counting it as an access
    pub(crate) fn retrieve_entry(&self, key: &str) -> Result<StorageEntry> {
        let now = self.clock.now_ms();
        let _guard = self.stripe(key);

        let record = match self.index.read().get(key) {
            Some(record) => record.clone(),
            None => {
                self.metrics.record_miss();
                return Err(Error::not_found(key));
            }
        };

        if record.is_expired(now) {
            self.remove_locked(key)?;
            self.metrics.record_evictions(1);
            self.metrics.record_miss();
            trace!("Cold entry {} expired on read", key);
            return Err(Error::not_found(key));
        }

        let value = match self.read_value(&record) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_miss();
                return Err(e);
            }
        };

        let mut index = self.index.write();
        let record = match index.get_mut(key) {
            Some(record) => {
                record.last_accessed_ms = now;
                record.access_count += 1;
                record.clone()
            }
            None => record,
        };
        drop(index);

        self.metrics.record_hit();
        Ok(record.into_entry(value))
    }

    fn read_value(&self, record: &EntryRecord) -> Result<Value> {
        let key = record.key.as_str();
        let stem = file::stem_for(key);
        let path = file::payload_path(&self.root, &stem);
        let bytes = fs::read(&path).map_err(|e| Error::io(format!("Failed to read {:?}", path), e))?;

        let (header, body) = file::decode_payload(key, &bytes)?;
        if header.checksum != record.checksum {
            return Err(Error::corruption(key, "Payload does not match its record"));
        }

        let raw = if header.algorithm == self.compressor.algorithm() {
            self.compressor.decompress(body)
        } else {
            Codec::for_reading(header.algorithm).decompress(body)
        }
        .map_err(|e| Error::corruption(key, format!("Decompression failed: {}", e)))?;

        self.serializer
            .decode(&raw)
            .map_err(|e| Error::corruption(key, format!("Deserialization failed: {}", e)))
    }

    fn write_encoded(&self, entry: &StorageEntry, body: Vec<u8>, expires_at_ms: Option<u64>) -> Result<()> {
        let key = entry.key.as_str();
        let compressed = self.compressor.compress(&body)?;
        let payload = file::encode_payload(self.compressor.algorithm(), &compressed)?;
        let stem = file::stem_for(key);
        let now = self.clock.now_ms();

        let _guard = self.stripe(key);

        let created_at_ms = self
            .index
            .read()
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map_or(entry.created_at_ms, |record| record.created_at_ms);

        let record = EntryRecord {
            key: key.to_string(),
            value_size: body.len(),
            stored_size: payload.len() as u64,
            created_at_ms,
            last_accessed_ms: entry.last_accessed_ms,
            access_count: entry.access_count,
            expires_at_ms,
            checksum: crc32fast::hash(&compressed),
            compression: self.compressor.algorithm(),
            metadata: entry.metadata.clone(),
        };

        let sync = self.config.sync_writes;
        file::write_atomic(&self.root, &file::payload_path(&self.root, &stem), &payload, sync)?;

        // The payload is durable from here on; the index follows the disk
        // even if the record write fails, and the scan at open repairs it.
        let meta_result = file::write_meta(&self.root, &file::meta_path(&self.root, &stem), &record, sync);
        self.index.write().insert(key.to_string(), record);
        meta_result?;

        debug!(
            "Stored {} in cold tier: {} -> {} bytes",
            key,
            body.len(),
            payload.len()
        );
        Ok(())
    }

    /// Caller holds the key's stripe lock
    fn remove_locked(&self, key: &str) -> Result<Option<EntryRecord>> {
        if !self.index.read().contains_key(key) {
            return Ok(None);
        }

        let stem = file::stem_for(key);
        file::remove_if_exists(&file::payload_path(&self.root, &stem))?;
        file::remove_if_exists(&file::meta_path(&self.root, &stem))?;
        Ok(self.index.write().remove(key))
    }

    fn stripe(&self, key: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let slot = (hasher.finish() as usize) % self.stripes.len();
        self.stripes[slot].lock()
    }
}

impl Storage for ColdStorage {
    fn store(&self, key: &str, value: Value, metadata: Option<Metadata>) -> Result<()> {
        ColdStorage::store(self, key, value, metadata)
    }

    fn retrieve(&self, key: &str) -> Result<Value> {
        ColdStorage::retrieve(self, key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        ColdStorage::delete(self, key).map(|_| ())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(ColdStorage::contains(self, key))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(ColdStorage::keys(self))
    }

    fn clear(&self) -> Result<()> {
        ColdStorage::clear(self)
    }

    fn tier_stats(&self) -> TierStats {
        self.get_stats()
    }
}

impl std::fmt::Debug for ColdStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColdStorage")
            .field("root", &self.root)
            .field("len", &self.len())
            .finish()
    }
}
