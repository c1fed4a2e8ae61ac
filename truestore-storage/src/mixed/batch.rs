use std::collections::HashMap;

use tracing::{debug, warn};

use truestore_core::error::Result;
use truestore_core::value::{Metadata, Value};

use super::MixedStorage;

/// Buffered writes against a [`MixedStorage`].
///
/// Nothing is applied until [`commit`](MixedBatch::commit). A batch dropped
/// without committing is discarded, so an early return with `?` never leaves
/// half a batch behind.
pub struct MixedBatch<'a> {
    storage: &'a MixedStorage,
    pending: Vec<(String, Value, Metadata)>,
    positions: HashMap<String, usize>,
}

impl<'a> MixedBatch<'a> {
    pub(super) fn new(storage: &'a MixedStorage) -> Self {
        Self {
            storage,
            pending: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Queue a write; a later write to the same key replaces this one
    pub fn store(&mut self, key: &str, value: Value, metadata: Option<Metadata>) -> &mut Self {
        let metadata = metadata.unwrap_or_default();
        match self.positions.get(key) {
            Some(&slot) => self.pending[slot] = (key.to_string(), value, metadata),
            None => {
                self.positions.insert(key.to_string(), self.pending.len());
                self.pending.push((key.to_string(), value, metadata));
            }
        }
        self
    }

    /// Number of distinct keys queued
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every queued write under a single lock acquisition.
    ///
    /// Writes are applied in first-queued order and stop at the first error;
    /// writes before it stay applied.
    pub fn commit(mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending);
        self.positions.clear();

        let count = pending.len();
        let mut records = self.storage.records.lock();
        for (key, value, metadata) in pending {
            self.storage.store_locked(&mut records, &key, value, metadata)?;
        }

        debug!("Committed batch of {} writes", count);
        Ok(count)
    }

    /// Drop every queued write
    pub fn discard(mut self) {
        self.pending.clear();
        self.positions.clear();
    }
}

impl Drop for MixedBatch<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!("Discarding {} uncommitted batch writes", self.pending.len());
        }
    }
}
