//! # Storage Entries
//!
//! [`StorageEntry`] is the unit every tier stores. Tiers differ in how they
//! hold the value (in memory vs. compressed on disk), so migration recreates
//! the entry in the destination tier rather than moving a reference.

use std::time::Duration;

use crate::clock::deadline_after;
use crate::value::{metadata_ttl, Metadata, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Value,
    pub metadata: Metadata,
    /// Length of the serialized value
    pub size_bytes: usize,
    pub created_at_ms: u64,
    pub last_accessed_ms: u64,
    pub access_count: u64,
    /// `None` means the entry never expires
    pub expires_at_ms: Option<u64>,
}

impl StorageEntry {
    /// Build a fresh entry. The `ttl` metadata key wins over `default_ttl`.
    pub fn new(
        key: impl Into<String>,
        value: Value,
        metadata: Metadata,
        size_bytes: usize,
        now_ms: u64,
        default_ttl: Option<Duration>,
    ) -> Self {
        let expires_at_ms = metadata_ttl(&metadata)
            .or(default_ttl)
            .map(|ttl| deadline_after(now_ms, ttl));

        Self {
            key: key.into(),
            value,
            metadata,
            size_bytes,
            created_at_ms: now_ms,
            last_accessed_ms: now_ms,
            access_count: 0,
            expires_at_ms,
        }
    }

    /// Carry the creation time over from the entry being replaced
    pub fn with_created_at(mut self, created_at_ms: u64) -> Self {
        self.created_at_ms = created_at_ms;
        self
    }

    /// Deadline for this entry once it is recreated in a tier whose default
    /// is `default_ttl`. An explicit `ttl` keeps the original deadline;
    /// otherwise the destination default starts counting at `now_ms`.
    pub fn deadline_in_tier(&self, now_ms: u64, default_ttl: Option<Duration>) -> Option<u64> {
        if metadata_ttl(&self.metadata).is_some() {
            self.expires_at_ms
        } else {
            default_ttl.map(|ttl| deadline_after(now_ms, ttl))
        }
    }

    /// Record a successful read
    #[inline]
    pub fn touch(&mut self, now_ms: u64) {
        self.last_accessed_ms = now_ms;
        self.access_count += 1;
    }

    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        is_expired(self.expires_at_ms, now_ms)
    }
}

/// The single expiry predicate shared by read, listing and eviction paths
#[inline]
pub fn is_expired(expires_at_ms: Option<u64>, now_ms: u64) -> bool {
    matches!(expires_at_ms, Some(deadline) if deadline <= now_ms)
}
