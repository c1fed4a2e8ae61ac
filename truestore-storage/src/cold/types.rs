use serde::{Deserialize, Serialize};

use truestore_core::compression::CompressionAlgorithm;
use truestore_core::entry::{is_expired, StorageEntry};
use truestore_core::value::{Metadata, Value};

pub const PAYLOAD_MAGIC: &[u8; 4] = b"TSC1";
/// Magic (4) + algorithm id (1) + body CRC32 (4)
pub const PAYLOAD_HEADER_SIZE: usize = 9;

pub const PAYLOAD_EXT: &str = "bin";
pub const META_EXT: &str = "meta";
pub(crate) const PAYLOAD_SUFFIX: &str = ".bin";
pub(crate) const META_SUFFIX: &str = ".meta";
pub const TEMP_PREFIX: &str = ".tsw-";
pub const TEMP_SUFFIX: &str = ".tmp";

/// Keys longer than this are stored under a hashed stem
pub const MAX_PLAIN_KEY_BYTES: usize = 96;

pub(crate) const LOCK_STRIPES: usize = 64;

/// Per-key record kept in `<stem>.meta` and mirrored in the in-memory index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub key: String,
    /// Length of the serialized value before compression
    pub value_size: usize,
    /// Length of the payload file, header included
    pub stored_size: u64,
    pub created_at_ms: u64,
    pub last_accessed_ms: u64,
    pub access_count: u64,
    pub expires_at_ms: Option<u64>,
    /// CRC32 of the compressed body, as written in the payload header
    pub checksum: u32,
    pub compression: CompressionAlgorithm,
    #[serde(default)]
    pub metadata: Metadata,
}

impl EntryRecord {
    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        is_expired(self.expires_at_ms, now_ms)
    }

    /// Compression ratio of the stored body, 1.0 for empty values
    pub fn compression_ratio(&self) -> f64 {
        if self.value_size == 0 {
            return 1.0;
        }
        let body = self.stored_size.saturating_sub(PAYLOAD_HEADER_SIZE as u64);
        body as f64 / self.value_size as f64
    }

    pub(crate) fn into_entry(self, value: Value) -> StorageEntry {
        StorageEntry {
            key: self.key,
            value,
            metadata: self.metadata,
            size_bytes: self.value_size,
            created_at_ms: self.created_at_ms,
            last_accessed_ms: self.last_accessed_ms,
            access_count: self.access_count,
            expires_at_ms: self.expires_at_ms,
        }
    }
}

/// What the scan at open found and fixed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub loaded: usize,
    pub temp_files_removed: usize,
    pub orphan_meta_removed: usize,
    pub rebuilt: usize,
    pub dropped: usize,
}
