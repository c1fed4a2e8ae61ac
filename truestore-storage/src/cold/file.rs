use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use truestore_core::compression::{Codec, CompressionAlgorithm, Compressor};
use truestore_core::error::{Error, Result};

use super::types::*;

/// Filesystem-safe stem for `key`
pub(crate) fn stem_for(key: &str) -> String {
    if key.len() <= MAX_PLAIN_KEY_BYTES {
        format!("k{}", hex::encode(key.as_bytes()))
    } else {
        format!("h{}", hex::encode(Sha256::digest(key.as_bytes())))
    }
}

/// Recover the key behind a plain stem; hashed stems are one-way
pub(crate) fn key_from_stem(stem: &str) -> Option<String> {
    let encoded = stem.strip_prefix('k')?;
    let bytes = hex::decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

pub(crate) fn payload_path(root: &Path, stem: &str) -> PathBuf {
    root.join(format!("{}.{}", stem, PAYLOAD_EXT))
}

pub(crate) fn meta_path(root: &Path, stem: &str) -> PathBuf {
    root.join(format!("{}.{}", stem, META_EXT))
}

pub(crate) fn encode_payload(algorithm: CompressionAlgorithm, body: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(PAYLOAD_HEADER_SIZE + body.len());
    out.write_all(PAYLOAD_MAGIC)?;
    out.write_u8(algorithm.as_byte())?;
    out.write_u32::<LittleEndian>(crc32fast::hash(body))?;
    out.write_all(body)?;
    Ok(out)
}

/// Header fields of a payload file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PayloadHeader {
    pub algorithm: CompressionAlgorithm,
    pub checksum: u32,
}

pub(crate) fn read_header(key: &str, bytes: &[u8]) -> Result<PayloadHeader> {
    if bytes.len() < PAYLOAD_HEADER_SIZE || &bytes[..4] != PAYLOAD_MAGIC {
        return Err(Error::corruption(key, "Invalid payload magic"));
    }
    let algorithm = CompressionAlgorithm::try_from(bytes[4])
        .map_err(|e| Error::corruption(key, e.to_string()))?;
    let checksum = (&bytes[5..PAYLOAD_HEADER_SIZE]).read_u32::<LittleEndian>()?;
    Ok(PayloadHeader { algorithm, checksum })
}

/// Validate a payload and return its header and compressed body
pub(crate) fn decode_payload<'a>(key: &str, bytes: &'a [u8]) -> Result<(PayloadHeader, &'a [u8])> {
    let header = read_header(key, bytes)?;
    let body = &bytes[PAYLOAD_HEADER_SIZE..];
    if crc32fast::hash(body) != header.checksum {
        return Err(Error::corruption(key, "Payload CRC mismatch"));
    }
    Ok((header, body))
}

/// Write `bytes` to `target` through a temp file in the same directory.
///
/// Readers see either the previous file or the complete new one. The temp
/// file is unlinked on every failure path when the handle drops.
pub(crate) fn write_atomic(root: &Path, target: &Path, bytes: &[u8], sync: bool) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(root)
        .map_err(|e| Error::io(format!("Failed to create temp file in {:?}", root), e))?;

    tmp.write_all(bytes)
        .map_err(|e| Error::io(format!("Failed to write temp file for {:?}", target), e))?;
    if sync {
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(format!("Failed to sync temp file for {:?}", target), e))?;
    }

    tmp.persist(target)
        .map_err(|e| Error::io(format!("Failed to rename into {:?}", target), e.error))?;

    if sync {
        sync_dir(root)?;
    }
    debug!("Atomically wrote {} bytes to {:?}", bytes.len(), target);
    Ok(())
}

#[cfg(unix)]
fn sync_dir(root: &Path) -> Result<()> {
    fs::File::open(root)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| Error::io(format!("Failed to sync directory {:?}", root), e))
}

#[cfg(not(unix))]
fn sync_dir(_root: &Path) -> Result<()> {
    Ok(())
}

pub(crate) fn write_meta(root: &Path, path: &Path, record: &EntryRecord, sync: bool) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .map_err(|e| Error::serialization(format!("Failed to encode record for {}: {}", record.key, e)))?;
    write_atomic(root, path, &json, sync)
}

/// `Ok(None)` when the file is missing or does not parse
pub(crate) fn read_meta(path: &Path) -> Result<Option<EntryRecord>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(format!("Failed to read {:?}", path), e)),
    };
    match serde_json::from_slice(&raw) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!("Unreadable metadata file {:?}: {}", path, e);
            Ok(None)
        }
    }
}

/// Returns whether a file was removed
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(format!("Failed to remove {:?}", path), e)),
    }
}

/// Scan `root`, repair what an interrupted write or delete left behind, and
/// return the index of durable entries.
pub(crate) fn recover(
    root: &Path,
    now_ms: u64,
    default_expiry: impl Fn(u64) -> Option<u64>,
    sync: bool,
) -> Result<(HashMap<String, EntryRecord>, RecoveryReport)> {
    let mut report = RecoveryReport::default();
    let mut payloads = HashSet::new();
    let mut metas = HashSet::new();

    let dir = fs::read_dir(root).map_err(|e| Error::io(format!("Failed to scan {:?}", root), e))?;
    for dirent in dir {
        let dirent = dirent?;
        let name = dirent.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX) {
            if remove_if_exists(&dirent.path())? {
                report.temp_files_removed += 1;
            }
        } else if let Some(stem) = name.strip_suffix(PAYLOAD_SUFFIX) {
            payloads.insert(stem.to_string());
        } else if let Some(stem) = name.strip_suffix(META_SUFFIX) {
            metas.insert(stem.to_string());
        }
    }

    for stem in metas.difference(&payloads) {
        if remove_if_exists(&meta_path(root, stem))? {
            report.orphan_meta_removed += 1;
        }
    }

    let mut index = HashMap::with_capacity(payloads.len());
    for stem in &payloads {
        let path = payload_path(root, stem);
        let bytes = fs::read(&path).map_err(|e| Error::io(format!("Failed to read {:?}", path), e))?;
        let meta = read_meta(&meta_path(root, stem))?;

        // Fast path: the record describes exactly this payload
        if let (Some(record), Ok(header)) = (&meta, read_header(stem, &bytes)) {
            if record.checksum == header.checksum && stem_for(&record.key) == *stem {
                let mut record = record.clone();
                record.stored_size = bytes.len() as u64;
                index.insert(record.key.clone(), record);
                report.loaded += 1;
                continue;
            }
        }

        let key = meta
            .as_ref()
            .map(|record| record.key.clone())
            .filter(|key| stem_for(key) == *stem)
            .or_else(|| key_from_stem(stem));

        let rebuilt = key.and_then(|key| {
            rebuild_record(&key, &bytes, meta.as_ref(), now_ms, &default_expiry)
                .map_err(|e| warn!("Payload for {:?} is unreadable: {}", path, e))
                .ok()
        });

        match rebuilt {
            Some(record) => {
                write_meta(root, &meta_path(root, stem), &record, sync)?;
                warn!("Rebuilt metadata for key {} from {:?}", record.key, path);
                index.insert(record.key.clone(), record);
                report.rebuilt += 1;
            }
            None => {
                warn!("Dropping unrecoverable payload {:?}", path);
                remove_if_exists(&path)?;
                remove_if_exists(&meta_path(root, stem))?;
                report.dropped += 1;
            }
        }
    }

    Ok((index, report))
}

/// Derive a record from the payload alone. Bookkeeping from a stale record
/// is kept where it still applies.
fn rebuild_record(
    key: &str,
    bytes: &[u8],
    stale: Option<&EntryRecord>,
    now_ms: u64,
    default_expiry: &impl Fn(u64) -> Option<u64>,
) -> Result<EntryRecord> {
    let (header, body) = decode_payload(key, bytes)?;
    let raw = Codec::for_reading(header.algorithm)
        .decompress(body)
        .map_err(|e| Error::corruption(key, format!("Decompression failed: {}", e)))?;

    Ok(EntryRecord {
        key: key.to_string(),
        value_size: raw.len(),
        stored_size: bytes.len() as u64,
        created_at_ms: stale.map_or(now_ms, |record| record.created_at_ms),
        last_accessed_ms: now_ms,
        access_count: 0,
        expires_at_ms: default_expiry(now_ms),
        checksum: header.checksum,
        compression: header.algorithm,
        metadata: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stems() {
        assert_eq!(stem_for("ab"), "k6162");
        assert_eq!(key_from_stem("k6162").as_deref(), Some("ab"));
        assert_eq!(key_from_stem(&stem_for("../etc/passwd")).as_deref(), Some("../etc/passwd"));

        let long = "x".repeat(MAX_PLAIN_KEY_BYTES + 1);
        let stem = stem_for(&long);
        assert!(stem.starts_with('h'));
        assert_eq!(stem.len(), 65);
        assert_eq!(key_from_stem(&stem), None);
        assert!(stem_for(&"x".repeat(MAX_PLAIN_KEY_BYTES)).starts_with('k'));
    }

    #[test]
    fn test_payload_header() {
        let payload = encode_payload(CompressionAlgorithm::Zstd, b"body").unwrap();
        assert_eq!(payload.len(), PAYLOAD_HEADER_SIZE + 4);

        let (header, body) = decode_payload("k", &payload).unwrap();
        assert_eq!(header.algorithm, CompressionAlgorithm::Zstd);
        assert_eq!(header.checksum, crc32fast::hash(b"body"));
        assert_eq!(body, b"body");
    }

    #[test]
    fn test_damaged_payload_is_corruption() {
        let mut payload = encode_payload(CompressionAlgorithm::None, b"body").unwrap();
        *payload.last_mut().unwrap() ^= 0xff;
        let err = decode_payload("k", &payload).unwrap_err();
        assert_eq!(err.error_code(), "CORRUPTION");

        let err = decode_payload("k", b"NOPE").unwrap_err();
        assert_eq!(err.error_code(), "CORRUPTION");
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("a.bin");
        write_atomic(dir.path(), &target, b"one", false).unwrap();
        write_atomic(dir.path(), &target, b"two", true).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"two");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a.bin".to_string()]);
    }
}
