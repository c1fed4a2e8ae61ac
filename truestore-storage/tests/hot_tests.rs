//! Hot tier tests

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use truestore_core::config::HotConfig;
use truestore_core::serialization::{BincodeSerializer, Serializer};
use truestore_core::traits::Storage;
use truestore_core::value::{Metadata, Value, META_TTL};
use truestore_core::{Error, ManualClock};
use truestore_storage::HotStorage;

fn hot_with_clock(config: HotConfig) -> (HotStorage, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let hot = HotStorage::with_components(config, Arc::new(BincodeSerializer), clock.clone()).unwrap();
    (hot, clock)
}

fn ttl(seconds: i64) -> Option<Metadata> {
    let mut meta = Metadata::new();
    meta.insert(META_TTL.to_string(), Value::Int(seconds));
    Some(meta)
}

#[test]
fn test_lru_eviction_order() {
    let hot = HotStorage::new(HotConfig::with_capacity(2)).unwrap();

    hot.store("a", Value::Int(1), None).unwrap();
    hot.store("b", Value::Int(2), None).unwrap();
    hot.store("c", Value::Int(3), None).unwrap();

    assert!(matches!(hot.retrieve("a"), Err(Error::NotFound { .. })));
    assert_eq!(hot.retrieve("b").unwrap(), Value::Int(2));
    assert_eq!(hot.retrieve("c").unwrap(), Value::Int(3));
    assert_eq!(hot.len(), 2);
    assert_eq!(hot.get_stats().evictions, 1);
}

#[test]
fn test_retrieve_refreshes_recency() {
    let hot = HotStorage::new(HotConfig::with_capacity(2)).unwrap();

    hot.store("a", Value::Int(1), None).unwrap();
    hot.store("b", Value::Int(2), None).unwrap();
    hot.retrieve("a").unwrap();
    hot.store("c", Value::Int(3), None).unwrap();

    assert!(hot.contains("a"));
    assert!(!hot.contains("b"));
    assert!(hot.contains("c"));
}

#[test]
fn test_contains_does_not_touch_order() {
    let hot = HotStorage::new(HotConfig::with_capacity(2)).unwrap();

    hot.store("a", Value::Int(1), None).unwrap();
    hot.store("b", Value::Int(2), None).unwrap();
    assert!(hot.contains("a"));
    assert!(hot.entry_info("a").is_some());
    hot.store("c", Value::Int(3), None).unwrap();

    assert!(!hot.contains("a"), "peeking must not refresh recency");
    assert_eq!(hot.keys(), vec!["c".to_string(), "b".to_string()]);
}

#[test]
fn test_ttl_expiry() {
    let (hot, clock) = hot_with_clock(HotConfig::default());

    hot.store("session", Value::from("token"), ttl(1)).unwrap();
    hot.store("config", Value::from("stable"), None).unwrap();

    clock.advance(Duration::from_millis(999));
    assert_eq!(hot.retrieve("session").unwrap(), Value::from("token"));

    clock.advance(Duration::from_millis(1));
    assert!(hot.retrieve("session").unwrap_err().is_not_found());
    assert!(!hot.contains("session"));
    assert_eq!(hot.keys(), vec!["config".to_string()]);

    // Default TTL is 300s
    clock.advance(Duration::from_secs(300));
    assert!(hot.retrieve("config").unwrap_err().is_not_found());
}

#[test]
fn test_huge_ttl_never_expires() {
    let (hot, clock) = hot_with_clock(HotConfig::default());

    let mut meta = Metadata::new();
    meta.insert(META_TTL.to_string(), Value::Float(1e20));
    hot.store("forever", Value::Int(1), Some(meta)).unwrap();

    clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
    assert_eq!(hot.retrieve("forever").unwrap(), Value::Int(1));
    assert_eq!(hot.entry_info("forever").unwrap().expires_at_ms, Some(u64::MAX));
}

#[test]
fn test_expired_entries_reclaimed_before_live_ones() {
    let (hot, clock) = hot_with_clock(HotConfig::with_capacity(2));

    hot.store("short", Value::Int(1), ttl(1)).unwrap();
    hot.store("long", Value::Int(2), None).unwrap();
    hot.retrieve("short").unwrap();

    clock.advance(Duration::from_secs(2));
    hot.store("new", Value::Int(3), None).unwrap();

    // "long" is the LRU entry but "short" had already expired
    assert!(hot.contains("long"));
    assert!(hot.contains("new"));
    assert_eq!(hot.len(), 2);
}

#[test]
fn test_no_auto_evict_fails_when_full() {
    let config = HotConfig {
        max_entries: 1,
        auto_evict: false,
        ..Default::default()
    };
    let hot = HotStorage::new(config).unwrap();

    hot.store("a", Value::Int(1), None).unwrap();
    let err = hot.store("b", Value::Int(2), None).unwrap_err();
    assert!(matches!(err, Error::Capacity { capacity: 1 }));
    assert_eq!(err.error_code(), "CAPACITY");

    // Replacing an existing key never needs room
    hot.store("a", Value::Int(10), None).unwrap();
    assert_eq!(hot.retrieve("a").unwrap(), Value::Int(10));
}

#[test]
fn test_replace_keeps_creation_time_and_size_accounting() {
    let (hot, clock) = hot_with_clock(HotConfig::default());
    let serializer = BincodeSerializer;

    hot.store("k", Value::from("short"), None).unwrap();
    let created = hot.entry_info("k").unwrap().created_at_ms;
    hot.retrieve("k").unwrap();
    assert_eq!(hot.entry_info("k").unwrap().access_count, 1);

    clock.advance(Duration::from_secs(5));
    let replacement = Value::from("a considerably longer replacement value");
    hot.store("k", replacement.clone(), None).unwrap();

    let info = hot.entry_info("k").unwrap();
    assert_eq!(info.created_at_ms, created);
    assert_eq!(info.access_count, 0);
    assert_eq!(info.size_bytes, serializer.encoded_len(&replacement).unwrap());
    assert_eq!(hot.get_stats().current_size_bytes, info.size_bytes as u64);
    assert_eq!(hot.len(), 1);
}

#[test]
fn test_delete_and_manual_eviction() {
    let hot = HotStorage::new(HotConfig::with_capacity(10)).unwrap();
    for i in 0..5 {
        hot.store(&format!("key-{}", i), Value::Int(i), None).unwrap();
    }

    assert!(hot.delete("key-4"));
    assert!(!hot.delete("key-4"));
    assert!(!hot.delete("never-stored"));

    assert_eq!(hot.evict_least_used(2), 2);
    assert_eq!(hot.keys(), vec!["key-3".to_string(), "key-2".to_string()]);
    assert_eq!(hot.evict_least_used(10), 2);
    assert!(hot.is_empty());
    assert_eq!(hot.get_stats().current_size_bytes, 0);
}

#[test]
fn test_stats_and_cleanup() {
    let (hot, clock) = hot_with_clock(HotConfig::with_capacity(10));

    hot.store("a", Value::Int(1), ttl(1)).unwrap();
    hot.store("b", Value::Int(2), ttl(1)).unwrap();
    hot.store("c", Value::Int(3), None).unwrap();

    hot.retrieve("c").unwrap();
    hot.retrieve("c").unwrap();
    let _ = hot.retrieve("missing");

    clock.advance(Duration::from_secs(1));
    assert_eq!(hot.cleanup_expired(), 2);

    let stats = hot.get_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.evictions, 2);
    assert_eq!(stats.current_count, 1);

    hot.clear();
    assert!(hot.is_empty());
    assert_eq!(hot.get_stats().current_size_bytes, 0);
}

#[test]
fn test_storage_trait_object() {
    let hot: Arc<dyn Storage> = Arc::new(HotStorage::new(HotConfig::default()).unwrap());

    hot.store("k", Value::from(vec![1u8, 2, 3]), None).unwrap();
    assert_eq!(hot.get("k").unwrap(), Some(Value::Bytes(vec![1, 2, 3])));
    assert_eq!(hot.get("absent").unwrap(), None);
    hot.delete("absent").unwrap();
    assert!(hot.contains("k").unwrap());
    assert_eq!(hot.tier_stats().current_count, 1);
}

#[test]
fn test_concurrent_access_respects_capacity() {
    let hot = Arc::new(HotStorage::new(HotConfig::with_capacity(64)).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let hot = Arc::clone(&hot);
            thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("t{}-{}", t, i % 100);
                    hot.store(&key, Value::Int(i), None).unwrap();
                    let _ = hot.retrieve(&key);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(hot.len() <= 64);
    let stats = hot.get_stats();
    assert_eq!(stats.current_count, hot.len());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Store(u8),
        Retrieve(u8),
        Delete(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16).prop_map(Op::Store),
            (0u8..16).prop_map(Op::Retrieve),
            (0u8..16).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn test_capacity_never_exceeded(capacity in 1usize..8, ops in prop::collection::vec(op(), 1..200)) {
            let hot = HotStorage::new(HotConfig::with_capacity(capacity)).unwrap();
            let mut last_stored = None;

            for op in ops {
                match op {
                    Op::Store(k) => {
                        hot.store(&k.to_string(), Value::Int(k as i64), None).unwrap();
                        last_stored = Some(k);
                    }
                    Op::Retrieve(k) => {
                        if let Ok(value) = hot.retrieve(&k.to_string()) {
                            prop_assert_eq!(value, Value::Int(k as i64));
                        }
                    }
                    Op::Delete(k) => {
                        hot.delete(&k.to_string());
                        if last_stored == Some(k) {
                            last_stored = None;
                        }
                    }
                }
                prop_assert!(hot.len() <= capacity);
            }

            // The most recent write is always the MRU entry
            if let Some(k) = last_stored {
                prop_assert!(hot.contains(&k.to_string()));
            }
        }
    }
}
