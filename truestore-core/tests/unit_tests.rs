//! Unit tests for truestore-core

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use support::MapStorage;
use truestore_core::{
    value::{metadata_tier_hint, metadata_ttl},
    CompressionAlgorithm, CompressionConfig, Config, Error, Metadata, MixedStats, SerializerKind, Storage,
    TierHint, TierStats, Value, META_TIER, META_TTL,
};

mod value_tests {
    use super::*;

    #[test]
    fn test_json_bridge() {
        let json = serde_json::json!({
            "user": "ada",
            "visits": 3,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "extra": null,
        });

        let value = Value::from(json.clone());
        match &value {
            Value::Map(map) => {
                assert_eq!(map.get("user"), Some(&Value::from("ada")));
                assert_eq!(map.get("visits"), Some(&Value::Int(3)));
                assert_eq!(map.get("extra"), Some(&Value::Null));
            }
            other => panic!("expected map, got {:?}", other),
        }
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_metadata_helpers() {
        let mut meta = Metadata::new();
        assert_eq!(metadata_ttl(&meta), None);
        assert_eq!(metadata_tier_hint(&meta), None);

        meta.insert(META_TTL.to_string(), Value::Float(1.5));
        meta.insert(META_TIER.to_string(), Value::from("COLD"));
        assert_eq!(metadata_ttl(&meta), Some(Duration::from_millis(1500)));
        assert_eq!(metadata_tier_hint(&meta), Some(TierHint::Cold));

        meta.insert(META_TTL.to_string(), Value::Int(0));
        meta.insert(META_TIER.to_string(), Value::from("lukewarm"));
        assert_eq!(metadata_ttl(&meta), None);
        assert_eq!(metadata_tier_hint(&meta), None);
    }
}

mod pipeline_tests {
    use super::*;

    fn telemetry() -> Value {
        let mut map = BTreeMap::new();
        map.insert("host".to_string(), Value::from("edge-01"));
        map.insert("samples".to_string(), Value::List((0..500).map(|i| Value::Int(i % 7)).collect()));
        map.insert("raw".to_string(), Value::Bytes(vec![0xab; 256]));
        Value::Map(map)
    }

    #[test]
    fn test_serialize_compress_restore() {
        let value = telemetry();

        for kind in [SerializerKind::Bincode, SerializerKind::Json] {
            let serializer = kind.build();
            let encoded = serializer.encode(&value).unwrap();
            assert_eq!(serializer.encoded_len(&value).unwrap(), encoded.len());

            let codec = CompressionConfig {
                algorithm: CompressionAlgorithm::Zstd,
                level: 9,
            }
            .build();
            let compressed = codec.compress(&encoded).unwrap();
            assert!(compressed.len() < encoded.len());

            let restored = serializer.decode(&codec.decompress(&compressed).unwrap()).unwrap();
            assert_eq!(restored, value, "{}", serializer.name());
        }
    }

    #[test]
    fn test_decoding_garbage_is_serialization_error() {
        let err = SerializerKind::Json.build().decode(b"\xff\x00 not json").unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION");
    }
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn algorithm() -> impl Strategy<Value = CompressionAlgorithm> {
        prop_oneof![
            Just(CompressionAlgorithm::None),
            Just(CompressionAlgorithm::Deflate),
            Just(CompressionAlgorithm::Zstd),
            Just(CompressionAlgorithm::Lz4),
            Just(CompressionAlgorithm::Snappy),
        ]
    }

    proptest! {
        #[test]
        fn test_codecs_restore_any_input(algorithm in algorithm(), data in prop::collection::vec(any::<u8>(), 0..4096)) {
            let codec = CompressionConfig { algorithm, ..Default::default() }.build();
            let compressed = codec.compress(&data).unwrap();
            prop_assert_eq!(codec.decompress(&compressed).unwrap(), data);
        }

        #[test]
        fn test_algorithm_ids_are_stable(byte in any::<u8>()) {
            match CompressionAlgorithm::try_from(byte) {
                Ok(algorithm) => prop_assert_eq!(algorithm.as_byte(), byte),
                Err(e) => {
                    prop_assert!(byte > 4);
                    prop_assert_eq!(e.error_code(), "SERIALIZATION");
                }
            }
        }
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_toml_roundtrip_preserves_everything() {
        let mut config = Config::default();
        config.hot.max_entries = 42;
        config.cold.compression.algorithm = CompressionAlgorithm::Snappy;
        config.migration.promotion_threshold = 3.5;

        let rendered = config.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_document_is_config_error() {
        let err = Config::from_toml_str("[hot\nmax_entries = ").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(!err.is_recoverable());
    }
}

mod error_tests {
    use super::*;

    #[test]
    fn test_error_codes_and_messages() {
        let err = Error::not_found("user:1");
        assert!(err.is_not_found());
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("user:1"));

        let err = Error::Capacity { capacity: 10 };
        assert_eq!(err.error_code(), "CAPACITY");

        let err: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.error_code(), "STORAGE_IO");
        assert!(std::error::Error::source(&err).is_some());

        let err = Error::corruption("k", "bad crc");
        assert_eq!(err.error_code(), "CORRUPTION");
        assert!(!err.is_recoverable());
    }
}

mod storage_trait_tests {
    use super::*;

    #[test]
    fn test_get_maps_not_found_to_none() {
        let storage = MapStorage::default();
        storage.store("a", Value::Int(1), None).unwrap();

        assert_eq!(storage.get("a").unwrap(), Some(Value::Int(1)));
        assert_eq!(storage.get("b").unwrap(), None);

        storage.fail_next();
        assert_eq!(storage.get("a").unwrap_err().error_code(), "STORAGE_IO");
    }

    #[test]
    fn test_mixed_stats_combined() {
        let stats = MixedStats {
            hot: TierStats { hits: 5, misses: 1, evictions: 2, current_count: 3, current_size_bytes: 30 },
            cold: TierStats { hits: 2, misses: 1, evictions: 1, current_count: 7, current_size_bytes: 700 },
            hot_hits: 5,
            cold_hits: 2,
            misses: 1,
            ..Default::default()
        };

        let combined = stats.combined();
        assert_eq!(combined.hits, 7);
        assert_eq!(combined.misses, 1);
        assert_eq!(combined.evictions, 3);
        assert_eq!(combined.current_count, 10);
        assert_eq!(combined.current_size_bytes, 730);
    }
}

/// Minimal `Storage` implementation used to exercise the trait's provided methods
mod support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use truestore_core::Result;

    #[derive(Default)]
    pub struct MapStorage {
        entries: Mutex<HashMap<String, Value>>,
        fail: AtomicBool,
    }

    impl MapStorage {
        pub fn fail_next(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }
    }

    impl Storage for MapStorage {
        fn store(&self, key: &str, value: Value, _metadata: Option<Metadata>) -> Result<()> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        fn retrieve(&self, key: &str) -> Result<Value> {
            if self.fail.swap(false, Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected").into());
            }
            self.entries
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| Error::not_found(key))
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        fn contains(&self, key: &str) -> Result<bool> {
            Ok(self.entries.lock().unwrap().contains_key(key))
        }

        fn keys(&self) -> Result<Vec<String>> {
            Ok(self.entries.lock().unwrap().keys().cloned().collect())
        }

        fn clear(&self) -> Result<()> {
            self.entries.lock().unwrap().clear();
            Ok(())
        }

        fn tier_stats(&self) -> TierStats {
            TierStats {
                current_count: self.entries.lock().unwrap().len(),
                ..Default::default()
            }
        }
    }
}
