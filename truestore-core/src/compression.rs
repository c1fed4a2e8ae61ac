//! # Compression Providers
//!
//! Cold tier payloads pass through a [`Compressor`]. The algorithm id is
//! stored in every payload header, so data written with one algorithm stays
//! readable after the configuration changes.

use std::fmt::Debug;
use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Compress/decompress capability injected into the cold tier
pub trait Compressor: Send + Sync + Debug {
    fn algorithm(&self) -> CompressionAlgorithm;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionAlgorithm {
    None = 0,
    Deflate = 1,
    Zstd = 2,
    Lz4 = 3,
    Snappy = 4,
}

impl CompressionAlgorithm {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Deflate => "deflate",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Snappy => "snappy",
        }
    }

    /// Accepted `level` range, `None` when the algorithm ignores it
    pub fn level_range(self) -> Option<(i32, i32)> {
        match self {
            CompressionAlgorithm::Deflate => Some((0, 9)),
            CompressionAlgorithm::Zstd => Some((1, 22)),
            _ => None,
        }
    }
}

impl TryFrom<u8> for CompressionAlgorithm {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionAlgorithm::None),
            1 => Ok(CompressionAlgorithm::Deflate),
            2 => Ok(CompressionAlgorithm::Zstd),
            3 => Ok(CompressionAlgorithm::Lz4),
            4 => Ok(CompressionAlgorithm::Snappy),
            _ => Err(Error::serialization(format!("Invalid compression type: {}", value))),
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(CompressionAlgorithm::None),
            "deflate" | "zlib" => Ok(CompressionAlgorithm::Deflate),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "snappy" | "snap" => Ok(CompressionAlgorithm::Snappy),
            other => Err(Error::Configuration {
                message: format!("Unknown compression algorithm: {}", other),
            }),
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub algorithm: CompressionAlgorithm,
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Zstd,
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some((lo, hi)) = self.algorithm.level_range() {
            if self.level < lo || self.level > hi {
                return Err(Error::Configuration {
                    message: format!(
                        "{} level must be within {}..={}, got {}",
                        self.algorithm.name(),
                        lo,
                        hi,
                        self.level
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Arc<dyn Compressor> {
        Arc::new(Codec::new(self.algorithm, self.level))
    }
}

/// Built-in compressor covering every [`CompressionAlgorithm`]
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    algorithm: CompressionAlgorithm,
    level: i32,
}

impl Codec {
    pub fn new(algorithm: CompressionAlgorithm, level: i32) -> Self {
        Self { algorithm, level }
    }

    /// Codec able to read payloads written with `algorithm`
    pub fn for_reading(algorithm: CompressionAlgorithm) -> Self {
        Self::new(algorithm, 0)
    }
}

impl Compressor for Codec {
    fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Deflate => {
                let level = flate2::Compression::new(self.level.clamp(0, 9) as u32);
                let mut encoder = flate2::write::ZlibEncoder::new(Vec::with_capacity(data.len() / 2), level);
                encoder
                    .write_all(data)
                    .map_err(|e| Error::serialization(format!("Deflate compression failed: {}", e)))?;
                encoder
                    .finish()
                    .map_err(|e| Error::serialization(format!("Deflate compression failed: {}", e)))
            }
            CompressionAlgorithm::Zstd => zstd::encode_all(data, self.level)
                .map_err(|e| Error::serialization(format!("Zstd compression failed: {}", e))),
            CompressionAlgorithm::Lz4 => lz4::block::compress(data, None, true)
                .map_err(|e| Error::serialization(format!("LZ4 compression failed: {}", e))),
            CompressionAlgorithm::Snappy => snap::raw::Encoder::new()
                .compress_vec(data)
                .map_err(|e| Error::serialization(format!("Snappy compression failed: {}", e))),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Deflate => {
                let mut decoder = flate2::read::ZlibDecoder::new(data);
                let mut out = Vec::with_capacity(data.len() * 2);
                decoder
                    .read_to_end(&mut out)
                    .map_err(|e| Error::serialization(format!("Deflate decompression failed: {}", e)))?;
                Ok(out)
            }
            CompressionAlgorithm::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::serialization(format!("Zstd decompression failed: {}", e))),
            // Size is prepended by `compress`
            CompressionAlgorithm::Lz4 => lz4::block::decompress(data, None)
                .map_err(|e| Error::serialization(format!("LZ4 decompression failed: {}", e))),
            CompressionAlgorithm::Snappy => snap::raw::Decoder::new()
                .decompress_vec(data)
                .map_err(|e| Error::serialization(format!("Snappy decompression failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CompressionAlgorithm; 5] = [
        CompressionAlgorithm::None,
        CompressionAlgorithm::Deflate,
        CompressionAlgorithm::Zstd,
        CompressionAlgorithm::Lz4,
        CompressionAlgorithm::Snappy,
    ];

    #[test]
    fn test_every_codec_restores_input() {
        let data = b"hello hello hello hello hello cold storage".repeat(20);
        for algorithm in ALL {
            let codec = Codec::new(algorithm, 3);
            let packed = codec.compress(&data).unwrap();
            let unpacked = Codec::for_reading(algorithm).decompress(&packed).unwrap();
            assert_eq!(unpacked, data, "{} did not restore input", algorithm.name());
        }
    }

    #[test]
    fn test_repetitive_data_shrinks() {
        let data = vec![b'a'; 1000];
        for algorithm in &ALL[1..] {
            let packed = Codec::new(*algorithm, 6).compress(&data).unwrap();
            assert!(packed.len() < data.len(), "{} did not shrink", algorithm.name());
        }
    }

    #[test]
    fn test_garbage_fails_to_decompress() {
        let garbage = [0xffu8, 0x00, 0x13, 0x37, 0x42, 0x42, 0x42];
        for algorithm in [CompressionAlgorithm::Deflate, CompressionAlgorithm::Zstd] {
            assert!(Codec::for_reading(algorithm).decompress(&garbage).is_err());
        }
    }

    #[test]
    fn test_algorithm_ids_and_names() {
        for algorithm in ALL {
            assert_eq!(CompressionAlgorithm::try_from(algorithm.as_byte()).unwrap(), algorithm);
            assert_eq!(algorithm.name().parse::<CompressionAlgorithm>().unwrap(), algorithm);
        }
        assert!(CompressionAlgorithm::try_from(9).is_err());
        assert_eq!("zlib".parse::<CompressionAlgorithm>().unwrap(), CompressionAlgorithm::Deflate);
        assert!("brotli".parse::<CompressionAlgorithm>().is_err());
    }

    #[test]
    fn test_level_validation() {
        let mut config = CompressionConfig::default();
        assert!(config.validate().is_ok());
        config.level = 40;
        assert!(config.validate().is_err());
        config.algorithm = CompressionAlgorithm::Lz4;
        assert!(config.validate().is_ok());
        config.algorithm = CompressionAlgorithm::Deflate;
        config.level = 6;
        assert!(config.validate().is_ok());
    }
}
