//! Value serializers.
//!
//! A [`Serializer`] turns a [`Value`] into bytes and back. Tiers hold one as a
//! trait object chosen at construction; bincode is the compact default and
//! JSON keeps cold files human-inspectable.

use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// Encode/decode capability
pub trait Serializer: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Size of the encoded form, used for capacity accounting
    fn encoded_len(&self, value: &Value) -> Result<usize> {
        Ok(self.encode(value)?.len())
    }
}

/// Compact binary encoding
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn name(&self) -> &'static str {
        "bincode"
    }

    #[inline]
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| Error::serialization(format!("Bincode encode failed: {}", e)))
    }

    #[inline]
    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        bincode::deserialize(bytes).map_err(|e| Error::serialization(format!("Bincode decode failed: {}", e)))
    }

    fn encoded_len(&self, value: &Value) -> Result<usize> {
        bincode::serialized_size(value)
            .map(|n| n as usize)
            .map_err(|e| Error::serialization(format!("Bincode size failed: {}", e)))
    }
}

/// JSON encoding of the tagged `Value` enum
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::serialization(format!("JSON encode failed: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| Error::serialization(format!("JSON decode failed: {}", e)))
    }
}

/// Serializer selected by configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    Bincode,
    Json,
}

impl SerializerKind {
    pub fn build(self) -> Arc<dyn Serializer> {
        match self {
            SerializerKind::Bincode => Arc::new(BincodeSerializer),
            SerializerKind::Json => Arc::new(JsonSerializer),
        }
    }
}

impl FromStr for SerializerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bincode" | "binary" => Ok(SerializerKind::Bincode),
            "json" => Ok(SerializerKind::Json),
            other => Err(Error::Configuration {
                message: format!("Unknown serializer: {}", other),
            }),
        }
    }
}
