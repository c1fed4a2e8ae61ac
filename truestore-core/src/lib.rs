//! # TrueStore Core
//!
//! Shared building blocks for the TrueStore tiers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 truestore-core                  │
//! ├─────────────────────────────────────────────────┤
//! │  • value         - Polymorphic stored values    │
//! │  • entry         - Entries and expiry predicate │
//! │  • traits        - Uniform storage contract     │
//! │  • error         - Error kinds                  │
//! │  • serialization - Value <-> bytes              │
//! │  • compression   - Pluggable codecs             │
//! │  • metrics       - Tier statistics              │
//! │  • clock         - Time source for TTL/decay    │
//! │  • config        - Tier configuration           │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod compression;
pub mod config;
pub mod entry;
pub mod error;
pub mod metrics;
pub mod serialization;
pub mod traits;
pub mod value;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use compression::{Codec, CompressionAlgorithm, CompressionConfig, Compressor};
pub use config::{ColdConfig, Config, HotConfig, LoggingConfig, MigrationConfig};
pub use entry::{is_expired, StorageEntry};
pub use error::{Error, Result};
pub use metrics::{MixedStats, TierMetrics, TierStats};
pub use serialization::{BincodeSerializer, JsonSerializer, Serializer, SerializerKind};
pub use traits::Storage;
pub use value::{Metadata, TierHint, Value, META_TIER, META_TTL};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
