//! # TrueStore Storage Tiers
//!
//! Three interchangeable implementations of [`truestore_core::Storage`].
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        MixedStorage                         │
//! │                                                             │
//! │   Hot read ──miss──> Cold read ──score > threshold──> Hot   │
//! │       │                                                     │
//! │   Hot full ──LRU victim──> demoted to Cold before dropping  │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                ▼                               ▼
//! ┌──────────────────────────────┐ ┌──────────────────────────────┐
//! │         HotStorage           │ │         ColdStorage          │
//! │                              │ │                              │
//! │  LRU order + per-entry TTL   │ │  One compressed file per key │
//! │  Bounded entry count         │ │  Temp file + atomic rename   │
//! │  In memory only              │ │  Repaired by scan at open    │
//! └──────────────────────────────┘ └──────────────────────────────┘
//! ```

pub mod cold;
pub mod hot;
pub mod mixed;

pub use cold::{ColdStorage, EntryRecord, RecoveryReport};
pub use hot::HotStorage;
pub use mixed::{MigrationPolicy, MigrationRecord, MixedBatch, MixedStorage, TierLocation};
