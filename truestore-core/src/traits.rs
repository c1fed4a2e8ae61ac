//! # Core Traits
//!
//! The uniform contract shared by the hot, cold and mixed tiers. Callers that
//! only need store/retrieve/delete can hold any tier as `Arc<dyn Storage>`.

use crate::error::Result;
use crate::metrics::TierStats;
use crate::value::{Metadata, Value};

/// Key-value storage tier
pub trait Storage: Send + Sync {
    /// Insert or replace `key`
    fn store(&self, key: &str, value: Value, metadata: Option<Metadata>) -> Result<()>;

    /// Fails with `NotFound` when the key is absent or expired
    fn retrieve(&self, key: &str) -> Result<Value>;

    /// Never fails for a missing key
    fn delete(&self, key: &str) -> Result<()>;

    /// Presence check that does not count as an access
    fn contains(&self, key: &str) -> Result<bool>;

    /// Live (non-expired) keys
    fn keys(&self) -> Result<Vec<String>>;

    fn clear(&self) -> Result<()>;

    fn tier_stats(&self) -> TierStats;

    /// Like `retrieve`, mapping `NotFound` to `None`
    fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.retrieve(key) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
