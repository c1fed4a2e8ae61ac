use std::time::Duration;

use truestore_core::config::MigrationConfig;

/// Where a key currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierLocation {
    Hot,
    Cold,
    /// Hot copy backed by an up-to-date cold copy
    Both,
}

impl TierLocation {
    pub fn from_presence(in_hot: bool, in_cold: bool) -> Option<Self> {
        match (in_hot, in_cold) {
            (true, true) => Some(TierLocation::Both),
            (true, false) => Some(TierLocation::Hot),
            (false, true) => Some(TierLocation::Cold),
            (false, false) => None,
        }
    }

    #[inline]
    pub fn in_hot(self) -> bool {
        matches!(self, TierLocation::Hot | TierLocation::Both)
    }

    #[inline]
    pub fn in_cold(self) -> bool {
        matches!(self, TierLocation::Cold | TierLocation::Both)
    }
}

/// Per-key placement and access frequency
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationRecord {
    pub location: TierLocation,
    pub score: f64,
    /// Start of the current decay window
    pub decayed_at_ms: u64,
}

impl MigrationRecord {
    pub fn new(location: TierLocation, now_ms: u64) -> Self {
        Self {
            location,
            score: 0.0,
            decayed_at_ms: now_ms,
        }
    }

    /// Halve the score once per full window elapsed since the last decay
    pub fn decay(&mut self, now_ms: u64, window_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.decayed_at_ms);
        let windows = elapsed / window_ms.max(1);
        if windows == 0 {
            return;
        }
        self.score = halve(self.score, windows);
        self.decayed_at_ms += windows * window_ms.max(1);
    }

    /// Decay, then count one access
    pub fn record_access(&mut self, now_ms: u64, window_ms: u64) {
        self.decay(now_ms, window_ms);
        self.score += 1.0;
    }

    /// Score as of `now_ms` without mutating the record
    pub fn score_at(&self, now_ms: u64, window_ms: u64) -> f64 {
        let windows = now_ms.saturating_sub(self.decayed_at_ms) / window_ms.max(1);
        halve(self.score, windows)
    }
}

fn halve(score: f64, times: u64) -> f64 {
    if times >= 64 {
        0.0
    } else {
        score / (1u64 << times) as f64
    }
}

/// Promotion and placement rules of the mixed tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MigrationPolicy {
    promotion_threshold: f64,
    decay_window_ms: u64,
}

impl MigrationPolicy {
    pub fn new(promotion_threshold: f64, decay_window: Duration) -> Self {
        Self {
            promotion_threshold,
            decay_window_ms: (decay_window.as_millis() as u64).max(1),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.promotion_threshold
    }

    pub fn decay_window_ms(&self) -> u64 {
        self.decay_window_ms
    }

    /// A cold hit is copied into the hot tier only above the threshold
    #[inline]
    pub fn should_promote(&self, score: f64) -> bool {
        score > self.promotion_threshold
    }

    /// A cold-only key that is rarely touched stays cold on write
    #[inline]
    pub fn keep_cold(&self, score: f64) -> bool {
        score < self.promotion_threshold
    }

    /// Whether a promotion candidate may displace the hot tier's LRU entry
    #[inline]
    pub fn displaces(&self, candidate_score: f64, victim_score: f64) -> bool {
        victim_score < candidate_score
    }
}

impl From<&MigrationConfig> for MigrationPolicy {
    fn from(config: &MigrationConfig) -> Self {
        Self::new(config.promotion_threshold, config.decay_window)
    }
}
