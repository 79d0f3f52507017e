use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::ChainHash;

/// Announcement validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Chain this node follows; announcements for any other chain are rejected.
    #[serde(default = "default_chain_hash")]
    pub chain_hash: ChainHash,
    /// Maximum announcements awaiting a chain answer at once.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// Number of rejected announcement digests remembered.
    #[serde(default = "default_quarantine_capacity")]
    pub quarantine_capacity: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff for transient chain watcher failures.
///
/// `delay = initial_delay_ms * multiplier^(attempt-1)`, clamped to `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Lookups attempted per announcement, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

/// Gossip ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Policies buffered for channels still under validation.
    #[serde(default = "default_max_orphan_policies")]
    pub max_orphan_policies: usize,
    #[serde(default = "default_orphan_policy_ttl_secs")]
    pub orphan_policy_ttl_secs: u64,
    /// Channels without a fresh policy for this long are pruned.
    #[serde(default = "default_stale_channel_secs")]
    pub stale_channel_secs: u64,
}

/// Route search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    /// Cost of locking one msat for one block, in billionths.
    #[serde(default = "default_risk_factor_billionths")]
    pub risk_factor_billionths: u64,
    #[serde(default = "default_final_cltv_delta")]
    pub final_cltv_delta: u16,
}

// Default value functions
fn default_chain_hash() -> ChainHash {
    ChainHash::BITCOIN
}
fn default_max_pending() -> usize {
    1000
}
fn default_quarantine_capacity() -> usize {
    10_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_max_orphan_policies() -> usize {
    1000
}
fn default_orphan_policy_ttl_secs() -> u64 {
    600
}
fn default_stale_channel_secs() -> u64 {
    1_209_600
}
fn default_max_hops() -> usize {
    20
}
fn default_risk_factor_billionths() -> u64 {
    15
}
fn default_final_cltv_delta() -> u16 {
    18
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            chain_hash: default_chain_hash(),
            max_pending: default_max_pending(),
            quarantine_capacity: default_quarantine_capacity(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            max_orphan_policies: default_max_orphan_policies(),
            orphan_policy_ttl_secs: default_orphan_policy_ttl_secs(),
            stale_channel_secs: default_stale_channel_secs(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            risk_factor_billionths: default_risk_factor_billionths(),
            final_cltv_delta: default_final_cltv_delta(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let max = self.max_delay_ms as f64;
        let clamped = if base.is_nan() || base < 0.0 {
            0.0
        } else if base > max {
            max
        } else {
            base
        };
        Duration::from_millis(clamped as u64)
    }
}
