//! Matching parameters

use serde::{Deserialize, Serialize};

/// Scoring and lookup parameters for the matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Width of a time-delta histogram bin (ms)
    #[serde(default = "default_bin_width_ms")]
    pub bin_width_ms: u32,
    /// Number of ranked candidates returned
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Candidates whose coherence score is below this are dropped
    #[serde(default = "default_min_score")]
    pub min_score: u32,
    /// Addresses holding more couples than this are skipped (0 = no cap)
    #[serde(default = "default_max_couples_per_address")]
    pub max_couples_per_address: usize,
    /// Deadline for one match request (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Addresses per concurrent store lookup
    #[serde(default = "default_lookup_chunk_size")]
    pub lookup_chunk_size: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            bin_width_ms: default_bin_width_ms(),
            top_k: default_top_k(),
            min_score: default_min_score(),
            max_couples_per_address: default_max_couples_per_address(),
            timeout_ms: default_timeout_ms(),
            lookup_chunk_size: default_lookup_chunk_size(),
        }
    }
}

fn default_bin_width_ms() -> u32 {
    5
}
fn default_top_k() -> usize {
    10
}
fn default_min_score() -> u32 {
    1
}
fn default_max_couples_per_address() -> usize {
    2000
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_lookup_chunk_size() -> usize {
    256
}

impl MatcherConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bin_width_ms == 0 {
            anyhow::bail!("bin_width_ms must be > 0");
        }
        if self.top_k == 0 {
            anyhow::bail!("top_k must be > 0");
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("timeout_ms must be > 0");
        }
        if self.lookup_chunk_size == 0 {
            anyhow::bail!("lookup_chunk_size must be > 0");
        }
        Ok(())
    }
}
