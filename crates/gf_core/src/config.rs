//! Engine tuning parameters.

use serde::{Deserialize, Serialize};

/// Matchmaking timings and budgets. All durations are engine-clock
/// milliseconds compared against the tick time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinderConfig {
    // === Deadlines ===
    /// Role-check lifetime before the sweep aborts it (default: 45s)
    pub role_check_timeout_ms: u64,
    /// Proposal lifetime before the sweep fails it (default: 40s)
    pub proposal_timeout_ms: u64,
    /// Vote-kick lifetime before the sweep closes it as failed (default: 120s)
    pub boot_timeout_ms: u64,

    // === Vote-kick ===
    /// Agree votes required for a kick to pass. Exact match, not a
    /// threshold (default: 3)
    pub boot_quorum: u32,
    /// Kicks a party may execute over its lifetime (default: 3)
    pub kick_budget: u8,

    // === Queue bookkeeping ===
    /// Cadence of queue-status notifications to waiting entries
    /// (default: 15s)
    pub queue_status_interval_ms: u64,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            role_check_timeout_ms: 45_000,
            proposal_timeout_ms: 40_000,
            boot_timeout_ms: 120_000,

            boot_quorum: 3,
            kick_budget: 3,

            queue_status_interval_ms: 15_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let config = FinderConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: FinderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.proposal_timeout_ms, config.proposal_timeout_ms);
        assert_eq!(back.boot_quorum, config.boot_quorum);
    }
}
