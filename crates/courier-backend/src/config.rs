//! Backend configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Maximum number of accounts remembered on this device.
    #[serde(default = "BackendConfig::default_max_local_accounts")]
    pub max_local_accounts: usize,

    /// Balance credited to both sides of a referral.
    #[serde(default = "BackendConfig::default_referral_bonus")]
    pub referral_bonus: i64,

    /// How many times a contended read-modify-write is attempted.
    #[serde(default = "BackendConfig::default_cas_attempts")]
    pub cas_attempts: u32,

    /// Seconds between snapshot pruning passes.
    #[serde(default = "BackendConfig::default_prune_interval")]
    pub prune_interval_seconds: u64,

    /// How many times a failed snapshot delete is retried per pass.
    #[serde(default = "BackendConfig::default_prune_retries")]
    pub prune_retries: u32,

    /// Default lifetime of a chat snapshot.
    #[serde(default = "BackendConfig::default_snapshot_ttl")]
    pub snapshot_ttl_seconds: u64,

    /// Capacity of the change broadcast channel.
    #[serde(default = "BackendConfig::default_notify_buffer")]
    pub notify_buffer: usize,
}

impl BackendConfig {
    const fn default_max_local_accounts() -> usize {
        3
    }

    const fn default_referral_bonus() -> i64 {
        100
    }

    const fn default_cas_attempts() -> u32 {
        8
    }

    const fn default_prune_interval() -> u64 {
        60
    }

    const fn default_prune_retries() -> u32 {
        3
    }

    const fn default_snapshot_ttl() -> u64 {
        86_400 // 24 hours
    }

    const fn default_notify_buffer() -> usize {
        256
    }

    /// Get the pruning interval as a `Duration`, at least one second.
    #[must_use]
    pub const fn prune_interval(&self) -> Duration {
        if self.prune_interval_seconds == 0 {
            return Duration::from_secs(1);
        }
        Duration::from_secs(self.prune_interval_seconds)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            max_local_accounts: Self::default_max_local_accounts(),
            referral_bonus: Self::default_referral_bonus(),
            cas_attempts: Self::default_cas_attempts(),
            prune_interval_seconds: Self::default_prune_interval(),
            prune_retries: Self::default_prune_retries(),
            snapshot_ttl_seconds: Self::default_snapshot_ttl(),
            notify_buffer: Self::default_notify_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: BackendConfig =
            serde_json::from_str(r#"{"max_local_accounts": 5}"#).unwrap();
        assert_eq!(config.max_local_accounts, 5);
        assert_eq!(config.referral_bonus, 100);
        assert_eq!(config.prune_interval(), Duration::from_secs(60));
    }

    #[test]
    fn zero_prune_interval_is_clamped() {
        let config = BackendConfig {
            prune_interval_seconds: 0,
            ..BackendConfig::default()
        };
        assert_eq!(config.prune_interval(), Duration::from_secs(1));
    }
}
