//! Engine configuration, read from `SPOOL_*` environment variables.

use std::time::Duration;

use serde::Deserialize;

use crate::queue::{RetryPolicy, ShardHash};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpoolConfig {
    pub shard_count: u32,
    pub shard_hash: ShardHash,
    pub backoff_base_secs: u64,
    pub backoff_multiplier: u32,
    pub poll_interval_ms: u64,
    pub purge_interval_secs: u64,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            shard_count: 4,
            shard_hash: ShardHash::Fnv1a,
            backoff_base_secs: 60,
            backoff_multiplier: 2,
            poll_interval_ms: 1000,
            purge_interval_secs: 3600,
        }
    }
}

impl SpoolConfig {
    /// e.g. `SPOOL_SHARD_COUNT=8 SPOOL_SHARD_HASH=name_length`
    pub fn load() -> Result<Self, envy::Error> {
        envy::prefixed("SPOOL_").from_env::<Self>()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.backoff_base_secs),
            self.backoff_multiplier,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<SpoolConfig, envy::Error> {
        envy::prefixed("SPOOL_").from_iter(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(from_pairs(&[]).unwrap(), SpoolConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = from_pairs(&[
            ("SPOOL_SHARD_COUNT", "8"),
            ("SPOOL_SHARD_HASH", "name_length"),
            ("SPOOL_BACKOFF_BASE_SECS", "1"),
            ("UNRELATED", "x"),
        ])
        .unwrap();

        assert_eq!(config.shard_count, 8);
        assert_eq!(config.shard_hash, ShardHash::NameLength);
        assert_eq!(config.retry_policy(), RetryPolicy::new(Duration::from_secs(1), 2));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(from_pairs(&[("SPOOL_SHARD_COUNT", "many")]).is_err());
    }
}
