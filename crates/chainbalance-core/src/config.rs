//! Bookkeeper configuration.
//!
//! Every type here deserializes with defaults for missing fields, so a JSON
//! config only needs to name what it changes. Durations are milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BalanceError;

/// Canonical Multicall3 deployment address (same on most EVM chains).
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// Top-level configuration passed to [`Bookkeeper::new`](crate::Bookkeeper::new).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookkeeperConfig {
    pub retry: RetryConfig,
    pub strategy: StrategyConfig,
    /// Maximum backend calls in flight per round (0 = unbounded).
    pub concurrency: usize,
    /// Per backend call (or batch round-trip) timeout.
    #[serde(with = "duration_ms_opt", skip_serializing_if = "Option::is_none")]
    pub call_timeout: Option<Duration>,
}

impl BookkeeperConfig {
    /// Enable retries with `max_attempts` additional rounds.
    pub fn with_retry(mut self, max_attempts: u32) -> Self {
        self.retry.enabled = true;
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Number of retry rounds the coordinator may run after the first one.
    pub fn effective_retries(&self) -> u32 {
        if self.retry.enabled {
            self.retry.max_attempts
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<(), BalanceError> {
        self.retry.backoff.validate()?;
        if let StrategyConfig::Batched(mc) = &self.strategy {
            if mc.contract.trim().is_empty() {
                return Err(BalanceError::InvalidConfig(
                    "multicall contract address is empty".into(),
                ));
            }
            mc.backoff.validate()?;
        }
        Ok(())
    }
}

/// Coordinator-level retry of still-failing requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    /// Additional rounds after the first (0 = a single attempt).
    pub max_attempts: u32,
    /// Delay between rounds.
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 0,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde(rename = "initial_backoff_ms", with = "duration_ms")]
    pub initial_backoff: Duration,
    #[serde(rename = "max_backoff_ms", with = "duration_ms")]
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl BackoffConfig {
    /// No delay at all between attempts.
    pub fn none() -> Self {
        Self {
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    fn validate(&self) -> Result<(), BalanceError> {
        if !(self.multiplier.is_finite() && self.multiplier > 0.0) {
            return Err(BalanceError::InvalidConfig(format!(
                "backoff multiplier must be positive, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// How requests reach the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// One backend call per request.
    #[default]
    Direct,
    /// One aggregated call per block.
    Batched(MulticallConfig),
}

/// Settings for the batched (Multicall3) strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticallConfig {
    /// Aggregator contract; also the target of native-balance entries.
    pub contract: String,
    /// Attempts per block-group round-trip when the round-trip itself fails.
    pub round_trip_attempts: u32,
    pub backoff: BackoffConfig,
}

impl MulticallConfig {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            ..Self::default()
        }
    }
}

impl Default for MulticallConfig {
    fn default() -> Self {
        Self {
            contract: MULTICALL3_ADDRESS.to_string(),
            round_trip_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod duration_ms_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_single_direct_attempt() {
        let cfg = BookkeeperConfig::default();
        assert!(!cfg.retry.enabled);
        assert_eq!(cfg.effective_retries(), 0);
        assert!(matches!(cfg.strategy, StrategyConfig::Direct));
        assert_eq!(cfg.concurrency, 0);
        assert!(cfg.call_timeout.is_none());
    }

    #[test]
    fn max_attempts_ignored_when_retry_disabled() {
        let mut cfg = BookkeeperConfig::default();
        cfg.retry.max_attempts = 5;
        assert_eq!(cfg.effective_retries(), 0);
        assert_eq!(cfg.with_retry(5).effective_retries(), 5);
    }

    #[test]
    fn deserializes_partial_json() {
        let cfg: BookkeeperConfig = serde_json::from_str(
            r#"{
                "retry": { "enabled": true, "max_attempts": 2 },
                "strategy": { "kind": "batched", "round_trip_attempts": 1 },
                "call_timeout": 2500
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.effective_retries(), 2);
        assert_eq!(cfg.call_timeout, Some(Duration::from_millis(2500)));
        match cfg.strategy {
            StrategyConfig::Batched(mc) => {
                assert_eq!(mc.contract, MULTICALL3_ADDRESS);
                assert_eq!(mc.round_trip_attempts, 1);
            }
            other => panic!("expected batched strategy, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_empty_contract() {
        let cfg = BookkeeperConfig::default()
            .with_strategy(StrategyConfig::Batched(MulticallConfig::new("  ")));
        assert!(matches!(cfg.validate(), Err(BalanceError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_zero_multiplier() {
        let mut cfg = BookkeeperConfig::default();
        cfg.retry.backoff.multiplier = 0.0;
        assert!(cfg.validate().is_err());
    }
}
