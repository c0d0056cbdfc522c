// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Distributor configuration.
//!
//! Supports both programmatic and TOML file-based configuration, following
//! the same shape as the rest of the workspace's services: defaults via
//! `#[serde(default = "...")]` functions, with `validate()` also invoked
//! from the constructor so a bad config can never silently construct a
//! running coordinator.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::DistributorError;

/// Distributor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorConfig {
    /// Target size of each replica set. Must be at least 1: the write path
    /// computes quorum thresholds from it and the `UserStats` aggregation
    /// divides by it, so `0` is rejected at construction.
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Max staleness before a replica is treated as offline.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,

    /// Connection-establishment timeout for new pooled clients.
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,

    /// Maintenance-loop interval.
    #[serde(default = "default_client_cleanup_period_secs")]
    pub client_cleanup_period_secs: u64,

    /// Per-tenant samples/sec.
    #[serde(default = "default_ingestion_rate_limit")]
    pub ingestion_rate_limit: u32,

    /// Per-tenant burst.
    #[serde(default = "default_ingestion_burst_size")]
    pub ingestion_burst_size: u32,
}

fn default_replication_factor() -> usize {
    3
}

fn default_heartbeat_timeout_secs() -> u64 {
    60
}

fn default_remote_timeout_secs() -> u64 {
    2
}

fn default_client_cleanup_period_secs() -> u64 {
    15
}

fn default_ingestion_rate_limit() -> u32 {
    25_000
}

fn default_ingestion_burst_size() -> u32 {
    50_000
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            replication_factor: default_replication_factor(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            remote_timeout_secs: default_remote_timeout_secs(),
            client_cleanup_period_secs: default_client_cleanup_period_secs(),
            ingestion_rate_limit: default_ingestion_rate_limit(),
            ingestion_burst_size: default_ingestion_burst_size(),
        }
    }
}

impl DistributorConfig {
    /// Loads configuration from a TOML file, then validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DistributorError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DistributorError::ConfigInvalid(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from a TOML string, then validates it.
    pub fn from_toml_str(content: &str) -> Result<Self, DistributorError> {
        let config: Self =
            toml::from_str(content).map_err(|e| DistributorError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DistributorError> {
        if self.replication_factor == 0 {
            return Err(DistributorError::ConfigInvalid(
                "replication_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn client_cleanup_period(&self) -> Duration {
        Duration::from_secs(self.client_cleanup_period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DistributorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.replication_factor, 3);
    }

    #[test]
    fn replication_factor_zero_is_rejected() {
        let config = DistributorConfig {
            replication_factor: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = DistributorConfig::from_toml_str("replication_factor = 5\n").unwrap();
        assert_eq!(config.replication_factor, 5);
        assert_eq!(config.ingestion_rate_limit, 25_000);
    }

    #[test]
    fn from_toml_str_rejects_invalid_configuration() {
        let err = DistributorConfig::from_toml_str("replication_factor = 0\n").unwrap_err();
        assert!(matches!(err, DistributorError::ConfigInvalid(_)));
    }

    #[test]
    fn durations_convert_from_seconds() {
        let config = DistributorConfig {
            heartbeat_timeout_secs: 30,
            ..Default::default()
        };
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(30));
    }
}
