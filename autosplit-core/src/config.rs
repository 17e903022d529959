//! Configuration for the split ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Three days in host time units (milliseconds)
pub const DEFAULT_VOTING_WINDOW_MS: u64 = 3 * 24 * 60 * 60 * 1000;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Prefix for every storage key and emitted event
    pub namespace: String,

    /// Currency symbol used when a team is created without one
    pub native_currency: String,

    /// Proposal voting rules
    pub governance: GovernanceConfig,

    /// Read-side defaults
    pub queries: QueryConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/autosplit"),
            service_name: "autosplit-core".to_string(),
            namespace: "autosplit:".to_string(),
            native_currency: "MASSA".to_string(),
            governance: GovernanceConfig::default(),
            queries: QueryConfig::default(),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// Governance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Time between proposal creation and the end of voting
    pub voting_window_ms: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            voting_window_ms: DEFAULT_VOTING_WINDOW_MS,
        }
    }
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of payments returned when the caller gives no limit
    pub default_payment_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_payment_limit: 25,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("AUTOSPLIT_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(namespace) = std::env::var("AUTOSPLIT_NAMESPACE") {
            config.namespace = namespace;
        }

        if let Ok(symbol) = std::env::var("AUTOSPLIT_NATIVE_CURRENCY") {
            config.native_currency = symbol;
        }

        if let Ok(window) = std::env::var("AUTOSPLIT_VOTING_WINDOW_MS") {
            config.governance.voting_window_ms = window.parse().map_err(|e| {
                crate::Error::Config(format!("AUTOSPLIT_VOTING_WINDOW_MS: {}", e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.namespace.is_empty() {
            return Err(crate::Error::Config("namespace must not be empty".to_string()));
        }
        if self.native_currency.is_empty() {
            return Err(crate::Error::Config(
                "native_currency must not be empty".to_string(),
            ));
        }
        if self.governance.voting_window_ms == 0 {
            return Err(crate::Error::Config(
                "voting_window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "autosplit-core");
        assert_eq!(config.namespace, "autosplit:");
        assert_eq!(config.native_currency, "MASSA");
        assert_eq!(config.governance.voting_window_ms, 259_200_000);
        assert_eq!(config.queries.default_payment_limit, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autosplit.toml");
        std::fs::write(
            &path,
            "namespace = \"split:\"\n\n[governance]\nvoting_window_ms = 1000\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.namespace, "split:");
        assert_eq!(config.governance.voting_window_ms, 1000);
        assert_eq!(config.native_currency, "MASSA");
        assert_eq!(config.queries.default_payment_limit, 25);
    }

    #[test]
    fn test_zero_voting_window_rejected() {
        let mut config = Config::default();
        config.governance.voting_window_ms = 0;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
