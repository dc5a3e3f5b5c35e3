//! Configuration
//!
//! Declarative TOML configuration matching the four key groups the system
//! exposes: network, wal, replication, logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub wal: WalConfig,

    #[serde(default)]
    pub replication: ReplicationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            wal: WalConfig::default(),
            replication: ReplicationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Client-facing TCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            max_connections: default_max_connections(),
        }
    }
}

/// Write-ahead log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Size with unit suffix (B/KB/MB/GB/TB), e.g. "64MB"
    #[serde(default = "default_max_segment_size")]
    pub max_segment_size: String,

    #[serde(default = "default_flushing_batch_size")]
    pub flushing_batch_size: usize,

    /// Duration in milliseconds
    #[serde(default = "default_flushing_batch_timeout_ms")]
    pub flushing_batch_timeout_ms: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_segment_size: default_max_segment_size(),
            flushing_batch_size: default_flushing_batch_size(),
            flushing_batch_timeout_ms: default_flushing_batch_timeout_ms(),
        }
    }
}

impl WalConfig {
    /// Parsed max segment size in bytes.
    pub fn max_segment_size_bytes(&self) -> Result<u64> {
        parse_size(&self.max_segment_size)
    }

    pub fn flushing_batch_timeout(&self) -> Duration {
        Duration::from_millis(self.flushing_batch_timeout_ms)
    }
}

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// This node's id. 0 means "derive one from the clock at startup".
    #[serde(default)]
    pub id: i64,

    /// This node's own address, reachable by peers.
    #[serde(default = "default_replication_host")]
    pub host: String,

    /// Every address in the cluster, including this node's own.
    #[serde(default)]
    pub cluster: Vec<String>,

    /// Sync tick interval in milliseconds.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            id: 0,
            host: default_replication_host(),
            cluster: Vec::new(),
            sync_interval_ms: default_sync_interval_ms(),
        }
    }
}

impl ReplicationConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Peer addresses, excluding this node's own host.
    pub fn peers(&self) -> Vec<String> {
        self.cluster
            .iter()
            .filter(|addr| addr.as_str() != self.host)
            .cloned()
            .collect()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: default_log_output(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:3223".to_string()
}

fn default_max_connections() -> usize {
    1
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/nanokv/wal")
}

fn default_max_segment_size() -> String {
    "64MB".to_string()
}

fn default_flushing_batch_size() -> usize {
    100
}

fn default_flushing_batch_timeout_ms() -> u64 {
    100
}

fn default_replication_host() -> String {
    String::new()
}

fn default_sync_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_output() -> String {
    "/var/log/nanokv/output.log".to_string()
}

/// Parse a size string with a unit suffix (B/KB/MB/GB/TB) into a byte count.
///
/// Mirrors the unit table of the size-parsing helper this configuration
/// format was distilled from.
pub fn parse_size(size: &str) -> Result<u64> {
    let split_at = size
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size.len());

    let (digits, unit) = size.split_at(split_at);
    let value: u64 = digits
        .parse()
        .map_err(|_| Error::Config(format!("invalid size: {size}")))?;

    let multiplier: u64 = match unit {
        "" | "B" => 1,
        "KB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        "TB" => 1024 * 1024 * 1024 * 1024,
        other => return Err(Error::Config(format!("unknown size unit: {other}"))),
    };

    Ok(value * multiplier)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.network.address.is_empty() {
            return Err(Error::Config("network.address cannot be empty".into()));
        }
        if self.network.max_connections == 0 {
            return Err(Error::Config("network.max_connections must be > 0".into()));
        }
        self.wal.max_segment_size_bytes()?;
        if !self.replication.cluster.is_empty() {
            if self.replication.host.is_empty() {
                return Err(Error::Config(
                    "replication.host must be set when replication.cluster is non-empty".into(),
                ));
            }
            if !(0..1_000_000_000_000_000_000i64).contains(&self.replication.id) {
                return Err(Error::Config(
                    "replication.id must fit in 18 decimal digits".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.network.address, "0.0.0.0:3223");
        assert_eq!(config.network.max_connections, 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config_full() {
        let toml = r#"
[network]
address = "0.0.0.0:3223"
max_connections = 64

[wal]
data_dir = "/tmp/nanokv/wal"
max_segment_size = "128MB"
flushing_batch_size = 500
flushing_batch_timeout_ms = 250

[replication]
host = "127.0.0.1:4000"
cluster = ["127.0.0.1:4000", "127.0.0.1:4001"]
sync_interval_ms = 500

[logging]
level = "debug"
output = "stdout"
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.network.max_connections, 64);
        assert_eq!(config.wal.max_segment_size_bytes().unwrap(), 128 * 1024 * 1024);
        assert_eq!(config.replication.peers(), vec!["127.0.0.1:4001".to_string()]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("64MB").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_size("512B").unwrap(), 512);
        assert_eq!(parse_size("1GB").unwrap(), 1024 * 1024 * 1024);
        assert!(parse_size("64XB").is_err());
    }
}
