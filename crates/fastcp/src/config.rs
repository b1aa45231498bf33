//! TOML configuration for the fastcp tool.
//!
//! Every section and key is optional; omitted values fall back to the
//! engine defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use fastcp_types::FastCopyConfig;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Copy-engine tuning.
    pub copy: CopySection,
    /// Write-lease renewal.
    pub lease: LeaseSection,
    /// RPC transport tuning.
    pub rpc: RpcSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[copy]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CopySection {
    /// Per-file drain/commit timeout in milliseconds.
    pub file_wait_time_ms: u64,
    /// Good replicas needed for a block to count as copied.
    pub min_replication: u16,
    /// Per-datanode error threshold.
    pub max_datanode_errors: u64,
    /// Concurrent replica copies per file.
    pub block_pool_size: usize,
    /// Concurrent files (overridden by `--threads`).
    pub file_pool_size: usize,
}

impl Default for CopySection {
    fn default() -> Self {
        let defaults = FastCopyConfig::default();
        Self {
            file_wait_time_ms: defaults.file_wait_time.as_millis() as u64,
            min_replication: defaults.min_replication,
            max_datanode_errors: defaults.max_datanode_errors,
            block_pool_size: defaults.block_pool_size,
            file_pool_size: defaults.file_pool_size,
        }
    }
}

/// `[lease]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LeaseSection {
    /// Renewal cadence in milliseconds.
    pub renew_interval_ms: u64,
}

impl Default for LeaseSection {
    fn default() -> Self {
        Self {
            renew_interval_ms: FastCopyConfig::default().lease_renew_interval.as_millis() as u64,
        }
    }
}

/// `[rpc]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    /// Timeout of one datanode copy-block call, in milliseconds.
    pub datanode_timeout_ms: u64,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            datanode_timeout_ms: fastcp_ipc::DEFAULT_DATANODE_TIMEOUT.as_millis() as u64,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load a config file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Engine configuration, with the `--threads` override applied.
    pub fn engine_config(&self, threads: Option<usize>) -> FastCopyConfig {
        FastCopyConfig {
            file_wait_time: Duration::from_millis(self.copy.file_wait_time_ms),
            min_replication: self.copy.min_replication,
            max_datanode_errors: self.copy.max_datanode_errors,
            block_pool_size: self.copy.block_pool_size,
            file_pool_size: threads.unwrap_or(self.copy.file_pool_size),
            lease_renew_interval: Duration::from_millis(self.lease.renew_interval_ms),
        }
    }

    /// Timeout of one datanode copy-block call.
    pub fn datanode_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.datanode_timeout_ms)
    }
}
