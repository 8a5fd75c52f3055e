//! Configuration for logkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KvError, Result};

/// Main configuration for a logkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── segments/
    ///           ├── segment_000001_000.log
    ///           └── segment_000002_000.log   (active)
    pub data_dir: PathBuf,

    /// Active segment is sealed and rotated once it reaches this many bytes
    pub max_segment_size: u64,

    /// How often appends are forced to disk
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Merge Configuration
    // -------------------------------------------------------------------------
    /// Period of the background merge worker (`None` disables it)
    pub merge_interval: Option<Duration>,

    /// Minimum number of sealed segments before a merge is worth running
    pub merge_min_segments: usize,

    /// Maximum number of sealed segments folded into one merge
    pub merge_max_batch: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections (size of the worker pool)
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

/// Segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced appends (balanced durability/performance)
    EveryNEntries { count: usize },

    /// fsync only when a segment is sealed or the store is synced/closed
    OnSeal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./logkv_data"),
            max_segment_size: 10 * 1024 * 1024, // 10 MB
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            merge_interval: Some(Duration::from_secs(30)),
            merge_min_segments: 2,
            merge_max_batch: 8,
            listen_addr: "127.0.0.1:8083".to_string(),
            max_connections: 64,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_segment_size == 0 {
            return Err(KvError::Config(
                "max_segment_size must be greater than zero".to_string(),
            ));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(KvError::Config(
                "EveryNEntries sync count must be greater than zero".to_string(),
            ));
        }
        if self.merge_min_segments == 0 {
            return Err(KvError::Config(
                "merge_min_segments must be at least 1".to_string(),
            ));
        }
        if self.merge_max_batch < self.merge_min_segments {
            return Err(KvError::Config(format!(
                "merge_max_batch ({}) is smaller than merge_min_segments ({})",
                self.merge_max_batch, self.merge_min_segments
            )));
        }
        if self.merge_interval == Some(Duration::ZERO) {
            return Err(KvError::Config(
                "merge_interval must be non-zero (use None to disable)".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(KvError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the segment rotation threshold (in bytes)
    pub fn max_segment_size(mut self, size: u64) -> Self {
        self.config.max_segment_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the background merge period; `None` disables the worker
    pub fn merge_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.merge_interval = interval;
        self
    }

    /// Set the sealed segment count that makes a merge eligible
    pub fn merge_min_segments(mut self, count: usize) -> Self {
        self.config.merge_min_segments = count;
        self
    }

    /// Set the maximum number of segments merged at once
    pub fn merge_max_batch(mut self, count: usize) -> Self {
        self.config.merge_max_batch = count;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
