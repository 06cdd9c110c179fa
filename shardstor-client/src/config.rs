//! Client configuration
//!
//! Consumed, not produced: file loading and CLI parsing are a caller
//! concern. The same configuration used to write an object must be used
//! to read it back; the stored form is not self-describing.

use serde::{Deserialize, Serialize};
use shardstor_core::{CompressionMode, EncryptionKey, Result, StorError};
use shardstor_pipeline::StrategyConfig;

/// Default block size: 1 MiB
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Largest accepted block size: the transformed block must still fit
/// the u32 length frame of the distributed strategy, with headroom for
/// chain expansion.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX / 2) as usize;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Block size in bytes; the stream is split into blocks of this
    /// size (the last block may be short)
    pub block_size: usize,

    /// Compression stage of the processing chain
    #[serde(default)]
    pub compression: CompressionMode,

    /// Hex-encoded 32-byte AES-256-GCM key; no encryption stage when
    /// absent
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Storage strategy for every block
    pub strategy: StrategyConfig,

    /// Blocks processed concurrently per pipeline call; zero selects a
    /// default derived from available parallelism
    #[serde(default)]
    pub job_count: usize,
}

impl Config {
    /// Configuration with a given strategy and defaults elsewhere.
    pub fn new(strategy: StrategyConfig) -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionMode::None,
            encryption_key: None,
            strategy,
            job_count: 0,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_compression(mut self, mode: CompressionMode) -> Self {
        self.compression = mode;
        self
    }

    pub fn with_encryption_key(mut self, key: &EncryptionKey) -> Self {
        self.encryption_key = Some(hex::encode(key.as_bytes()));
        self
    }

    pub fn with_job_count(mut self, job_count: usize) -> Self {
        self.job_count = job_count;
        self
    }

    /// Decode the configured encryption key, if any.
    pub fn encryption_key(&self) -> Result<Option<EncryptionKey>> {
        let Some(encoded) = &self.encryption_key else {
            return Ok(None);
        };
        let bytes = hex::decode(encoded)
            .map_err(|e| StorError::Configuration(format!("encryption_key is not hex: {e}")))?;
        Ok(Some(EncryptionKey::from_slice(&bytes)?))
    }

    /// Validate the pieces that do not need a cluster to check.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(StorError::Configuration(
                "block_size must be at least 1 byte".to_string(),
            ));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(StorError::Configuration(format!(
                "block_size {} exceeds the {MAX_BLOCK_SIZE}-byte maximum",
                self.block_size
            )));
        }
        match self.strategy {
            StrategyConfig::Distributed { data_shards, .. } if data_shards == 0 => {
                Err(StorError::Configuration(
                    "data_shards must be at least 1".to_string(),
                ))
            }
            StrategyConfig::Replicated { copies } if copies == 0 => Err(StorError::Configuration(
                "replication needs at least 1 copy".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
