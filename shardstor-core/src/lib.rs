//! shardstor core library
//!
//! Shared building blocks for the shardstor client pipeline:
//! - Unified error type
//! - Blake3 content checksums
//! - The reversible block processing chain (compression, encryption)
//! - Shard identifiers

pub mod checksum;
pub mod error;
pub mod processing;

pub use checksum::Checksum;
pub use error::{Result, StorError};
pub use processing::{
    BlockProcessor, CompressionMode, Compressor, EncryptionKey, Encryptor, ProcessingChain,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one storage shard in the cluster
///
/// Typically the shard's listen address; shardstor only requires it to
/// be unique within the configured shard list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ShardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
