//! Error types for shardstor
//!
//! Provides a unified error type shared by all shardstor crates.

use thiserror::Error;

/// Result type alias for shardstor operations
pub type Result<T> = std::result::Result<T, StorError>;

/// Unified error type for shardstor
#[derive(Error, Debug)]
pub enum StorError {
    // ===== Storage Strategy Errors =====
    #[error("Insufficient shards: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    #[error("Storage strategy has no redundancy, repair is not supported")]
    RepairNotSupported,

    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    // ===== Processing Chain Errors =====
    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ===== Shard Cluster Errors =====
    #[error("Shard {shard} unavailable: {reason}")]
    ShardUnavailable { shard: String, reason: String },

    #[error("Object not found on shard {shard}")]
    ShardObjectNotFound { shard: String },

    // ===== Metadata Errors =====
    #[error("Metadata not found for key {key}")]
    MetadataNotFound { key: String },

    #[error("Metadata store error: {0}")]
    MetadataStore(String),

    #[error("Version chain left dangling: previous metadata persisted, current failed: {0}")]
    DanglingLink(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorError {
    /// Build a `MetadataNotFound` error for a raw object key.
    pub fn metadata_not_found(key: &[u8]) -> Self {
        StorError::MetadataNotFound {
            key: hex::encode(key),
        }
    }
}
