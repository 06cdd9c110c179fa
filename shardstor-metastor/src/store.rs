//! Metadata store contract and in-memory implementation
//!
//! The production metadata store (an etcd- or SQL-backed service) is a
//! collaborator; shardstor consumes it only through [`MetadataStore`].
//! The store is assumed to provide at least last-writer-wins semantics
//! per key.

use crate::models::Metadata;
use async_trait::async_trait;
use parking_lot::RwLock;
use shardstor_core::{Result, StorError};
use std::collections::HashMap;

/// Durable store for per-object metadata
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the metadata stored under `key`.
    ///
    /// Fails with `MetadataNotFound` if the key is unknown.
    async fn get(&self, key: &[u8]) -> Result<Metadata>;

    /// Persist `metadata` under its own key, replacing any previous
    /// record.
    async fn set(&self, metadata: Metadata) -> Result<()>;

    /// Delete the metadata stored under `key`; absent keys are not an
    /// error.
    async fn delete(&self, key: &[u8]) -> Result<()>;
}

/// In-memory metadata store
///
/// Values are kept bincode-encoded, the same way a networked store
/// would hold them, so serialization problems surface in tests.
#[derive(Default)]
pub struct MemoryMetaStore {
    records: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetaStore {
    async fn get(&self, key: &[u8]) -> Result<Metadata> {
        let records = self.records.read();
        let encoded = records
            .get(key)
            .ok_or_else(|| StorError::metadata_not_found(key))?;
        bincode::deserialize(encoded).map_err(|e| StorError::Serialization(e.to_string()))
    }

    async fn set(&self, metadata: Metadata) -> Result<()> {
        let encoded =
            bincode::serialize(&metadata).map_err(|e| StorError::Serialization(e.to_string()))?;
        self.records
            .write()
            .insert(metadata.key.to_vec(), encoded);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.records.write().remove(key);
        Ok(())
    }
}
