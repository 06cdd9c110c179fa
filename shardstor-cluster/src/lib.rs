//! Shard cluster collaborator contract
//!
//! A shard cluster is a set of independent storage endpoints, each
//! supporting per-object write/read/exists/delete plus an integrity
//! check. The wire transport behind each endpoint is out of scope; the
//! pipeline consumes clusters only through the [`ShardCluster`] trait.

pub mod memory;

pub use memory::MemoryCluster;

use async_trait::async_trait;
use bytes::Bytes;
use shardstor_core::{Result, ShardId};

/// Status of one stored object on one shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStatus {
    /// Object is present and its payload verifies
    Ok,
    /// Object is present but its payload does not verify
    Corrupted,
    /// Object is absent
    Missing,
}

/// Abstract set of storage shards
///
/// Implementations must be safe for concurrent use: the cluster
/// connection set is shared read-only across concurrent pipeline calls.
/// Timeouts are the cluster's responsibility; the pipeline applies no
/// additional timeout layer.
#[async_trait]
pub trait ShardCluster: Send + Sync {
    /// The configured shard list, in stable order.
    fn shards(&self) -> &[ShardId];

    /// Store a payload under `key` on one shard.
    async fn write(&self, shard: &ShardId, key: &[u8], payload: Bytes) -> Result<()>;

    /// Fetch the payload stored under `key` on one shard.
    ///
    /// Fails with `ShardObjectNotFound` if the key is absent and
    /// `ShardUnavailable` if the endpoint cannot be reached.
    async fn read(&self, shard: &ShardId, key: &[u8]) -> Result<Bytes>;

    /// Whether `key` exists on one shard.
    async fn exists(&self, shard: &ShardId, key: &[u8]) -> Result<bool>;

    /// Delete the object stored under `key` on one shard.
    ///
    /// Deleting an absent key is not an error.
    async fn delete(&self, shard: &ShardId, key: &[u8]) -> Result<()>;

    /// Check the object stored under `key` on one shard.
    ///
    /// In fast mode only existence is verified; in full mode the stored
    /// payload is verified against its checksum. Missingness is a
    /// status, not an error.
    async fn check(&self, shard: &ShardId, key: &[u8], fast: bool) -> Result<ObjectStatus>;
}
