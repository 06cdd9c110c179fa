//! Block storage strategies
//!
//! A storage strategy places one transformed block onto the shard
//! cluster and can later read, check, repair and delete it. Two
//! strategies exist: [`DistributedStorage`] (erasure-coded splitting
//! across data+parity shards) and [`ReplicatedStorage`] (full-copy
//! duplication). Strategy selection is a pure data decision via
//! [`StrategyConfig`].

pub mod distributed;
pub mod replicated;

pub use distributed::DistributedStorage;
pub use replicated::ReplicatedStorage;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shardstor_cluster::ShardCluster;
use shardstor_core::Result;
use shardstor_metastor::{Chunk, ShardPointer};
use std::sync::Arc;

/// Health of one stored chunk, worst to best
///
/// The `Ord` derive makes aggregation a `min` fold: the overall status
/// of a chunk list is its worst member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CheckStatus {
    /// Too few pieces survive to recover the block
    Missing,
    /// Enough pieces are present but some fail verification
    Invalid,
    /// The block is recoverable but redundancy is degraded
    Valid,
    /// Every piece is present and verifies
    Optimal,
}

/// Capability interface of a block storage strategy
#[async_trait]
pub trait ChunkStorage: Send + Sync {
    /// Store one transformed block, returning its shard placements in
    /// stable piece-index order.
    async fn write(&self, key: &[u8], payload: Bytes) -> Result<Vec<ShardPointer>>;

    /// Recover the transformed block described by `chunk`.
    async fn read(&self, chunk: &Chunk) -> Result<Bytes>;

    /// Report the health of `chunk`; fast mode verifies existence only.
    async fn check(&self, chunk: &Chunk, fast: bool) -> Result<CheckStatus>;

    /// Restore full redundancy for `chunk`, returning the updated shard
    /// placements.
    async fn repair(&self, chunk: &Chunk) -> Result<Vec<ShardPointer>>;

    /// Delete every piece of `chunk`; absent pieces are not an error.
    async fn delete(&self, chunk: &Chunk) -> Result<()>;
}

/// Storage strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Erasure-coded splitting across `data_shards + parity_shards`
    /// distinct shards
    Distributed {
        data_shards: usize,
        parity_shards: usize,
    },
    /// Identical copies on `copies` distinct shards
    Replicated { copies: usize },
}

impl StrategyConfig {
    /// Number of shard placements per chunk under this strategy.
    pub fn placements(&self) -> usize {
        match *self {
            StrategyConfig::Distributed {
                data_shards,
                parity_shards,
            } => data_shards + parity_shards,
            StrategyConfig::Replicated { copies } => copies,
        }
    }

    /// Build the strategy against a cluster.
    pub fn build(&self, cluster: Arc<dyn ShardCluster>) -> Result<Arc<dyn ChunkStorage>> {
        match *self {
            StrategyConfig::Distributed {
                data_shards,
                parity_shards,
            } => Ok(Arc::new(DistributedStorage::new(
                cluster,
                data_shards,
                parity_shards,
            )?)),
            StrategyConfig::Replicated { copies } => {
                Ok(Arc::new(ReplicatedStorage::new(cluster, copies)?))
            }
        }
    }
}

/// Object key of one piece on its shard: the chunk key with the piece
/// index appended.
pub(crate) fn piece_key(key: &[u8], index: usize) -> Bytes {
    let mut piece = Vec::with_capacity(key.len() + 4);
    piece.extend_from_slice(key);
    piece.extend_from_slice(&(index as u32).to_le_bytes());
    Bytes::from(piece)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_ordering() {
        assert!(CheckStatus::Missing < CheckStatus::Invalid);
        assert!(CheckStatus::Invalid < CheckStatus::Valid);
        assert!(CheckStatus::Valid < CheckStatus::Optimal);

        // Aggregation is worst-wins.
        let worst = [CheckStatus::Optimal, CheckStatus::Valid, CheckStatus::Optimal]
            .into_iter()
            .min()
            .unwrap();
        assert_eq!(worst, CheckStatus::Valid);
    }

    #[test]
    fn test_piece_keys_are_distinct() {
        let a = piece_key(b"chunk", 0);
        let b = piece_key(b"chunk", 1);
        assert_ne!(a, b);
        assert!(a.starts_with(b"chunk"));
    }

    #[test]
    fn test_strategy_placements() {
        let distributed = StrategyConfig::Distributed {
            data_shards: 3,
            parity_shards: 1,
        };
        assert_eq!(distributed.placements(), 4);

        let replicated = StrategyConfig::Replicated { copies: 3 };
        assert_eq!(replicated.placements(), 3);
    }
}
