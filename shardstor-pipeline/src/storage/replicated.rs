//! Replicated storage strategy
//!
//! The identical transformed block is written to `copies` distinct
//! shards. One intact replica suffices to read; repair copies an intact
//! replica over every damaged position.

use crate::storage::{piece_key, ChunkStorage, CheckStatus};
use async_trait::async_trait;
use bytes::Bytes;
use shardstor_cluster::{ObjectStatus, ShardCluster};
use shardstor_core::{Result, ShardId, StorError};
use shardstor_metastor::{Chunk, ShardPointer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Full-copy block storage across `copies` shards
pub struct ReplicatedStorage {
    cluster: Arc<dyn ShardCluster>,
    copies: usize,
    cursor: AtomicU64,
}

impl ReplicatedStorage {
    pub fn new(cluster: Arc<dyn ShardCluster>, copies: usize) -> Result<Self> {
        if copies == 0 {
            return Err(StorError::Configuration(
                "replication needs at least 1 copy".to_string(),
            ));
        }
        if copies > cluster.shards().len() {
            return Err(StorError::Configuration(format!(
                "strategy needs {copies} shards, cluster has {}",
                cluster.shards().len()
            )));
        }
        Ok(Self {
            cluster,
            copies,
            cursor: AtomicU64::new(0),
        })
    }

    fn pick_shards(&self, count: usize) -> Vec<ShardId> {
        let shards = self.cluster.shards();
        let start = (self.cursor.fetch_add(1, Ordering::Relaxed) as usize) % shards.len();
        (0..count)
            .map(|i| shards[(start + i) % shards.len()].clone())
            .collect()
    }

    fn expect_placements(&self, chunk: &Chunk) -> Result<()> {
        if chunk.shards.len() != self.copies {
            return Err(StorError::Configuration(format!(
                "chunk records {} shard pointers, strategy expects {}",
                chunk.shards.len(),
                self.copies
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStorage for ReplicatedStorage {
    #[instrument(skip_all, fields(key = %hex::encode(key)))]
    async fn write(&self, key: &[u8], payload: Bytes) -> Result<Vec<ShardPointer>> {
        let targets = self.pick_shards(self.copies);
        let pointers: Vec<ShardPointer> = targets
            .into_iter()
            .enumerate()
            .map(|(index, shard)| ShardPointer::new(shard, piece_key(key, index)))
            .collect();

        // No partial-replica success counts as durable: every write
        // must land or the block write fails as a whole.
        futures::future::try_join_all(
            pointers
                .iter()
                .map(|pointer| self.cluster.write(&pointer.shard, &pointer.key, payload.clone())),
        )
        .await?;

        Ok(pointers)
    }

    async fn read(&self, chunk: &Chunk) -> Result<Bytes> {
        self.expect_placements(chunk)?;

        // Replicas are tried in recorded order; the first shard that
        // responds with a verifying payload wins.
        for pointer in &chunk.shards {
            match self.cluster.check(&pointer.shard, &pointer.key, false).await {
                Ok(ObjectStatus::Ok) => {}
                _ => continue,
            }
            match self.cluster.read(&pointer.shard, &pointer.key).await {
                Ok(payload) => return Ok(payload),
                Err(err) => debug!(shard = %pointer.shard, error = %err, "replica read failed"),
            }
        }

        Err(StorError::InsufficientShards {
            available: 0,
            required: 1,
        })
    }

    async fn check(&self, chunk: &Chunk, fast: bool) -> Result<CheckStatus> {
        self.expect_placements(chunk)?;

        let statuses =
            futures::future::join_all(chunk.shards.iter().map(|pointer| async move {
                self.cluster
                    .check(&pointer.shard, &pointer.key, fast)
                    .await
                    .unwrap_or(ObjectStatus::Missing)
            }))
            .await;

        let valid = statuses.iter().filter(|s| **s == ObjectStatus::Ok).count();
        let present = statuses.iter().filter(|s| **s != ObjectStatus::Missing).count();

        let status = if valid == self.copies {
            CheckStatus::Optimal
        } else if valid >= 1 {
            CheckStatus::Valid
        } else if present >= 1 {
            CheckStatus::Invalid
        } else {
            CheckStatus::Missing
        };
        Ok(status)
    }

    #[instrument(skip_all, fields(key = %hex::encode(&chunk.key)))]
    async fn repair(&self, chunk: &Chunk) -> Result<Vec<ShardPointer>> {
        if self.copies == 1 {
            return Err(StorError::RepairNotSupported);
        }
        self.expect_placements(chunk)?;

        // Find one intact replica and the damaged positions.
        let mut payload = None;
        let mut damaged = Vec::new();
        for (index, pointer) in chunk.shards.iter().enumerate() {
            let ok = matches!(
                self.cluster.check(&pointer.shard, &pointer.key, false).await,
                Ok(ObjectStatus::Ok)
            );
            if !ok {
                damaged.push(index);
                continue;
            }
            if payload.is_none() {
                payload = self.cluster.read(&pointer.shard, &pointer.key).await.ok();
                if payload.is_none() {
                    damaged.push(index);
                }
            }
        }

        let Some(payload) = payload else {
            return Err(StorError::InsufficientShards {
                available: 0,
                required: 1,
            });
        };
        if damaged.is_empty() {
            return Ok(chunk.shards.clone());
        }

        // Each damaged position gets the intact payload rewritten on
        // its recorded shard.
        futures::future::try_join_all(damaged.iter().map(|&index| {
            let pointer = &chunk.shards[index];
            self.cluster
                .write(&pointer.shard, &pointer.key, payload.clone())
        }))
        .await?;

        debug!(repaired = damaged.len(), "replicas restored");
        Ok(chunk.shards.clone())
    }

    async fn delete(&self, chunk: &Chunk) -> Result<()> {
        futures::future::try_join_all(
            chunk
                .shards
                .iter()
                .map(|pointer| self.cluster.delete(&pointer.shard, &pointer.key)),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardstor_cluster::MemoryCluster;
    use std::collections::HashSet;

    fn storage(shards: usize, copies: usize) -> (Arc<MemoryCluster>, ReplicatedStorage) {
        let cluster = Arc::new(MemoryCluster::with_shard_count(shards));
        let storage = ReplicatedStorage::new(cluster.clone(), copies).unwrap();
        (cluster, storage)
    }

    fn chunk(key: &[u8], size: u64, pointers: Vec<ShardPointer>) -> Chunk {
        Chunk {
            key: Bytes::copy_from_slice(key),
            size,
            shards: pointers,
        }
    }

    #[test]
    fn test_rejects_zero_copies() {
        let cluster = Arc::new(MemoryCluster::with_shard_count(3));
        assert!(matches!(
            ReplicatedStorage::new(cluster, 0),
            Err(StorError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_write_places_distinct_replicas() {
        let (cluster, storage) = storage(4, 3);
        let pointers = storage
            .write(b"chunk", Bytes::from_static(b"replicated block"))
            .await
            .unwrap();
        assert_eq!(pointers.len(), 3);

        let shards: HashSet<_> = pointers.iter().map(|p| &p.shard).collect();
        assert_eq!(shards.len(), 3);
        for pointer in &pointers {
            assert_eq!(
                cluster.read(&pointer.shard, &pointer.key).await.unwrap(),
                Bytes::from_static(b"replicated block")
            );
        }
    }

    #[tokio::test]
    async fn test_write_fails_when_any_replica_fails() {
        let (cluster, storage) = storage(3, 3);
        cluster.set_offline(&cluster.shards()[1].clone(), true);

        let err = storage
            .write(b"chunk", Bytes::from_static(b"block"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorError::ShardUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_read_survives_all_but_one_loss() {
        let (cluster, storage) = storage(4, 3);
        let payload = Bytes::from_static(b"replicated block");
        let pointers = storage.write(b"chunk", payload.clone()).await.unwrap();
        let chunk = chunk(b"chunk", payload.len() as u64, pointers);

        for pointer in chunk.shards.iter().take(2) {
            cluster.delete(&pointer.shard, &pointer.key).await.unwrap();
        }
        assert_eq!(storage.read(&chunk).await.unwrap(), payload);

        cluster
            .delete(&chunk.shards[2].shard, &chunk.shards[2].key)
            .await
            .unwrap();
        assert!(matches!(
            storage.read(&chunk).await.unwrap_err(),
            StorError::InsufficientShards { .. }
        ));
    }

    #[tokio::test]
    async fn test_read_skips_corrupt_replica() {
        let (cluster, storage) = storage(4, 2);
        let payload = Bytes::from_static(b"replicated block");
        let pointers = storage.write(b"chunk", payload.clone()).await.unwrap();
        let chunk = chunk(b"chunk", payload.len() as u64, pointers);

        assert!(cluster.corrupt_object(&chunk.shards[0].shard, &chunk.shards[0].key));
        assert_eq!(storage.read(&chunk).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_check_status_scale() {
        let (cluster, storage) = storage(4, 3);
        let payload = Bytes::from_static(b"block");
        let pointers = storage.write(b"chunk", payload.clone()).await.unwrap();
        let chunk = chunk(b"chunk", payload.len() as u64, pointers);

        assert_eq!(storage.check(&chunk, false).await.unwrap(), CheckStatus::Optimal);

        cluster
            .delete(&chunk.shards[0].shard, &chunk.shards[0].key)
            .await
            .unwrap();
        assert_eq!(storage.check(&chunk, false).await.unwrap(), CheckStatus::Valid);

        cluster
            .delete(&chunk.shards[1].shard, &chunk.shards[1].key)
            .await
            .unwrap();
        assert!(cluster.corrupt_object(&chunk.shards[2].shard, &chunk.shards[2].key));
        assert_eq!(storage.check(&chunk, false).await.unwrap(), CheckStatus::Invalid);

        cluster
            .delete(&chunk.shards[2].shard, &chunk.shards[2].key)
            .await
            .unwrap();
        assert_eq!(storage.check(&chunk, false).await.unwrap(), CheckStatus::Missing);
    }

    #[tokio::test]
    async fn test_repair_restores_replicas() {
        let (cluster, storage) = storage(4, 3);
        let payload = Bytes::from_static(b"replicated block");
        let pointers = storage.write(b"chunk", payload.clone()).await.unwrap();
        let chunk = chunk(b"chunk", payload.len() as u64, pointers.clone());

        cluster
            .delete(&chunk.shards[0].shard, &chunk.shards[0].key)
            .await
            .unwrap();
        assert!(cluster.corrupt_object(&chunk.shards[2].shard, &chunk.shards[2].key));

        let repaired = storage.repair(&chunk).await.unwrap();
        assert_eq!(repaired, pointers);

        let healed = Chunk {
            key: chunk.key.clone(),
            size: chunk.size,
            shards: repaired,
        };
        assert_eq!(storage.check(&healed, false).await.unwrap(), CheckStatus::Optimal);
    }

    #[tokio::test]
    async fn test_repair_with_no_intact_replica_fails() {
        let (cluster, storage) = storage(4, 2);
        let payload = Bytes::from_static(b"block");
        let pointers = storage.write(b"chunk", payload.clone()).await.unwrap();
        let chunk = chunk(b"chunk", payload.len() as u64, pointers);

        for pointer in &chunk.shards {
            cluster.delete(&pointer.shard, &pointer.key).await.unwrap();
        }
        assert!(matches!(
            storage.repair(&chunk).await.unwrap_err(),
            StorError::InsufficientShards { .. }
        ));
    }

    #[tokio::test]
    async fn test_single_copy_repair_not_supported() {
        let (_, storage) = storage(3, 1);
        let payload = Bytes::from_static(b"block");
        let pointers = storage.write(b"chunk", payload.clone()).await.unwrap();
        let chunk = chunk(b"chunk", payload.len() as u64, pointers);

        assert!(matches!(
            storage.repair(&chunk).await.unwrap_err(),
            StorError::RepairNotSupported
        ));
    }
}
