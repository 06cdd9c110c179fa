//! In-memory shard cluster
//!
//! Used for testing and local development. Each shard is an independent
//! key/value map; payloads are stored beside a blake3 checksum so full
//! checks can detect corruption the way a real shard-side engine would.

use crate::{ObjectStatus, ShardCluster};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use shardstor_core::{Checksum, Result, ShardId, StorError};
use std::collections::{HashMap, HashSet};

struct StoredObject {
    payload: Bytes,
    checksum: Checksum,
}

/// In-memory cluster of independent shards
pub struct MemoryCluster {
    shards: Vec<ShardId>,
    objects: RwLock<HashMap<ShardId, HashMap<Vec<u8>, StoredObject>>>,
    offline: RwLock<HashSet<ShardId>>,
}

impl MemoryCluster {
    /// Create a cluster with the given shard identifiers.
    pub fn new(shards: Vec<ShardId>) -> Self {
        let objects = shards
            .iter()
            .map(|s| (s.clone(), HashMap::new()))
            .collect();
        Self {
            shards,
            objects: RwLock::new(objects),
            offline: RwLock::new(HashSet::new()),
        }
    }

    /// Create a cluster with `count` shards named `shard-0..shard-count`.
    pub fn with_shard_count(count: usize) -> Self {
        Self::new((0..count).map(|i| ShardId::new(format!("shard-{i}"))).collect())
    }

    /// Flip one byte of a stored payload without updating its checksum,
    /// so a full check reports the object as corrupted.
    pub fn corrupt_object(&self, shard: &ShardId, key: &[u8]) -> bool {
        let mut objects = self.objects.write();
        let Some(object) = objects.get_mut(shard).and_then(|m| m.get_mut(key)) else {
            return false;
        };
        if object.payload.is_empty() {
            return false;
        }
        let mut payload = object.payload.to_vec();
        payload[0] ^= 0xFF;
        object.payload = Bytes::from(payload);
        true
    }

    /// Take a shard offline (or back online); operations against an
    /// offline shard fail with `ShardUnavailable`.
    pub fn set_offline(&self, shard: &ShardId, offline: bool) {
        let mut set = self.offline.write();
        if offline {
            set.insert(shard.clone());
        } else {
            set.remove(shard);
        }
    }

    /// Number of objects currently stored on one shard.
    pub fn object_count(&self, shard: &ShardId) -> usize {
        self.objects
            .read()
            .get(shard)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    fn ensure_online(&self, shard: &ShardId) -> Result<()> {
        if self.offline.read().contains(shard) {
            return Err(StorError::ShardUnavailable {
                shard: shard.to_string(),
                reason: "shard is offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ShardCluster for MemoryCluster {
    fn shards(&self) -> &[ShardId] {
        &self.shards
    }

    async fn write(&self, shard: &ShardId, key: &[u8], payload: Bytes) -> Result<()> {
        self.ensure_online(shard)?;
        let checksum = Checksum::compute(&payload);
        let mut objects = self.objects.write();
        let map = objects.get_mut(shard).ok_or_else(|| StorError::ShardUnavailable {
            shard: shard.to_string(),
            reason: "unknown shard".to_string(),
        })?;
        map.insert(key.to_vec(), StoredObject { payload, checksum });
        Ok(())
    }

    async fn read(&self, shard: &ShardId, key: &[u8]) -> Result<Bytes> {
        self.ensure_online(shard)?;
        let objects = self.objects.read();
        objects
            .get(shard)
            .and_then(|m| m.get(key))
            .map(|o| o.payload.clone())
            .ok_or_else(|| StorError::ShardObjectNotFound {
                shard: shard.to_string(),
            })
    }

    async fn exists(&self, shard: &ShardId, key: &[u8]) -> Result<bool> {
        self.ensure_online(shard)?;
        let objects = self.objects.read();
        Ok(objects.get(shard).is_some_and(|m| m.contains_key(key)))
    }

    async fn delete(&self, shard: &ShardId, key: &[u8]) -> Result<()> {
        self.ensure_online(shard)?;
        let mut objects = self.objects.write();
        if let Some(map) = objects.get_mut(shard) {
            map.remove(key);
        }
        Ok(())
    }

    async fn check(&self, shard: &ShardId, key: &[u8], fast: bool) -> Result<ObjectStatus> {
        self.ensure_online(shard)?;
        let objects = self.objects.read();
        let Some(object) = objects.get(shard).and_then(|m| m.get(key)) else {
            return Ok(ObjectStatus::Missing);
        };
        if fast || object.checksum.verify(&object.payload) {
            Ok(ObjectStatus::Ok)
        } else {
            Ok(ObjectStatus::Corrupted)
        }
    }
}
