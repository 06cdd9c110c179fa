//! Erasure-coded storage strategy
//!
//! A transformed block is framed with its length, padded to a multiple
//! of the data shard count, split into `d` data pieces and extended
//! with `p` parity pieces (systematic Reed-Solomon), then spread over
//! `d + p` distinct shards. Any `d` surviving pieces recover the block.

use crate::storage::{piece_key, ChunkStorage, CheckStatus};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use reed_solomon_erasure::galois_8::ReedSolomon;
use shardstor_cluster::{ObjectStatus, ShardCluster};
use shardstor_core::{Result, ShardId, StorError};
use shardstor_metastor::{Chunk, ShardPointer};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Length header prepended to the payload before padding
const FRAME_HEADER: usize = 4;

/// Erasure-coded block storage across `data + parity` shards
pub struct DistributedStorage {
    cluster: Arc<dyn ShardCluster>,
    data_shards: usize,
    parity_shards: usize,
    /// None when `parity_shards == 0`; the payload is then plain-split
    codec: Option<ReedSolomon>,
    /// Placement cursor; rotates the shard list so load spreads evenly
    /// and placement stays reproducible
    cursor: AtomicU64,
}

impl DistributedStorage {
    pub fn new(
        cluster: Arc<dyn ShardCluster>,
        data_shards: usize,
        parity_shards: usize,
    ) -> Result<Self> {
        if data_shards == 0 {
            return Err(StorError::Configuration(
                "data_shards must be at least 1".to_string(),
            ));
        }
        let total = data_shards + parity_shards;
        if total > cluster.shards().len() {
            return Err(StorError::Configuration(format!(
                "strategy needs {total} shards, cluster has {}",
                cluster.shards().len()
            )));
        }
        let codec = if parity_shards > 0 {
            Some(
                ReedSolomon::new(data_shards, parity_shards)
                    .map_err(|e| StorError::ErasureCoding(e.to_string()))?,
            )
        } else {
            None
        };
        Ok(Self {
            cluster,
            data_shards,
            parity_shards,
            codec,
            cursor: AtomicU64::new(0),
        })
    }

    fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Rotate the cluster shard list by the placement cursor and take
    /// `count` distinct shards.
    fn pick_shards(&self, count: usize) -> Vec<ShardId> {
        let shards = self.cluster.shards();
        let start = (self.cursor.fetch_add(1, Ordering::Relaxed) as usize) % shards.len();
        (0..count)
            .map(|i| shards[(start + i) % shards.len()].clone())
            .collect()
    }

    /// Frame, pad and split a payload into `data + parity` pieces.
    fn encode(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            StorError::Configuration(format!(
                "transformed block of {} bytes does not fit the length frame",
                payload.len()
            ))
        })?;
        let framed_len = FRAME_HEADER + payload.len();
        let piece_size = framed_len.div_ceil(self.data_shards);

        let mut framed = Vec::with_capacity(piece_size * self.data_shards);
        framed.extend_from_slice(&len.to_le_bytes());
        framed.extend_from_slice(payload);
        framed.resize(piece_size * self.data_shards, 0);

        let mut pieces: Vec<Vec<u8>> = framed.chunks(piece_size).map(|c| c.to_vec()).collect();
        for _ in 0..self.parity_shards {
            pieces.push(vec![0u8; piece_size]);
        }
        if let Some(codec) = &self.codec {
            codec
                .encode(&mut pieces)
                .map_err(|e| StorError::ErasureCoding(e.to_string()))?;
        }
        Ok(pieces)
    }

    /// Concatenate the data pieces and strip frame and padding.
    fn join(&self, pieces: &[Option<Vec<u8>>]) -> Result<Bytes> {
        let mut framed = Vec::new();
        for piece in pieces.iter().take(self.data_shards) {
            let piece = piece
                .as_ref()
                .ok_or_else(|| StorError::Internal("reconstruction left a data piece empty".to_string()))?;
            framed.extend_from_slice(piece);
        }

        if framed.len() < FRAME_HEADER {
            return Err(StorError::CorruptPayload(
                "reconstructed payload shorter than its length header".to_string(),
            ));
        }
        let mut header = [0u8; FRAME_HEADER];
        header.copy_from_slice(&framed[..FRAME_HEADER]);
        let len = u32::from_le_bytes(header) as usize;
        if framed.len() < FRAME_HEADER + len {
            return Err(StorError::CorruptPayload(format!(
                "length header claims {len} bytes, only {} reconstructed",
                framed.len() - FRAME_HEADER
            )));
        }
        framed.drain(..FRAME_HEADER);
        framed.truncate(len);
        Ok(Bytes::from(framed))
    }

    fn expect_placements(&self, chunk: &Chunk) -> Result<()> {
        if chunk.shards.len() != self.total_shards() {
            return Err(StorError::Configuration(format!(
                "chunk records {} shard pointers, strategy expects {}",
                chunk.shards.len(),
                self.total_shards()
            )));
        }
        Ok(())
    }

    /// Fetch every piece of `chunk` that is present and verifies, in
    /// index position.
    async fn fetch_intact(&self, chunk: &Chunk) -> Vec<Option<Vec<u8>>> {
        let mut fetches: FuturesUnordered<_> = chunk
            .shards
            .iter()
            .enumerate()
            .map(|(index, pointer)| async move {
                let status = self
                    .cluster
                    .check(&pointer.shard, &pointer.key, false)
                    .await;
                let piece = match status {
                    Ok(ObjectStatus::Ok) => {
                        self.cluster.read(&pointer.shard, &pointer.key).await.ok()
                    }
                    _ => None,
                };
                (index, piece.map(|p| p.to_vec()))
            })
            .collect();

        let mut pieces: Vec<Option<Vec<u8>>> = vec![None; chunk.shards.len()];
        while let Some((index, piece)) = fetches.next().await {
            pieces[index] = piece;
        }
        pieces
    }
}

#[async_trait]
impl ChunkStorage for DistributedStorage {
    #[instrument(skip_all, fields(key = %hex::encode(key)))]
    async fn write(&self, key: &[u8], payload: Bytes) -> Result<Vec<ShardPointer>> {
        let pieces = self.encode(&payload)?;
        let targets = self.pick_shards(pieces.len());

        let pointers: Vec<ShardPointer> = targets
            .into_iter()
            .enumerate()
            .map(|(index, shard)| ShardPointer::new(shard, piece_key(key, index)))
            .collect();

        // All piece writes must succeed; pieces already written when a
        // later one fails are not rolled back.
        futures::future::try_join_all(pointers.iter().zip(pieces).map(|(pointer, piece)| {
            self.cluster
                .write(&pointer.shard, &pointer.key, Bytes::from(piece))
        }))
        .await?;

        Ok(pointers)
    }

    async fn read(&self, chunk: &Chunk) -> Result<Bytes> {
        self.expect_placements(chunk)?;

        // A piece is only trusted after a full shard-side check, so a
        // present-but-corrupt piece falls through to parity instead of
        // poisoning reconstruction.
        let mut fetches: FuturesUnordered<_> = chunk
            .shards
            .iter()
            .enumerate()
            .map(|(index, pointer)| async move {
                let piece = match self.cluster.check(&pointer.shard, &pointer.key, false).await {
                    Ok(ObjectStatus::Ok) => {
                        match self.cluster.read(&pointer.shard, &pointer.key).await {
                            Ok(payload) => Some(payload.to_vec()),
                            Err(err) => {
                                debug!(piece = index, error = %err, "piece read failed");
                                None
                            }
                        }
                    }
                    Ok(status) => {
                        debug!(piece = index, ?status, "piece failed verification");
                        None
                    }
                    Err(err) => {
                        debug!(piece = index, error = %err, "piece check failed");
                        None
                    }
                };
                (index, piece)
            })
            .collect();

        // Reconstruct as soon as enough pieces arrive; late responses
        // are dropped with the stream.
        let mut pieces: Vec<Option<Vec<u8>>> = vec![None; chunk.shards.len()];
        let mut available = 0;
        while let Some((index, piece)) = fetches.next().await {
            if piece.is_some() {
                pieces[index] = piece;
                available += 1;
                if available == self.data_shards {
                    break;
                }
            }
        }
        if available < self.data_shards {
            return Err(StorError::InsufficientShards {
                available,
                required: self.data_shards,
            });
        }

        if let Some(codec) = &self.codec {
            codec
                .reconstruct_data(&mut pieces)
                .map_err(|e| StorError::ErasureCoding(e.to_string()))?;
        }
        self.join(&pieces)
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

        let status = if valid == self.total_shards() {
            CheckStatus::Optimal
        } else if valid >= self.data_shards {
            CheckStatus::Valid
        } else if present >= self.data_shards {
            CheckStatus::Invalid
        } else {
            CheckStatus::Missing
        };
        Ok(status)
    }

    #[instrument(skip_all, fields(key = %hex::encode(&chunk.key)))]
    async fn repair(&self, chunk: &Chunk) -> Result<Vec<ShardPointer>> {
        if self.parity_shards == 0 {
            return Err(StorError::RepairNotSupported);
        }
        self.expect_placements(chunk)?;

        let mut pieces = self.fetch_intact(chunk).await;
        let intact: Vec<bool> = pieces.iter().map(|p| p.is_some()).collect();
        let available = intact.iter().filter(|i| **i).count();

        if available < self.data_shards {
            return Err(StorError::InsufficientShards {
                available,
                required: self.data_shards,
            });
        }
        if available == self.total_shards() {
            return Ok(chunk.shards.clone());
        }

        let codec = self
            .codec
            .as_ref()
            .ok_or(StorError::RepairNotSupported)?;
        codec
            .reconstruct(&mut pieces)
            .map_err(|e| StorError::ErasureCoding(e.to_string()))?;

        // Damaged pieces move to shards not already holding an intact
        // piece, chosen by the same rotation as writes.
        let used: HashSet<&ShardId> = chunk
            .shards
            .iter()
            .zip(&intact)
            .filter(|(_, ok)| **ok)
            .map(|(pointer, _)| &pointer.shard)
            .collect();
        let mut replacements = self
            .pick_shards(self.cluster.shards().len())
            .into_iter()
            .filter(|shard| !used.contains(shard));

        let mut pointers = chunk.shards.clone();
        let mut writes = Vec::new();
        let mut stale = Vec::new();
        for index in 0..pointers.len() {
            if intact[index] {
                continue;
            }
            let shard = replacements
                .next()
                .unwrap_or_else(|| pointers[index].shard.clone());
            if shard != pointers[index].shard {
                stale.push(pointers[index].clone());
            }
            pointers[index] = ShardPointer::new(shard, pointers[index].key.clone());
            let piece = pieces[index]
                .clone()
                .ok_or_else(|| StorError::Internal("reconstruction left a piece empty".to_string()))?;
            writes.push((index, Bytes::from(piece)));
        }

        futures::future::try_join_all(writes.into_iter().map(|(index, piece)| {
            let pointer = &pointers[index];
            self.cluster.write(&pointer.shard, &pointer.key, piece)
        }))
        .await?;

        // Corrupt objects left behind on their old shard are dropped
        // best-effort.
        for pointer in stale {
            if let Err(err) = self.cluster.delete(&pointer.shard, &pointer.key).await {
                warn!(shard = %pointer.shard, error = %err, "failed to drop stale piece");
            }
        }

        debug!(
            repaired = self.total_shards() - available,
            "chunk redundancy restored"
        );
        Ok(pointers)
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
