//! Durable metadata models
//!
//! A [`Metadata`] record describes one stored object: its chunks (one
//! per block of the original stream, in block order), total size and the
//! previous/next pointers of the version chain.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shardstor_core::ShardId;
use std::time::{SystemTime, UNIX_EPOCH};

/// One physical storage location of a block's transformed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPointer {
    /// Shard the payload was written to
    pub shard: ShardId,

    /// Object key on that shard; usually the chunk key combined with a
    /// piece index, it need not equal the logical key
    pub key: Bytes,
}

impl ShardPointer {
    pub fn new(shard: ShardId, key: impl Into<Bytes>) -> Self {
        Self {
            shard,
            key: key.into(),
        }
    }
}

/// Durable record of one stored block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk key, derived from the plaintext block content
    pub key: Bytes,

    /// Plaintext block size in bytes
    pub size: u64,

    /// Shard placements in piece-index order (0..n-1); the order must be
    /// stable so erasure reconstruction aligns pieces correctly
    pub shards: Vec<ShardPointer>,
}

/// Durable record for one object key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Logical object key
    pub key: Bytes,

    /// Total object size; always the sum of the chunk sizes
    pub size: u64,

    /// Unix nanoseconds at first write
    pub creation_epoch: i64,

    /// Unix nanoseconds at the most recent write or repair
    pub last_write_epoch: i64,

    /// Chunks in block order
    pub chunks: Vec<Chunk>,

    /// Key of the previous version, if any
    pub previous_key: Option<Bytes>,

    /// Key of the next version, if any
    pub next_key: Option<Bytes>,
}

impl Metadata {
    /// Create empty metadata for `key` with both epochs set to now.
    pub fn new(key: impl Into<Bytes>) -> Self {
        let now = unix_nanos();
        Self {
            key: key.into(),
            size: 0,
            creation_epoch: now,
            last_write_epoch: now,
            chunks: Vec::new(),
            previous_key: None,
            next_key: None,
        }
    }

    /// Replace the chunk list, recomputing `size` and refreshing the
    /// last-write epoch.
    pub fn set_chunks(&mut self, chunks: Vec<Chunk>) {
        self.size = chunks.iter().map(|c| c.size).sum();
        self.chunks = chunks;
        self.last_write_epoch = unix_nanos();
    }
}

/// Current time as Unix nanoseconds.
pub fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metadata() {
        let md = Metadata::new(&b"object"[..]);
        assert_eq!(md.key, Bytes::from_static(b"object"));
        assert_eq!(md.size, 0);
        assert!(md.chunks.is_empty());
        assert!(md.previous_key.is_none());
        assert!(md.next_key.is_none());
        assert_eq!(md.creation_epoch, md.last_write_epoch);
    }

    #[test]
    fn test_set_chunks_updates_size() {
        let mut md = Metadata::new(&b"object"[..]);
        let created = md.last_write_epoch;

        md.set_chunks(vec![
            Chunk {
                key: Bytes::from_static(b"c0"),
                size: 64,
                shards: vec![ShardPointer::new(ShardId::new("shard-0"), &b"c0-0"[..])],
            },
            Chunk {
                key: Bytes::from_static(b"c1"),
                size: 2,
                shards: vec![ShardPointer::new(ShardId::new("shard-1"), &b"c1-0"[..])],
            },
        ]);

        assert_eq!(md.size, 66);
        assert!(md.last_write_epoch >= created);
    }

    #[test]
    fn test_metadata_bincode_roundtrip() {
        let mut md = Metadata::new(&b"object"[..]);
        md.previous_key = Some(Bytes::from_static(b"older"));
        md.set_chunks(vec![Chunk {
            key: Bytes::from_static(b"c0"),
            size: 7,
            shards: vec![
                ShardPointer::new(ShardId::new("shard-0"), &b"c0-0"[..]),
                ShardPointer::new(ShardId::new("shard-1"), &b"c0-1"[..]),
            ],
        }]);

        let encoded = bincode::serialize(&md).unwrap();
        let decoded: Metadata = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, md);
    }
}
