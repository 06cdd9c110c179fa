//! High-level client for shardstor
//!
//! Ties the whole stack together: objects are split into fixed-size
//! blocks, each block runs through the processing chain and a storage
//! strategy, and the resulting chunk list is recorded in the metadata
//! store together with optional version links.

pub mod client;
pub mod config;

pub use client::Client;
pub use config::{Config, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};

pub use shardstor_cluster::{MemoryCluster, ObjectStatus, ShardCluster};
pub use shardstor_core::{CompressionMode, EncryptionKey, Result, ShardId, StorError};
pub use shardstor_metastor::{Chunk, Linker, MemoryMetaStore, Metadata, MetadataStore, ShardPointer};
pub use shardstor_pipeline::{CheckStatus, Pipeline, StrategyConfig};
