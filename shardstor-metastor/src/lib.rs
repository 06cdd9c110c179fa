//! shardstor metadata layer
//!
//! Durable metadata models, the metadata store collaborator contract
//! and the version chain linker.

pub mod linker;
pub mod models;
pub mod store;

pub use linker::Linker;
pub use models::{unix_nanos, Chunk, Metadata, ShardPointer};
pub use store::{MemoryMetaStore, MetadataStore};
