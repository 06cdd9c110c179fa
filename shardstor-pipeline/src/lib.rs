//! shardstor data pipeline
//!
//! Storage strategies (erasure-coded and replicated) and the parallel
//! block pipeline that drives streams through the processing chain and
//! a strategy.

pub mod pipeline;
pub mod storage;

pub use pipeline::{default_job_count, Pipeline};
pub use storage::{
    CheckStatus, ChunkStorage, DistributedStorage, ReplicatedStorage, StrategyConfig,
};
