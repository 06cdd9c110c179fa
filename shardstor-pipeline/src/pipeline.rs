//! Data pipeline
//!
//! Splits a byte stream into fixed-size blocks, drives each block
//! through the processing chain and the configured storage strategy in
//! parallel, and collects the resulting chunk descriptors in block
//! order. Reads reverse the flow, writing recovered blocks to the sink
//! strictly in chunk order.

use crate::storage::{CheckStatus, ChunkStorage};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use shardstor_core::{Checksum, ProcessingChain, Result, StorError};
use shardstor_metastor::Chunk;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, instrument};

/// Job count used when available parallelism cannot be determined
const FALLBACK_JOB_COUNT: usize = 4;

/// Parallel block pipeline over one storage strategy
pub struct Pipeline {
    chain: Arc<ProcessingChain>,
    storage: Arc<dyn ChunkStorage>,
    block_size: usize,
    job_count: usize,
}

impl Pipeline {
    /// Create a pipeline.
    ///
    /// `job_count` bounds the number of blocks processed concurrently;
    /// zero selects a default derived from available parallelism.
    pub fn new(
        chain: ProcessingChain,
        storage: Arc<dyn ChunkStorage>,
        block_size: usize,
        job_count: usize,
    ) -> Result<Self> {
        if block_size == 0 {
            return Err(StorError::Configuration(
                "block_size must be at least 1 byte".to_string(),
            ));
        }
        let job_count = if job_count == 0 {
            default_job_count()
        } else {
            job_count
        };
        Ok(Self {
            chain: Arc::new(chain),
            storage,
            block_size,
            job_count,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn job_count(&self) -> usize {
        self.job_count
    }

    /// Store a byte stream, returning one chunk per block in block
    /// order.
    ///
    /// The first failing block aborts the call; blocks already written
    /// to shards are not rolled back.
    #[instrument(skip_all)]
    pub async fn write<R>(&self, reader: R) -> Result<Vec<Chunk>>
    where
        R: AsyncRead + Unpin + Send,
    {
        let block_size = self.block_size;
        let blocks = stream::unfold(Some(reader), move |state| async move {
            let mut reader = state?;
            let mut block = vec![0u8; block_size];
            let mut filled = 0;
            while filled < block_size {
                match reader.read(&mut block[filled..]).await {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(err) => return Some((Err(StorError::Io(err)), None)),
                }
            }
            if filled == 0 {
                return None;
            }
            block.truncate(filled);
            Some((Ok(block), Some(reader)))
        });

        let chain = self.chain.clone();
        let storage = self.storage.clone();
        blocks
            .enumerate()
            .map(move |(index, block)| {
                let chain = chain.clone();
                let storage = storage.clone();
                async move {
                    let block = block?;
                    tokio::spawn(store_block(chain, storage, index, block))
                        .await
                        .map_err(|err| {
                            StorError::Internal(format!("block {index} job failed: {err}"))
                        })?
                }
            })
            // `buffered` keeps completion in submission order, so the
            // chunk list comes out in block order.
            .buffered(self.job_count)
            .try_collect()
            .await
    }

    /// Recover the stream described by `chunks` into `writer`.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn read<W>(&self, chunks: &[Chunk], writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut blocks = stream::iter(chunks.to_vec())
            .map(|chunk| {
                let chain = self.chain.clone();
                let storage = self.storage.clone();
                async move {
                    let payload = storage.read(&chunk).await?;
                    let block = chain.reverse(&payload)?;
                    if block.len() as u64 != chunk.size {
                        return Err(StorError::CorruptPayload(format!(
                            "recovered block is {} bytes, chunk records {}",
                            block.len(),
                            chunk.size
                        )));
                    }
                    Ok::<_, StorError>(block)
                }
            })
            .buffered(self.job_count);

        // The sink is the only serialization point.
        while let Some(block) = blocks.try_next().await? {
            writer.write_all(&block).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Delete every chunk's pieces; absent pieces are not an error.
    pub async fn delete(&self, chunks: &[Chunk]) -> Result<()> {
        stream::iter(chunks.to_vec())
            .map(|chunk| {
                let storage = self.storage.clone();
                async move { storage.delete(&chunk).await }
            })
            .buffer_unordered(self.job_count)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    /// Worst health status over all chunks; an empty list is Optimal.
    pub async fn check(&self, chunks: &[Chunk], fast: bool) -> Result<CheckStatus> {
        let mut worst = CheckStatus::Optimal;
        let mut statuses = stream::iter(chunks.to_vec())
            .map(|chunk| {
                let storage = self.storage.clone();
                async move { storage.check(&chunk, fast).await }
            })
            .buffer_unordered(self.job_count);
        while let Some(status) = statuses.try_next().await? {
            worst = worst.min(status);
        }
        Ok(worst)
    }

    /// Repair every chunk, returning the updated chunk list in order.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn repair(&self, chunks: &[Chunk]) -> Result<Vec<Chunk>> {
        stream::iter(chunks.to_vec())
            .map(|chunk| {
                let storage = self.storage.clone();
                async move {
                    let shards = storage.repair(&chunk).await?;
                    Ok::<_, StorError>(Chunk {
                        key: chunk.key.clone(),
                        size: chunk.size,
                        shards,
                    })
                }
            })
            .buffered(self.job_count)
            .try_collect()
            .await
    }
}

/// Library default worker pool size.
pub fn default_job_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(FALLBACK_JOB_COUNT)
}

async fn store_block(
    chain: Arc<ProcessingChain>,
    storage: Arc<dyn ChunkStorage>,
    index: usize,
    block: Vec<u8>,
) -> Result<Chunk> {
    let key = Bytes::copy_from_slice(Checksum::compute(&block).as_bytes());
    let size = block.len() as u64;
    let payload = chain.apply(&block)?;
    let shards = storage.write(&key, Bytes::from(payload)).await.map_err(|err| {
        error!(block = index, error = %err, "block write failed");
        err
    })?;
    Ok(Chunk { key, size, shards })
}
