//! High-level object client
//!
//! Composes the data pipeline with the metadata store: every operation
//! is keyed by an object key, with the chunk list and version links
//! kept in metadata.
//!
//! Concurrent operations on the same object key are not serialized by
//! this client; the metadata store is assumed to give last-writer-wins
//! per key and callers needing exclusion must provide it externally.
//! Partial failures do not roll back shard writes that already
//! happened.

use crate::config::Config;
use bytes::Bytes;
use shardstor_cluster::ShardCluster;
use shardstor_core::{ProcessingChain, Result, StorError};
use shardstor_metastor::{Linker, Metadata, MetadataStore};
use shardstor_pipeline::{CheckStatus, Pipeline};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument, warn};

/// shardstor client
pub struct Client {
    pipeline: Pipeline,
    metastor: Arc<dyn MetadataStore>,
    linker: Linker,
}

impl Client {
    /// Build a client from configuration against a shard cluster and a
    /// metadata store.
    pub fn new(
        config: &Config,
        cluster: Arc<dyn ShardCluster>,
        metastor: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        config.validate()?;
        let key = config.encryption_key()?;
        let chain = ProcessingChain::new(config.compression, key.as_ref())?;
        let storage = config.strategy.build(cluster)?;
        let pipeline = Pipeline::new(chain, storage, config.block_size, config.job_count)?;
        Ok(Self {
            pipeline,
            metastor: metastor.clone(),
            linker: Linker::new(metastor),
        })
    }

    /// Store `value` under `key` and persist its metadata.
    pub async fn write(&self, key: &[u8], value: &[u8]) -> Result<Metadata> {
        self.write_with_meta(key, value, None, None, None).await
    }

    /// Store a stream under `key` and persist its metadata.
    pub async fn write_stream<R>(&self, key: &[u8], reader: R) -> Result<Metadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.write_with_meta(key, reader, None, None, None).await
    }

    /// Store a stream under `key`, linking the new version behind
    /// `previous_key` when one is given.
    ///
    /// `previous_meta` saves a metadata-store round trip when the
    /// caller already holds the previous version's record;
    /// `previous_key` must still be set alongside it. `initial_meta`
    /// lets the caller keep a custom creation epoch across rewrites.
    #[instrument(skip_all, fields(key = %hex::encode(key)))]
    pub async fn write_with_meta<R>(
        &self,
        key: &[u8],
        reader: R,
        previous_key: Option<&[u8]>,
        previous_meta: Option<Metadata>,
        initial_meta: Option<Metadata>,
    ) -> Result<Metadata>
    where
        R: AsyncRead + Unpin + Send,
    {
        let chunks = self.pipeline.write(reader).await?;

        let mut metadata =
            initial_meta.unwrap_or_else(|| Metadata::new(Bytes::copy_from_slice(key)));
        metadata.set_chunks(chunks);

        match previous_key {
            None => self.linker.link(&mut metadata, None).await?,
            Some(previous_key) => {
                let mut previous = match previous_meta {
                    Some(previous) => previous,
                    None => self.metastor.get(previous_key).await?,
                };
                self.linker.link(&mut metadata, Some(&mut previous)).await?;
            }
        }

        debug!(size = metadata.size, chunks = metadata.chunks.len(), "object written");
        Ok(metadata)
    }

    /// Read the object stored under `key`.
    pub async fn read(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut value = Vec::new();
        self.read_stream(key, &mut value).await?;
        Ok(value)
    }

    /// Read the object stored under `key` into `writer`.
    #[instrument(skip_all, fields(key = %hex::encode(key)))]
    pub async fn read_stream<W>(&self, key: &[u8], writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let metadata = self.metastor.get(key).await?;
        self.read_with_meta(&metadata, writer).await
    }

    /// Read the object described by already-fetched metadata.
    pub async fn read_with_meta<W>(&self, metadata: &Metadata, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.pipeline.read(&metadata.chunks, writer).await
    }

    /// Delete the object stored under `key`: its shard objects first,
    /// then its metadata. Deleting an unknown key is not an error.
    #[instrument(skip_all, fields(key = %hex::encode(key)))]
    pub async fn delete(&self, key: &[u8]) -> Result<()> {
        let metadata = match self.metastor.get(key).await {
            Ok(metadata) => metadata,
            Err(StorError::MetadataNotFound { .. }) => return Ok(()),
            Err(err) => return Err(err),
        };
        self.delete_with_meta(&metadata).await
    }

    /// Delete the object described by already-fetched metadata.
    pub async fn delete_with_meta(&self, metadata: &Metadata) -> Result<()> {
        self.pipeline.delete(&metadata.chunks).await?;
        self.metastor.delete(&metadata.key).await
    }

    /// Report the health of the object stored under `key`; fast mode
    /// verifies shard object existence only.
    #[instrument(skip_all, fields(key = %hex::encode(key), fast))]
    pub async fn check(&self, key: &[u8], fast: bool) -> Result<CheckStatus> {
        let metadata = self.metastor.get(key).await?;
        self.pipeline.check(&metadata.chunks, fast).await
    }

    /// Restore full redundancy for the object stored under `key`,
    /// persisting the refreshed chunk list.
    ///
    /// Fails with `RepairNotSupported` when the configured strategy has
    /// no redundancy to repair from, and `InsufficientShards` when too
    /// few pieces survive.
    #[instrument(skip_all, fields(key = %hex::encode(key)))]
    pub async fn repair(&self, key: &[u8]) -> Result<Metadata> {
        let mut metadata = self.metastor.get(key).await?;
        let chunks = self.pipeline.repair(&metadata.chunks).await.map_err(|err| {
            warn!(error = %err, "repair failed");
            err
        })?;

        // The repair wrote shard objects, so the write epoch moves.
        metadata.set_chunks(chunks);
        self.metastor.set(metadata.clone()).await?;
        Ok(metadata)
    }
}
