//! Version chain linker
//!
//! Object versions form a doubly linked list through the
//! `previous_key`/`next_key` fields of their metadata. The linker
//! maintains that list across two store writes, best-effort: the
//! previous version is persisted first so a partial failure leaves a
//! dangling forward pointer rather than a lost current record, and that
//! window is surfaced distinctly as `DanglingLink`.

use crate::models::Metadata;
use crate::store::MetadataStore;
use shardstor_core::{Result, StorError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maintains the version chain for object metadata
#[derive(Clone)]
pub struct Linker {
    store: Arc<dyn MetadataStore>,
}

impl Linker {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Persist `current`, linking it behind `previous` when one is
    /// given.
    ///
    /// With a previous version, `previous.next_key` is pointed at the
    /// current key and `current.previous_key` at the previous key, then
    /// both are persisted, previous first. If persisting `current`
    /// fails after `previous` succeeded, the already-written previous
    /// record is not rolled back; the caller must retry or clean up.
    pub async fn link(&self, current: &mut Metadata, previous: Option<&mut Metadata>) -> Result<()> {
        let Some(previous) = previous else {
            return self.store.set(current.clone()).await;
        };

        previous.next_key = Some(current.key.clone());
        current.previous_key = Some(previous.key.clone());

        self.store.set(previous.clone()).await?;

        if let Err(err) = self.store.set(current.clone()).await {
            warn!(
                key = %hex_key(&current.key),
                previous = %hex_key(&previous.key),
                error = %err,
                "version chain left dangling, previous persisted but current failed"
            );
            return Err(StorError::DanglingLink(err.to_string()));
        }

        debug!(
            key = %hex_key(&current.key),
            previous = %hex_key(&previous.key),
            "linked metadata version"
        );
        Ok(())
    }
}

fn hex_key(key: &[u8]) -> String {
    hex::encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMetaStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_link_without_previous() {
        let store = Arc::new(MemoryMetaStore::new());
        let linker = Linker::new(store.clone());

        let mut current = Metadata::new(&b"v1"[..]);
        linker.link(&mut current, None).await.unwrap();

        let stored = store.get(b"v1").await.unwrap();
        assert!(stored.previous_key.is_none());
        assert!(stored.next_key.is_none());
    }

    #[tokio::test]
    async fn test_link_chains_versions() {
        let store = Arc::new(MemoryMetaStore::new());
        let linker = Linker::new(store.clone());

        let mut v1 = Metadata::new(&b"v1"[..]);
        linker.link(&mut v1, None).await.unwrap();

        let mut v2 = Metadata::new(&b"v2"[..]);
        linker.link(&mut v2, Some(&mut v1)).await.unwrap();

        let stored_v1 = store.get(b"v1").await.unwrap();
        let stored_v2 = store.get(b"v2").await.unwrap();
        assert_eq!(stored_v1.next_key, Some(Bytes::from_static(b"v2")));
        assert_eq!(stored_v2.previous_key, Some(Bytes::from_static(b"v1")));
    }

    /// Store that fails every write after the first.
    struct FailingStore {
        inner: MemoryMetaStore,
        failed: AtomicBool,
    }

    #[async_trait]
    impl MetadataStore for FailingStore {
        async fn get(&self, key: &[u8]) -> Result<Metadata> {
            self.inner.get(key).await
        }

        async fn set(&self, metadata: Metadata) -> Result<()> {
            if self.failed.swap(true, Ordering::SeqCst) {
                return Err(StorError::MetadataStore("store went away".to_string()));
            }
            self.inner.set(metadata).await
        }

        async fn delete(&self, key: &[u8]) -> Result<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_partial_failure_surfaces_dangling_link() {
        let store = Arc::new(FailingStore {
            inner: MemoryMetaStore::new(),
            failed: AtomicBool::new(false),
        });
        let linker = Linker::new(store.clone());

        let mut previous = Metadata::new(&b"v1"[..]);
        let mut current = Metadata::new(&b"v2"[..]);

        let err = linker
            .link(&mut current, Some(&mut previous))
            .await
            .unwrap_err();
        assert!(matches!(err, StorError::DanglingLink(_)));

        // The previous record was persisted with its forward pointer,
        // pointing at a key that now has no metadata.
        let stored = store.get(b"v1").await.unwrap();
        assert_eq!(stored.next_key, Some(Bytes::from_static(b"v2")));
        assert!(store.get(b"v2").await.is_err());
    }
}
