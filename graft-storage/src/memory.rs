use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use graft_common::{Bytes, Digest};
use tokio::sync::RwLock;

use crate::{Chunk, ChunkStore, GraftStorageError, StoreInfo};

/// A trivial [`ChunkStore`] backed by a [`HashMap`] where all chunks are kept
/// in memory and never persisted.
///
/// Cloning yields another handle onto the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryChunkStore {
    entries: Arc<RwLock<HashMap<Digest, Bytes>>>,
}

impl MemoryChunkStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ChunkStore for MemoryChunkStore {
    async fn put(&self, digest: &Digest, chunk: &Chunk) -> Result<bool, GraftStorageError> {
        if chunk.digest() != *digest {
            return Err(GraftStorageError::Verification(format!(
                "Chunk does not hash to {digest}"
            )));
        }
        let mut entries = self.entries.write().await;
        if entries.contains_key(digest) {
            return Ok(false);
        }
        entries.insert(*digest, chunk.encode());
        Ok(true)
    }

    async fn get(&self, digest: &Digest) -> Result<Option<Chunk>, GraftStorageError> {
        let entries = self.entries.read().await;
        match entries.get(digest) {
            Some(encoded) => Ok(Some(Chunk::decode(encoded)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, digest: &Digest) -> Result<bool, GraftStorageError> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(digest))
    }

    async fn info(&self) -> Result<StoreInfo, GraftStorageError> {
        let entries = self.entries.read().await;
        Ok(StoreInfo {
            chunk_count: entries.len() as u64,
            total_bytes: entries.values().map(|encoded| encoded.len() as u64).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkType;
    use anyhow::Result;

    fn chunk(body: &[u8]) -> Chunk {
        Chunk::new(ChunkType::Blob, Bytes::copy_from_slice(body))
    }

    #[tokio::test]
    async fn it_stores_and_retrieves_chunks() -> Result<()> {
        let store = MemoryChunkStore::new();
        let chunk = chunk(b"payload");
        let digest = chunk.digest();

        assert!(store.put(&digest, &chunk).await?);
        assert_eq!(store.get(&digest).await?, Some(chunk));
        assert!(store.exists(&digest).await?);
        Ok(())
    }

    #[tokio::test]
    async fn it_is_idempotent_on_equal_digests() -> Result<()> {
        let store = MemoryChunkStore::new();
        let chunk = chunk(b"payload");
        let digest = chunk.digest();

        assert!(store.put(&digest, &chunk).await?);
        assert!(!store.put(&digest, &chunk).await?);
        assert_eq!(store.info().await?.chunk_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_mismatched_digests() -> Result<()> {
        let store = MemoryChunkStore::new();
        let chunk = chunk(b"payload");
        let wrong = Digest::compute(b"something else");

        assert!(store.put(&wrong, &chunk).await.is_err());
        assert!(!store.exists(&wrong).await?);
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_absence() -> Result<()> {
        let store = MemoryChunkStore::new();
        let digest = Digest::compute(b"missing");
        assert_eq!(store.get(&digest).await?, None);
        assert!(!store.exists(&digest).await?);
        Ok(())
    }
}
