use async_trait::async_trait;
use graft_common::{ConditionalSync, Digest};

use crate::{Chunk, GraftStorageError};

/// Aggregate counters reported by [`ChunkStore::info`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreInfo {
    /// The number of chunks held.
    pub chunk_count: u64,
    /// The total number of stored bytes across all chunks.
    pub total_bytes: u64,
}

/// A store of immutable [`Chunk`]s addressed by [`Digest`].
///
/// `put` is idempotent on an equal digest: storing the same chunk twice is a
/// no-op, and concurrent stores of the same `(digest, bytes)` pair must both
/// succeed. `get` returns exactly the bytes previously put, or absence.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ChunkStore: ConditionalSync + 'static {
    /// Store `chunk` under `digest`. Returns `true` if the chunk was newly
    /// stored, `false` if an equal chunk was already present.
    async fn put(&self, digest: &Digest, chunk: &Chunk) -> Result<bool, GraftStorageError>;

    /// Retrieve the chunk stored under `digest`, if any.
    async fn get(&self, digest: &Digest) -> Result<Option<Chunk>, GraftStorageError>;

    /// Whether a chunk is stored under `digest`.
    async fn exists(&self, digest: &Digest) -> Result<bool, GraftStorageError>;

    /// Aggregate counters describing the store contents.
    async fn info(&self) -> Result<StoreInfo, GraftStorageError>;
}

/// The read facet of chunk storage that tree traversal borrows.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ChunkLoader: ConditionalSync {
    /// Load the chunk addressed by `digest`, or report absence.
    async fn load(&self, digest: &Digest) -> Result<Option<Chunk>, GraftStorageError>;
}

/// The write facet of chunk storage that tree edits borrow.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ChunkWriter: ConditionalSync {
    /// Write `chunk` under `digest`. Returns `true` unless the write was
    /// rejected by the backend.
    async fn write(&self, digest: &Digest, chunk: &Chunk) -> Result<bool, GraftStorageError>;
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<S> ChunkLoader for S
where
    S: ChunkStore,
{
    async fn load(&self, digest: &Digest) -> Result<Option<Chunk>, GraftStorageError> {
        self.get(digest).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<S> ChunkWriter for S
where
    S: ChunkStore,
{
    async fn write(&self, digest: &Digest, chunk: &Chunk) -> Result<bool, GraftStorageError> {
        self.put(digest, chunk).await?;
        Ok(true)
    }
}
