use graft_common::{Bytes, Digest};
use graft_prolly_tree::StringNode;
use graft_storage::ChunkStore;

use crate::RepositoryError;

/// A string value: a single chunk, never tree-chunked, which caps a string
/// at one chunk's worth of bytes.
pub struct UString<Store: ChunkStore + Clone> {
    digest: Digest,
    bytes: Bytes,
    store: Store,
}

impl<Store: ChunkStore + Clone> UString<Store> {
    /// Write a fresh string chunk holding `text` and return its digest.
    pub async fn create(store: &Store, text: &[u8]) -> Result<Digest, RepositoryError> {
        let chunk = StringNode::new_chunk(text);
        let digest = chunk.digest();
        store.put(&digest, &chunk).await?;
        Ok(digest)
    }

    /// Load the string chunk addressed by `digest`.
    pub async fn load(digest: Digest, store: Store) -> Result<Self, RepositoryError> {
        let chunk = store
            .get(&digest)
            .await?
            .ok_or(RepositoryError::ChunkNotExists)?;
        let node = StringNode::decode(chunk)?;
        Ok(UString {
            digest,
            bytes: Bytes::copy_from_slice(node.bytes()),
            store,
        })
    }

    /// The digest addressing this string's chunk.
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// The payload bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The payload length in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Replace the payload wholesale, returning the digest of the new
    /// string chunk.
    pub async fn replace(&self, text: &[u8]) -> Result<Digest, RepositoryError> {
        Self::create(&self.store, text).await
    }
}
