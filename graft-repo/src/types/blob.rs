use graft_common::Digest;
use graft_prolly_tree::{AdvancedNodeBuilder, Chunker, NodeCursor, Segment, SeqNode};
use graft_storage::{ChunkStore, ChunkType};

use crate::RepositoryError;

/// A byte blob stored as a prolly tree with one byte per leaf entry.
pub struct UBlob<Store: ChunkStore + Clone> {
    root: Digest,
    size: u64,
    store: Store,
}

impl<Store: ChunkStore + Clone> UBlob<Store> {
    /// Build a fresh blob holding `data` and return its data root.
    pub async fn create(store: &Store, data: &[u8]) -> Result<Digest, RepositoryError> {
        Ok(AdvancedNodeBuilder::fresh(store, store)
            .insert(0, vec![Segment::fixed(data)])
            .commit(Chunker::Blob)
            .await?)
    }

    /// Load a blob view over the tree rooted at `root`.
    pub async fn load(root: Digest, store: Store) -> Result<Self, RepositoryError> {
        let chunk = store
            .get(&root)
            .await?
            .ok_or(RepositoryError::ChunkNotExists)?;
        if !matches!(chunk.ctype(), ChunkType::Blob | ChunkType::Meta) {
            return Err(RepositoryError::TypeMismatch);
        }
        let node = SeqNode::decode(chunk)?;
        Ok(UBlob {
            root,
            size: node.num_elements(),
            store,
        })
    }

    /// The data root of this blob.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// The number of bytes held.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read up to `len` bytes starting at `pos`.
    pub async fn read(&self, pos: u64, len: u64) -> Result<Vec<u8>, RepositoryError> {
        if pos > self.size {
            return Err(RepositoryError::IndexOutOfRange);
        }
        let wanted = len.min(self.size - pos) as usize;
        let mut cursor = NodeCursor::seek_index(&self.root, pos, &self.store).await?;
        let mut out = Vec::with_capacity(wanted);
        while out.len() < wanted {
            let byte = cursor.entry().map(|entry| entry[0]);
            match byte {
                Some(byte) => {
                    out.push(byte);
                    cursor.advance().await?;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// Delete `num_delete` bytes at `pos` and insert `data` in their place,
    /// returning the data root of the edited blob.
    pub async fn splice(
        &self,
        pos: u64,
        num_delete: u64,
        data: &[u8],
    ) -> Result<Digest, RepositoryError> {
        if pos > self.size {
            return Err(RepositoryError::IndexOutOfRange);
        }
        Ok(
            AdvancedNodeBuilder::from_root(self.root, &self.store, &self.store)
                .splice(pos, num_delete, vec![Segment::fixed(data)])
                .commit(Chunker::Blob)
                .await?,
        )
    }
}
