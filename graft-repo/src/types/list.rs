use async_stream::try_stream;
use futures_core::Stream;
use graft_common::{Bytes, Digest};
use graft_prolly_tree::entry::{list_element, list_entry};
use graft_prolly_tree::{
    AdvancedNodeBuilder, Chunker, DuallyDiffIndexIterator, NodeCursor, Segment, SeqNode,
};
use graft_storage::{ChunkStore, ChunkType};

use crate::RepositoryError;

/// A list of byte elements stored as a prolly tree of length-prefixed
/// entries.
pub struct UList<Store: ChunkStore + Clone> {
    root: Digest,
    len: u64,
    store: Store,
}

impl<Store: ChunkStore + Clone> UList<Store> {
    /// Build a fresh list holding `elements` and return its data root.
    pub async fn create(store: &Store, elements: &[Bytes]) -> Result<Digest, RepositoryError> {
        let frames = elements.iter().map(|element| list_entry(element));
        Ok(AdvancedNodeBuilder::fresh(store, store)
            .insert(0, vec![Segment::from_frames(frames)])
            .commit(Chunker::List)
            .await?)
    }

    /// Load a list view over the tree rooted at `root`.
    pub async fn load(root: Digest, store: Store) -> Result<Self, RepositoryError> {
        let chunk = store
            .get(&root)
            .await?
            .ok_or(RepositoryError::ChunkNotExists)?;
        if !matches!(chunk.ctype(), ChunkType::List | ChunkType::Meta) {
            return Err(RepositoryError::TypeMismatch);
        }
        let node = SeqNode::decode(chunk)?;
        Ok(UList {
            root,
            len: node.num_elements(),
            store,
        })
    }

    /// The data root of this list.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// The number of elements held.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether no elements are held.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The element at `index`, or `None` past the end.
    pub async fn get(&self, index: u64) -> Result<Option<Bytes>, RepositoryError> {
        if index >= self.len {
            return Ok(None);
        }
        let cursor = NodeCursor::seek_index(&self.root, index, &self.store).await?;
        Ok(cursor
            .entry()
            .map(|entry| Bytes::copy_from_slice(list_element(entry))))
    }

    /// Delete `num_delete` elements at `start` and insert `elements` in
    /// their place, returning the data root of the edited list.
    pub async fn splice(
        &self,
        start: u64,
        num_delete: u64,
        elements: &[Bytes],
    ) -> Result<Digest, RepositoryError> {
        if start > self.len {
            return Err(RepositoryError::IndexOutOfRange);
        }
        let frames = elements.iter().map(|element| list_entry(element));
        Ok(
            AdvancedNodeBuilder::from_root(self.root, &self.store, &self.store)
                .splice(start, num_delete, vec![Segment::from_frames(frames)])
                .commit(Chunker::List)
                .await?,
        )
    }

    /// Stream the elements in order.
    pub fn stream(&self) -> impl Stream<Item = Result<Bytes, RepositoryError>> + '_ {
        try_stream! {
            let mut cursor = NodeCursor::seek_index(&self.root, 0, &self.store).await?;
            loop {
                let element = cursor
                    .entry()
                    .map(|entry| Bytes::copy_from_slice(list_element(entry)));
                match element {
                    Some(element) => {
                        yield element;
                        cursor.advance().await?;
                    }
                    None => break,
                }
            }
        }
    }

    /// Collect every element into a vector.
    pub async fn elements(&self) -> Result<Vec<Bytes>, RepositoryError> {
        let mut cursor = NodeCursor::seek_index(&self.root, 0, &self.store).await?;
        let mut out = Vec::new();
        loop {
            let element = cursor
                .entry()
                .map(|entry| Bytes::copy_from_slice(list_element(entry)));
            match element {
                Some(element) => {
                    out.push(element);
                    cursor.advance().await?;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// An index-keyed difference iterator between this list and `other`.
    pub async fn diff<'a>(
        &'a self,
        other: &UList<Store>,
    ) -> Result<DuallyDiffIndexIterator<'a, Store>, RepositoryError> {
        Ok(DuallyDiffIndexIterator::new(self.root, other.root, &self.store).await?)
    }
}
