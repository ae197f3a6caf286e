use std::collections::BTreeSet;

use async_stream::try_stream;
use futures_core::Stream;
use graft_common::{Bytes, Digest};
use graft_prolly_tree::entry::{set_entry, set_key};
use graft_prolly_tree::{
    AdvancedNodeBuilder, ChunkCacher, Chunker, DuallyDiffKeyIterator, NodeBuilder, NodeCursor,
    OrderedKey, Position, Segment, SeqNode,
};
use graft_storage::{ChunkLoader, ChunkStore, ChunkType, ChunkWriter};

use crate::RepositoryError;

/// Insert `key` into the set rooted at `root`, through the given
/// loader/writer. A present key leaves the root unchanged.
pub(crate) async fn set_insert<Cache>(
    cache: &Cache,
    root: Digest,
    key: &[u8],
) -> Result<Digest, RepositoryError>
where
    Cache: ChunkLoader + ChunkWriter,
{
    let ordered = OrderedKey::by_value(key);
    let cursor = NodeCursor::seek_key(&root, &ordered, cache).await?;
    let exists = cursor
        .entry()
        .map(|entry| set_key(entry) == key)
        .unwrap_or(false);
    if exists {
        return Ok(root);
    }
    let mut builder = NodeBuilder::from_root(root, Position::Key(ordered), cache, cache, Chunker::Set);
    builder.splice_elements(0, vec![Segment::from_frames([set_entry(key)])]);
    Ok(builder.commit().await?)
}

/// Remove `key` from the set rooted at `root`. Returns the new root, or
/// [`RepositoryError::KeyNotExists`] when the key is absent.
pub(crate) async fn set_remove<Cache>(
    cache: &Cache,
    root: Digest,
    key: &[u8],
) -> Result<Digest, RepositoryError>
where
    Cache: ChunkLoader + ChunkWriter,
{
    let ordered = OrderedKey::by_value(key);
    let cursor = NodeCursor::seek_key(&root, &ordered, cache).await?;
    let exists = cursor
        .entry()
        .map(|entry| set_key(entry) == key)
        .unwrap_or(false);
    if !exists {
        return Err(RepositoryError::KeyNotExists);
    }
    let mut builder = NodeBuilder::from_root(root, Position::Key(ordered), cache, cache, Chunker::Set);
    builder.splice_elements(1, Vec::new());
    Ok(builder.commit().await?)
}

/// A set of keys ordered lexicographically, stored as a prolly tree of
/// length-prefixed entries without values.
pub struct USet<Store: ChunkStore + Clone> {
    root: Digest,
    size: u64,
    store: Store,
}

impl<Store: ChunkStore + Clone> USet<Store> {
    /// Build a fresh set holding `keys` (sorted and deduplicated) and
    /// return its data root.
    pub async fn create<Key>(
        store: &Store,
        keys: impl IntoIterator<Item = Key>,
    ) -> Result<Digest, RepositoryError>
    where
        Key: Into<Bytes>,
    {
        let sorted: BTreeSet<Bytes> = keys.into_iter().map(Into::into).collect();
        let frames = sorted.iter().map(|key| set_entry(key));
        Ok(AdvancedNodeBuilder::fresh(store, store)
            .insert(0, vec![Segment::from_frames(frames)])
            .commit(Chunker::Set)
            .await?)
    }

    /// Load a set view over the tree rooted at `root`.
    pub async fn load(root: Digest, store: Store) -> Result<Self, RepositoryError> {
        let chunk = store
            .get(&root)
            .await?
            .ok_or(RepositoryError::ChunkNotExists)?;
        if !matches!(chunk.ctype(), ChunkType::Set | ChunkType::Meta) {
            return Err(RepositoryError::TypeMismatch);
        }
        let node = SeqNode::decode(chunk)?;
        Ok(USet {
            root,
            size: node.num_elements(),
            store,
        })
    }

    /// The data root of this set.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// The number of keys held.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether `key` is present.
    pub async fn exists(&self, key: &[u8]) -> Result<bool, RepositoryError> {
        let cursor =
            NodeCursor::seek_key(&self.root, &OrderedKey::by_value(key), &self.store).await?;
        Ok(cursor
            .entry()
            .map(|entry| set_key(entry) == key)
            .unwrap_or(false))
    }

    /// Insert `key`, returning the data root of the edited set.
    pub async fn insert(&self, key: &[u8]) -> Result<Digest, RepositoryError> {
        let cacher = ChunkCacher::new(&self.store, &self.store);
        let root = set_insert(&cacher, self.root, key).await?;
        cacher.dump_reachable(&root).await?;
        Ok(root)
    }

    /// Remove `key`, returning the data root of the edited set.
    pub async fn remove(&self, key: &[u8]) -> Result<Digest, RepositoryError> {
        let cacher = ChunkCacher::new(&self.store, &self.store);
        let root = set_remove(&cacher, self.root, key).await?;
        cacher.dump_reachable(&root).await?;
        Ok(root)
    }

    /// Stream the keys in ascending order.
    pub fn stream(&self) -> impl Stream<Item = Result<Bytes, RepositoryError>> + '_ {
        try_stream! {
            let mut cursor = NodeCursor::seek_index(&self.root, 0, &self.store).await?;
            loop {
                let key = cursor
                    .entry()
                    .map(|entry| Bytes::copy_from_slice(set_key(entry)));
                match key {
                    Some(key) => {
                        yield key;
                        cursor.advance().await?;
                    }
                    None => break,
                }
            }
        }
    }

    /// Collect every key, in ascending order.
    pub async fn scan(&self) -> Result<Vec<Bytes>, RepositoryError> {
        let mut cursor = NodeCursor::seek_index(&self.root, 0, &self.store).await?;
        let mut out = Vec::new();
        loop {
            let key = cursor
                .entry()
                .map(|entry| Bytes::copy_from_slice(set_key(entry)));
            match key {
                Some(key) => {
                    out.push(key);
                    cursor.advance().await?;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// A key-ordered difference iterator between this set and `other`.
    pub async fn diff<'a>(
        &'a self,
        other: &USet<Store>,
    ) -> Result<DuallyDiffKeyIterator<'a, Store>, RepositoryError> {
        Ok(DuallyDiffKeyIterator::new(self.root, other.root, &self.store).await?)
    }
}
