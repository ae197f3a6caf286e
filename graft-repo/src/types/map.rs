use std::collections::BTreeMap;

use async_stream::try_stream;
use futures_core::Stream;
use graft_common::{Bytes, Digest};
use graft_prolly_tree::entry::{map_entry, map_key, map_value};
use graft_prolly_tree::{
    AdvancedNodeBuilder, ChunkCacher, Chunker, DuallyDiffKeyIterator, IntersectKeyIterator,
    NodeBuilder, NodeCursor, OrderedKey, Position, Segment, SeqNode,
};
use graft_storage::{ChunkLoader, ChunkStore, ChunkType, ChunkWriter};

use crate::RepositoryError;

/// Upsert `key`/`value` in the map rooted at `root`, through the given
/// loader/writer (usually a transaction cacher). Returns the new root.
pub(crate) async fn map_set<Cache>(
    cache: &Cache,
    root: Digest,
    key: &[u8],
    value: &[u8],
) -> Result<Digest, RepositoryError>
where
    Cache: ChunkLoader + ChunkWriter,
{
    let ordered = OrderedKey::by_value(key);
    let cursor = NodeCursor::seek_key(&root, &ordered, cache).await?;
    let replaces = cursor
        .entry()
        .map(|entry| map_key(entry) == key)
        .unwrap_or(false);
    let mut builder = NodeBuilder::from_root(root, Position::Key(ordered), cache, cache, Chunker::Map);
    builder.splice_elements(
        u64::from(replaces),
        vec![Segment::from_frames([map_entry(key, value)])],
    );
    Ok(builder.commit().await?)
}

/// Remove `key` from the map rooted at `root`. Returns the new root, or
/// [`RepositoryError::MapKeyNotExists`] when the key is absent.
pub(crate) async fn map_del<Cache>(
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
        .map(|entry| map_key(entry) == key)
        .unwrap_or(false);
    if !exists {
        return Err(RepositoryError::MapKeyNotExists);
    }
    let mut builder = NodeBuilder::from_root(root, Position::Key(ordered), cache, cache, Chunker::Map);
    builder.splice_elements(1, Vec::new());
    Ok(builder.commit().await?)
}

/// A key/value map ordered by key, stored as a prolly tree of
/// length-prefixed entries.
pub struct UMap<Store: ChunkStore + Clone> {
    root: Digest,
    size: u64,
    store: Store,
}

impl<Store: ChunkStore + Clone> UMap<Store> {
    /// Build a fresh map holding `pairs` (sorted and deduplicated, last
    /// write per key winning) and return its data root.
    pub async fn create<Key, Val>(
        store: &Store,
        pairs: impl IntoIterator<Item = (Key, Val)>,
    ) -> Result<Digest, RepositoryError>
    where
        Key: Into<Bytes>,
        Val: Into<Bytes>,
    {
        let sorted: BTreeMap<Bytes, Bytes> = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        let frames = sorted
            .iter()
            .map(|(key, value)| map_entry(key, value));
        Ok(AdvancedNodeBuilder::fresh(store, store)
            .insert(0, vec![Segment::from_frames(frames)])
            .commit(Chunker::Map)
            .await?)
    }

    /// Load a map view over the tree rooted at `root`.
    pub async fn load(root: Digest, store: Store) -> Result<Self, RepositoryError> {
        let chunk = store
            .get(&root)
            .await?
            .ok_or(RepositoryError::ChunkNotExists)?;
        if !matches!(chunk.ctype(), ChunkType::Map | ChunkType::Meta) {
            return Err(RepositoryError::TypeMismatch);
        }
        let node = SeqNode::decode(chunk)?;
        Ok(UMap {
            root,
            size: node.num_elements(),
            store,
        })
    }

    /// The data root of this map.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// The number of entries held.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The value stored under `key`, or `None`.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Bytes>, RepositoryError> {
        let cursor =
            NodeCursor::seek_key(&self.root, &OrderedKey::by_value(key), &self.store).await?;
        Ok(cursor.entry().and_then(|entry| {
            (map_key(entry) == key).then(|| Bytes::copy_from_slice(map_value(entry)))
        }))
    }

    /// Set `key` to `value`, returning the data root of the edited map.
    pub async fn set(&self, key: &[u8], value: &[u8]) -> Result<Digest, RepositoryError> {
        let cacher = ChunkCacher::new(&self.store, &self.store);
        let root = map_set(&cacher, self.root, key, value).await?;
        cacher.dump_reachable(&root).await?;
        Ok(root)
    }

    /// Remove `key`, returning the data root of the edited map.
    pub async fn remove(&self, key: &[u8]) -> Result<Digest, RepositoryError> {
        let cacher = ChunkCacher::new(&self.store, &self.store);
        let root = map_del(&cacher, self.root, key).await?;
        cacher.dump_reachable(&root).await?;
        Ok(root)
    }

    /// Stream the entries in ascending key order.
    pub fn stream(&self) -> impl Stream<Item = Result<(Bytes, Bytes), RepositoryError>> + '_ {
        try_stream! {
            let mut cursor = NodeCursor::seek_index(&self.root, 0, &self.store).await?;
            loop {
                let pair = cursor.entry().map(|entry| {
                    (
                        Bytes::copy_from_slice(map_key(entry)),
                        Bytes::copy_from_slice(map_value(entry)),
                    )
                });
                match pair {
                    Some(pair) => {
                        yield pair;
                        cursor.advance().await?;
                    }
                    None => break,
                }
            }
        }
    }

    /// Collect every entry, in ascending key order.
    pub async fn scan(&self) -> Result<Vec<(Bytes, Bytes)>, RepositoryError> {
        let mut cursor = NodeCursor::seek_index(&self.root, 0, &self.store).await?;
        let mut out = Vec::new();
        loop {
            let pair = cursor.entry().map(|entry| {
                (
                    Bytes::copy_from_slice(map_key(entry)),
                    Bytes::copy_from_slice(map_value(entry)),
                )
            });
            match pair {
                Some(pair) => {
                    out.push(pair);
                    cursor.advance().await?;
                }
                None => break,
            }
        }
        Ok(out)
    }

    /// A key-ordered difference iterator between this map and `other`.
    pub async fn diff<'a>(
        &'a self,
        other: &UMap<Store>,
    ) -> Result<DuallyDiffKeyIterator<'a, Store>, RepositoryError> {
        Ok(DuallyDiffKeyIterator::new(self.root, other.root, &self.store).await?)
    }

    /// An iterator over keys present in both maps with equal values.
    pub async fn intersect<'a>(
        &'a self,
        other: &UMap<Store>,
    ) -> Result<IntersectKeyIterator<'a, Store>, RepositoryError> {
        Ok(IntersectKeyIterator::new(self.root, other.root, &self.store).await?)
    }
}
