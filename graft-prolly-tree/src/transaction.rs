use std::collections::HashMap;

use async_trait::async_trait;
use graft_common::Digest;
use graft_storage::{Chunk, ChunkLoader, ChunkWriter, GraftStorageError};
use tokio::sync::RwLock;

use crate::{Chunker, GraftProllyTreeError, NodeBuilder, Position, Segment, SeqNode};

/// Interposes on a loader/writer pair so that written chunks are cached
/// locally instead of persisted, and reads are served from that cache first.
///
/// Chunks written by one splice and consumed by a later one are
/// intermediates: they belong to no final tree and must never reach the
/// underlying writer. [`ChunkCacher::dump_reachable`] writes through exactly
/// the cached chunks the final root still references, discarding the rest.
pub struct ChunkCacher<'a, Loader: ChunkLoader, Writer: ChunkWriter> {
    loader: &'a Loader,
    writer: &'a Writer,
    cache: RwLock<HashMap<Digest, Chunk>>,
}

impl<'a, Loader: ChunkLoader, Writer: ChunkWriter> ChunkCacher<'a, Loader, Writer> {
    /// Wrap a loader/writer pair.
    pub fn new(loader: &'a Loader, writer: &'a Writer) -> Self {
        ChunkCacher {
            loader,
            writer,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Write through every cached chunk reachable from `root`. A referenced
    /// chunk absent from the cache was loaded from the underlying store in
    /// the first place, so its whole subtree is already persisted and the
    /// walk stops there.
    pub async fn dump_reachable(&self, root: &Digest) -> Result<(), GraftProllyTreeError> {
        let cache = self.cache.read().await;
        let mut stack = vec![*root];
        while let Some(digest) = stack.pop() {
            let Some(chunk) = cache.get(&digest) else {
                continue;
            };
            self.writer.write(&digest, chunk).await?;
            if let SeqNode::Meta(meta) = SeqNode::decode(chunk.clone())? {
                for entry in meta.entries() {
                    stack.push(entry.child);
                }
            }
        }
        Ok(())
    }

    /// The number of chunks currently cached.
    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<'a, Loader: ChunkLoader, Writer: ChunkWriter> ChunkLoader for ChunkCacher<'a, Loader, Writer> {
    async fn load(&self, digest: &Digest) -> Result<Option<Chunk>, GraftStorageError> {
        {
            let cache = self.cache.read().await;
            if let Some(chunk) = cache.get(digest) {
                return Ok(Some(chunk.clone()));
            }
        }
        self.loader.load(digest).await
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<'a, Loader: ChunkLoader, Writer: ChunkWriter> ChunkWriter for ChunkCacher<'a, Loader, Writer> {
    async fn write(&self, digest: &Digest, chunk: &Chunk) -> Result<bool, GraftStorageError> {
        let mut cache = self.cache.write().await;
        cache.insert(*digest, chunk.clone());
        Ok(true)
    }
}

/// One buffered splice of a transaction.
struct SpliceOperand {
    start_idx: u64,
    num_delete: u64,
    segments: Vec<Segment>,
}

/// A multi-splice tree transaction.
///
/// Operands are buffered and applied in insertion order at
/// [`AdvancedNodeBuilder::commit`]; each operand's offsets refer to the tree
/// as left by the operands before it. Intermediate chunks produced by one
/// splice and consumed by a later one are discarded, so only chunks
/// reachable from the final root reach the underlying writer.
///
/// ```rust
/// # async fn example() -> Result<(), graft_prolly_tree::GraftProllyTreeError> {
/// use graft_prolly_tree::{AdvancedNodeBuilder, Chunker, Segment};
/// use graft_storage::MemoryChunkStore;
///
/// let store = MemoryChunkStore::default();
/// let root = AdvancedNodeBuilder::fresh(&store, &store)
///     .insert(0, vec![Segment::fixed(&b"hello world"[..])])
///     .splice(5, 6, vec![Segment::fixed(&b", prolly trees"[..])])
///     .commit(Chunker::Blob)
///     .await?;
/// # let _ = root;
/// # Ok(())
/// # }
/// ```
pub struct AdvancedNodeBuilder<'a, Loader: ChunkLoader, Writer: ChunkWriter> {
    root: Option<Digest>,
    loader: &'a Loader,
    writer: &'a Writer,
    operands: Vec<SpliceOperand>,
}

impl<'a, Loader: ChunkLoader, Writer: ChunkWriter> AdvancedNodeBuilder<'a, Loader, Writer> {
    /// A transaction over the existing tree rooted at `root`.
    pub fn from_root(root: Digest, loader: &'a Loader, writer: &'a Writer) -> Self {
        AdvancedNodeBuilder {
            root: Some(root),
            loader,
            writer,
            operands: Vec::new(),
        }
    }

    /// A transaction constructing a tree from nothing.
    pub fn fresh(loader: &'a Loader, writer: &'a Writer) -> Self {
        AdvancedNodeBuilder {
            root: None,
            loader,
            writer,
            operands: Vec::new(),
        }
    }

    /// Insert the entries of `segments` before element `start_idx`.
    pub fn insert(self, start_idx: u64, segments: Vec<Segment>) -> Self {
        self.splice(start_idx, 0, segments)
    }

    /// Remove `num_delete` entries starting at element `start_idx`.
    pub fn remove(self, start_idx: u64, num_delete: u64) -> Self {
        self.splice(start_idx, num_delete, Vec::new())
    }

    /// Remove `num_delete` entries at `start_idx`, inserting the entries of
    /// `segments` in their place. `segments` may be empty.
    pub fn splice(mut self, start_idx: u64, num_delete: u64, segments: Vec<Segment>) -> Self {
        self.operands.push(SpliceOperand {
            start_idx,
            num_delete,
            segments,
        });
        self
    }

    /// Apply every buffered operand and persist exactly the chunks reachable
    /// from the final root. Returns that root's digest.
    pub async fn commit(self, chunker: Chunker) -> Result<Digest, GraftProllyTreeError> {
        let cacher = ChunkCacher::new(self.loader, self.writer);

        let mut root = self.root;
        for operand in self.operands {
            let mut builder = match root {
                Some(root) => NodeBuilder::from_root(
                    root,
                    Position::Index(operand.start_idx),
                    &cacher,
                    &cacher,
                    chunker,
                ),
                None => NodeBuilder::fresh(&cacher, &cacher, chunker),
            };
            builder.splice_elements(operand.num_delete, operand.segments);
            root = Some(builder.commit().await?);
        }

        let root = match root {
            Some(root) => root,
            // No operands at all: the transaction still yields a
            // well-formed (empty) tree.
            None => NodeBuilder::fresh(&cacher, &cacher, chunker).commit().await?,
        };

        cacher.dump_reachable(&root).await?;
        Ok(root)
    }
}
