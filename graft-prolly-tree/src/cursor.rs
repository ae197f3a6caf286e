use graft_common::Digest;
use graft_storage::ChunkLoader;

use crate::{GraftProllyTreeError, MetaNode, OrderedKey, SeqNode};

/// One step of the path from the root down to the cursor's current node.
#[derive(Clone, Debug)]
struct Frame {
    node: MetaNode,
    digest: Digest,
    idx: usize,
}

/// A two-way positioned cursor through a prolly tree.
///
/// The cursor points at one entry of its current node, holding the chain of
/// meta nodes above it as an owned stack of `(node, child index)` frames.
/// Advancing past the last entry of a chunk walks up the stack, advances
/// there, and descends to the first entry of the next chunk; retreating is
/// symmetric. All leaves of a tree sit at one depth, so sibling descent
/// always rebuilds the same number of frames.
///
/// Two sentinel positions exist: one before the first entry (after
/// retreating off the head) and one past the last (after advancing off the
/// tail, or after seeking beyond the element count).
pub struct NodeCursor<'a, Loader: ChunkLoader> {
    loader: &'a Loader,
    frames: Vec<Frame>,
    node: SeqNode,
    node_digest: Digest,
    idx: isize,
}

impl<'a, Loader: ChunkLoader> Clone for NodeCursor<'a, Loader> {
    fn clone(&self) -> Self {
        NodeCursor {
            loader: self.loader,
            frames: self.frames.clone(),
            node: self.node.clone(),
            node_digest: self.node_digest,
            idx: self.idx,
        }
    }
}

async fn load_node<Loader: ChunkLoader>(
    loader: &Loader,
    digest: &Digest,
) -> Result<SeqNode, GraftProllyTreeError> {
    let chunk = loader
        .load(digest)
        .await?
        .ok_or_else(|| GraftProllyTreeError::MissingChunk(format!("{digest}")))?;
    SeqNode::decode(chunk)
}

impl<'a, Loader: ChunkLoader> NodeCursor<'a, Loader> {
    /// Position a cursor at the element with the given global index in the
    /// tree rooted at `root`. An index at or past the element count yields
    /// the end sentinel.
    pub async fn seek_index(
        root: &Digest,
        index: u64,
        loader: &'a Loader,
    ) -> Result<NodeCursor<'a, Loader>, GraftProllyTreeError> {
        let mut digest = *root;
        let mut node = load_node(loader, &digest).await?;
        let mut frames = Vec::new();
        let mut remaining = index;

        while let SeqNode::Meta(meta) = node {
            let (child, relative) = meta.find_child_by_index(remaining);
            let child_digest = meta.entry(child).child;
            frames.push(Frame {
                node: meta,
                digest,
                idx: child,
            });
            remaining = relative;
            digest = child_digest;
            node = load_node(loader, &digest).await?;
        }

        let count = node.num_entries() as u64;
        Ok(NodeCursor {
            loader,
            frames,
            idx: remaining.min(count) as isize,
            node,
            node_digest: digest,
        })
    }

    /// Position a cursor at the first entry whose key is `>= key` in the
    /// tree rooted at `root`, or at the end sentinel when every key is
    /// smaller.
    pub async fn seek_key(
        root: &Digest,
        key: &OrderedKey,
        loader: &'a Loader,
    ) -> Result<NodeCursor<'a, Loader>, GraftProllyTreeError> {
        let mut digest = *root;
        let mut node = load_node(loader, &digest).await?;
        let mut frames = Vec::new();

        while let SeqNode::Meta(meta) = node {
            let child = meta.find_child_by_key(key);
            let child_digest = meta.entry(child).child;
            frames.push(Frame {
                node: meta,
                digest,
                idx: child,
            });
            digest = child_digest;
            node = load_node(loader, &digest).await?;
        }

        let idx = node.search_key(key) as isize;
        Ok(NodeCursor {
            loader,
            frames,
            idx,
            node,
            node_digest: digest,
        })
    }

    /// The current node.
    pub fn node(&self) -> &SeqNode {
        &self.node
    }

    /// The digest of the current node's chunk.
    pub fn node_digest(&self) -> Digest {
        self.node_digest
    }

    /// The entry index within the current node. Meaningless at sentinels.
    pub fn idx(&self) -> usize {
        self.idx.max(0) as usize
    }

    /// The number of entries in the current node.
    pub fn num_entries(&self) -> usize {
        self.node.num_entries()
    }

    /// Whether the cursor sits before the first entry of the tree.
    pub fn is_begin(&self) -> bool {
        self.idx < 0
    }

    /// Whether the cursor sits past the last entry of the tree.
    pub fn is_end(&self) -> bool {
        self.idx >= self.node.num_entries() as isize
    }

    /// Whether the cursor sits at the first entry of its current chunk.
    pub fn at_chunk_start(&self) -> bool {
        self.idx == 0
    }

    /// The bytes of the current entry, or `None` at a sentinel.
    pub fn entry(&self) -> Option<&[u8]> {
        if self.is_begin() || self.is_end() {
            None
        } else {
            Some(self.node.entry(self.idx as usize))
        }
    }

    /// The number of meta levels above the current node.
    pub fn height(&self) -> usize {
        self.frames.len()
    }

    /// The global element index of the cursor position: the number of leaf
    /// elements preceding it in the whole tree. At the end sentinel this is
    /// the total element count.
    pub fn global_index(&self) -> u64 {
        let before_node: u64 = self
            .frames
            .iter()
            .map(|frame| frame.node.elements_before(frame.idx))
            .sum();
        before_node + self.idx.max(0) as u64
    }

    /// The index of the current chunk within its direct parent, when a
    /// parent level exists.
    pub fn parent_index(&self) -> Option<usize> {
        self.frames.last().map(|frame| frame.idx)
    }

    /// The digest of the ancestor node `levels` levels above the current
    /// node (0 is the current node itself), when that ancestor exists.
    pub fn ancestor_digest(&self, levels: usize) -> Option<Digest> {
        if levels == 0 {
            Some(self.node_digest)
        } else if levels <= self.frames.len() {
            Some(self.frames[self.frames.len() - levels].digest)
        } else {
            None
        }
    }

    /// Whether the cursor sits at the first element of the subtree rooted
    /// `levels` levels above the current node.
    pub fn at_subtree_start(&self, levels: usize) -> bool {
        if self.idx != 0 {
            return false;
        }
        let depth = self.frames.len();
        self.frames[depth - levels.min(depth)..]
            .iter()
            .all(|frame| frame.idx == 0)
    }

    /// The digest of the chunk immediately before the current one under the
    /// same direct parent, if any.
    pub fn prev_sibling_digest(&self) -> Option<Digest> {
        let frame = self.frames.last()?;
        if frame.idx == 0 {
            return None;
        }
        Some(frame.node.entry(frame.idx - 1).child)
    }

    /// Step back to the start of the previous sibling chunk under the same
    /// direct parent. The cursor must sit at the start of its current chunk.
    /// Returns `false` (without moving) when there is no such sibling.
    pub async fn retreat_chunk(&mut self) -> Result<bool, GraftProllyTreeError> {
        if !self.at_chunk_start() || self.prev_sibling_digest().is_none() {
            return Ok(false);
        }
        let target_depth = self.frames.len();
        if let Some(frame) = self.frames.last_mut() {
            frame.idx -= 1;
        }
        self.descend(target_depth, true).await?;
        Ok(true)
    }

    /// Consume this cursor, yielding one positioned at the parent level:
    /// the direct parent meta node becomes the current node, pointed at the
    /// child the cursor was inside of. `None` when no parent level exists.
    pub fn into_parent_level(mut self) -> Option<NodeCursor<'a, Loader>> {
        let frame = self.frames.pop()?;
        Some(NodeCursor {
            loader: self.loader,
            frames: self.frames,
            idx: frame.idx as isize,
            node: SeqNode::Meta(frame.node),
            node_digest: frame.digest,
        })
    }

    /// Move one entry forward. Returns `true` when the move crossed into a
    /// new chunk. Advancing at the end sentinel is a no-op.
    pub async fn advance(&mut self) -> Result<bool, GraftProllyTreeError> {
        if self.is_end() {
            return Ok(false);
        }
        self.idx += 1;
        if (self.idx as usize) < self.node.num_entries() {
            return Ok(false);
        }
        self.cross_forward(self.frames.len()).await
    }

    /// Move one entry backward. Returns `true` when the move crossed into a
    /// previous chunk. Retreating at the begin sentinel is a no-op.
    pub async fn retreat(&mut self) -> Result<bool, GraftProllyTreeError> {
        if self.is_begin() {
            return Ok(false);
        }
        self.idx -= 1;
        if self.idx >= 0 {
            return Ok(false);
        }
        self.cross_backward().await
    }

    /// Skip the entire subtree rooted `levels` levels above the current
    /// node, landing at the first entry after it (or the end sentinel). The
    /// cursor must sit at the start of that subtree.
    pub async fn advance_subtree(&mut self, levels: usize) -> Result<(), GraftProllyTreeError> {
        debug_assert!(self.at_subtree_start(levels));
        let depth = self.frames.len();
        if levels >= depth {
            return self.to_end().await;
        }
        self.idx = self.node.num_entries() as isize;
        self.cross_forward(depth - levels).await?;
        Ok(())
    }

    /// Advance the deepest advanceable frame at or above `from`, then
    /// descend back to the cursor's own depth. Leaves the cursor at the end
    /// sentinel when no frame can advance.
    async fn cross_forward(&mut self, from: usize) -> Result<bool, GraftProllyTreeError> {
        let target_depth = self.frames.len();
        let mut at = from;
        while at > 0 {
            let frame = &self.frames[at - 1];
            if frame.idx + 1 < frame.node.num_entries() {
                break;
            }
            at -= 1;
        }
        if at == 0 {
            return self.to_end().await.map(|_| false);
        }
        self.frames.truncate(at);
        if let Some(frame) = self.frames.last_mut() {
            frame.idx += 1;
        }
        self.descend(target_depth, true).await?;
        Ok(true)
    }

    async fn cross_backward(&mut self) -> Result<bool, GraftProllyTreeError> {
        let target_depth = self.frames.len();
        let mut at = self.frames.len();
        while at > 0 {
            if self.frames[at - 1].idx > 0 {
                break;
            }
            at -= 1;
        }
        if at == 0 {
            // Back at the head of the tree; restore the first chunk and park
            // at the begin sentinel.
            self.descend(target_depth, true).await?;
            self.idx = -1;
            return Ok(false);
        }
        self.frames.truncate(at);
        if let Some(frame) = self.frames.last_mut() {
            frame.idx -= 1;
        }
        self.descend(target_depth, false).await?;
        self.idx = self.node.num_entries() as isize - 1;
        Ok(true)
    }

    /// Rebuild frames down to `target_depth` below the current frame stack,
    /// entering the first (or last) child at each level, then load the
    /// current node.
    async fn descend(
        &mut self,
        target_depth: usize,
        first: bool,
    ) -> Result<(), GraftProllyTreeError> {
        if self.frames.is_empty() {
            // A single-chunk tree: the current node is already the root.
            self.idx = 0;
            return Ok(());
        }
        loop {
            let frame = self
                .frames
                .last()
                .expect("descend always holds at least one frame");
            let child_digest = frame.node.entry(frame.idx).child;
            let child = load_node(self.loader, &child_digest).await?;
            if self.frames.len() < target_depth {
                match child {
                    SeqNode::Meta(meta) => {
                        let idx = if first { 0 } else { meta.num_entries() - 1 };
                        self.frames.push(Frame {
                            node: meta,
                            digest: child_digest,
                            idx,
                        });
                    }
                    _ => {
                        return Err(GraftProllyTreeError::UnexpectedTreeShape(
                            "Leaf encountered above leaf depth".into(),
                        ));
                    }
                }
            } else {
                self.node = child;
                self.node_digest = child_digest;
                self.idx = 0;
                return Ok(());
            }
        }
    }

    /// Reposition at the end sentinel: the last chunk of the tree, one past
    /// its last entry.
    async fn to_end(&mut self) -> Result<(), GraftProllyTreeError> {
        let target_depth = self.frames.len();
        if !self.frames.is_empty() {
            self.frames.truncate(1);
            if let Some(frame) = self.frames.first_mut() {
                frame.idx = frame.node.num_entries() - 1;
            }
            self.descend(target_depth, false).await?;
        }
        self.idx = self.node.num_entries() as isize;
        Ok(())
    }
}
