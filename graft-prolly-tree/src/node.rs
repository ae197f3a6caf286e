use graft_common::Bytes;
use graft_storage::{Chunk, ChunkType};

use crate::{
    entry::{map_key, set_key, validate_frame},
    GraftProllyTreeError, MetaEntry, OrderedKey,
};

/// The number of bytes preceding the first frame in a variable-entry chunk
/// body: the `num_entries:u32` header. Headers are never rolling-hashed.
pub const VAR_NODE_HEADER_SIZE: usize = 4;

/// A blob leaf: every body byte is one element.
#[derive(Clone, Debug)]
pub struct BlobNode {
    chunk: Chunk,
}

impl BlobNode {
    /// The element bytes.
    pub fn bytes(&self) -> &[u8] {
        self.chunk.body()
    }

    /// The number of elements (= bytes) held.
    pub fn num_entries(&self) -> usize {
        self.chunk.body().len()
    }
}

/// A string node: `len:u32 | bytes`, always a single chunk.
#[derive(Clone, Debug)]
pub struct StringNode {
    chunk: Chunk,
}

impl StringNode {
    /// Build the chunk form of a string node.
    pub fn new_chunk(text: &[u8]) -> Chunk {
        let mut body = Bytes::new();
        body.extend_from_slice(&(text.len() as u32).to_le_bytes());
        body.extend_from_slice(text);
        Chunk::new(ChunkType::String, body)
    }

    /// The string payload bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.chunk.body()[4..]
    }

    /// The payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode a string node from its chunk.
    pub fn decode(chunk: Chunk) -> Result<Self, GraftProllyTreeError> {
        if chunk.ctype() != ChunkType::String {
            return Err(GraftProllyTreeError::IncorrectTreeAccess(format!(
                "Not a string chunk: {:?}",
                chunk.ctype()
            )));
        }
        let body = chunk.body();
        if body.len() < 4 {
            return Err(GraftProllyTreeError::MalformedNode(
                "String node shorter than its header".into(),
            ));
        }
        let len = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
        if body.len() != 4 + len {
            return Err(GraftProllyTreeError::MalformedNode(format!(
                "String node length field ({}) disagrees with body ({})",
                len,
                body.len() - 4
            )));
        }
        Ok(StringNode { chunk })
    }
}

/// A variable-entry node: list, map or set leaf. The body is
/// `num_entries:u32` followed by length-prefixed frames.
#[derive(Clone, Debug)]
pub struct VarNode {
    chunk: Chunk,
    offsets: Vec<usize>,
}

impl VarNode {
    fn decode(chunk: Chunk) -> Result<Self, GraftProllyTreeError> {
        let body = chunk.body();
        if body.len() < VAR_NODE_HEADER_SIZE {
            return Err(GraftProllyTreeError::MalformedNode(
                "Node shorter than its header".into(),
            ));
        }
        let count = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
        let mut offsets = Vec::with_capacity(count);
        let mut at = VAR_NODE_HEADER_SIZE;
        for _ in 0..count {
            offsets.push(at);
            at += validate_frame(&body[at..])?;
        }
        if at != body.len() {
            return Err(GraftProllyTreeError::MalformedNode(format!(
                "Node has {} trailing bytes after {} entries",
                body.len() - at,
                count
            )));
        }
        Ok(VarNode { chunk, offsets })
    }

    /// The number of entries held.
    pub fn num_entries(&self) -> usize {
        self.offsets.len()
    }

    /// The frame bytes of the i-th entry.
    pub fn entry(&self, index: usize) -> &[u8] {
        let start = self.offsets[index];
        let end = self
            .offsets
            .get(index + 1)
            .copied()
            .unwrap_or_else(|| self.chunk.body().len());
        &self.chunk.body()[start..end]
    }
}

/// An internal node holding one [`MetaEntry`] per child chunk.
#[derive(Clone, Debug)]
pub struct MetaNode {
    inner: VarNode,
    entries: Vec<MetaEntry>,
    /// `cumulative[i]` is the number of leaf elements in children `0..i`;
    /// has `num_entries + 1` items.
    cumulative: Vec<u64>,
}

impl MetaNode {
    fn decode(chunk: Chunk) -> Result<Self, GraftProllyTreeError> {
        let inner = VarNode::decode(chunk)?;
        let mut entries = Vec::with_capacity(inner.num_entries());
        let mut cumulative = Vec::with_capacity(inner.num_entries() + 1);
        let mut total = 0u64;
        cumulative.push(0);
        for index in 0..inner.num_entries() {
            let entry = MetaEntry::decode(inner.entry(index))?;
            total += entry.num_leaves;
            cumulative.push(total);
            entries.push(entry);
        }
        Ok(MetaNode {
            inner,
            entries,
            cumulative,
        })
    }

    /// The number of children referenced.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// The number of leaf elements across all child subtrees.
    pub fn num_elements(&self) -> u64 {
        *self.cumulative.last().unwrap_or(&0)
    }

    /// The decoded meta entries, in child order.
    pub fn entries(&self) -> &[MetaEntry] {
        &self.entries
    }

    /// The i-th decoded meta entry.
    pub fn entry(&self, index: usize) -> &MetaEntry {
        &self.entries[index]
    }

    /// The frame bytes of the i-th meta entry, as stored.
    pub fn entry_frame(&self, index: usize) -> &[u8] {
        self.inner.entry(index)
    }

    /// The number of leaf elements in children before `index`.
    pub fn elements_before(&self, index: usize) -> u64 {
        self.cumulative[index]
    }

    /// The child whose subtree contains the element at `element_index`
    /// (counting from the start of this node), along with the index of that
    /// element relative to the child. Returns the last child with a clamped
    /// relative index when `element_index` is at or past the end.
    pub fn find_child_by_index(&self, element_index: u64) -> (usize, u64) {
        for (child, entry) in self.entries.iter().enumerate() {
            let before = self.cumulative[child];
            if element_index < before + entry.num_leaves {
                return (child, element_index - before);
            }
        }
        let last = self.entries.len().saturating_sub(1);
        (last, element_index.saturating_sub(self.cumulative[last]))
    }

    /// The first child whose greatest key is `>= key`, or the last child when
    /// every key is smaller (so that seeking a too-large key lands at the end
    /// of the tree).
    pub fn find_child_by_key(&self, key: &OrderedKey) -> usize {
        for (child, entry) in self.entries.iter().enumerate() {
            if entry.key >= *key {
                return child;
            }
        }
        self.entries.len().saturating_sub(1)
    }
}

/// A decoded chunk, dispatched by its [`ChunkType`].
#[derive(Clone, Debug)]
pub enum SeqNode {
    /// A blob leaf.
    Blob(BlobNode),
    /// A string node.
    Str(StringNode),
    /// A list leaf.
    List(VarNode),
    /// A map leaf.
    Map(VarNode),
    /// A set leaf.
    Set(VarNode),
    /// An internal meta node.
    Meta(MetaNode),
}

impl SeqNode {
    /// Decode a chunk into its node view.
    pub fn decode(chunk: Chunk) -> Result<Self, GraftProllyTreeError> {
        Ok(match chunk.ctype() {
            ChunkType::Blob => SeqNode::Blob(BlobNode { chunk }),
            ChunkType::String => SeqNode::Str(StringNode::decode(chunk)?),
            ChunkType::List => SeqNode::List(VarNode::decode(chunk)?),
            ChunkType::Map => SeqNode::Map(VarNode::decode(chunk)?),
            ChunkType::Set => SeqNode::Set(VarNode::decode(chunk)?),
            ChunkType::Meta => SeqNode::Meta(MetaNode::decode(chunk)?),
            ChunkType::Cell => {
                return Err(GraftProllyTreeError::IncorrectTreeAccess(
                    "A cell chunk is not a tree node".into(),
                ));
            }
        })
    }

    /// The chunk type of this node.
    pub fn ctype(&self) -> ChunkType {
        match self {
            SeqNode::Blob(_) => ChunkType::Blob,
            SeqNode::Str(_) => ChunkType::String,
            SeqNode::List(_) => ChunkType::List,
            SeqNode::Map(_) => ChunkType::Map,
            SeqNode::Set(_) => ChunkType::Set,
            SeqNode::Meta(_) => ChunkType::Meta,
        }
    }

    /// Whether this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        !matches!(self, SeqNode::Meta(_))
    }

    /// The number of direct entries held by this node.
    pub fn num_entries(&self) -> usize {
        match self {
            SeqNode::Blob(node) => node.num_entries(),
            SeqNode::Str(_) => 1,
            SeqNode::List(node) | SeqNode::Map(node) | SeqNode::Set(node) => node.num_entries(),
            SeqNode::Meta(node) => node.num_entries(),
        }
    }

    /// The number of leaf elements in the subtree rooted at this node.
    pub fn num_elements(&self) -> u64 {
        match self {
            SeqNode::Meta(node) => node.num_elements(),
            _ => self.num_entries() as u64,
        }
    }

    /// The bytes of the i-th entry: one byte for blobs, the stored frame
    /// otherwise.
    pub fn entry(&self, index: usize) -> &[u8] {
        match self {
            SeqNode::Blob(node) => &node.bytes()[index..index + 1],
            SeqNode::Str(node) => node.bytes(),
            SeqNode::List(node) | SeqNode::Map(node) | SeqNode::Set(node) => node.entry(index),
            SeqNode::Meta(node) => node.entry_frame(index),
        }
    }

    /// The ordering key of the i-th entry, for the keyed node types.
    pub fn entry_key(&self, index: usize) -> Option<&[u8]> {
        match self {
            SeqNode::Map(node) => Some(map_key(node.entry(index))),
            SeqNode::Set(node) => Some(set_key(node.entry(index))),
            SeqNode::Meta(node) => Some(node.entry(index).key.as_bytes()),
            _ => None,
        }
    }

    /// This node as a meta node, when it is one.
    pub fn as_meta(&self) -> Option<&MetaNode> {
        match self {
            SeqNode::Meta(node) => Some(node),
            _ => None,
        }
    }

    /// The first entry index whose key is `>= key`; `num_entries` when every
    /// key is smaller. Meaningful for map, set and meta nodes only.
    pub fn search_key(&self, key: &OrderedKey) -> usize {
        let count = self.num_entries();
        for index in 0..count {
            if let Some(entry_key) = self.entry_key(index) {
                if entry_key >= key.as_bytes() {
                    return index;
                }
            }
        }
        count
    }
}
