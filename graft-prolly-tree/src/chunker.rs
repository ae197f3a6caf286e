use graft_common::Bytes;
use graft_storage::{Chunk, ChunkType};

use crate::{
    entry::{map_key, set_key},
    GraftProllyTreeError, MetaEntry, OrderedKey, Segment, VAR_NODE_HEADER_SIZE,
};

/// The output of packing segments into one chunk: the chunk itself and the
/// single [`MetaEntry`] a parent level stores for it.
#[derive(Clone, Debug)]
pub struct ChunkInfo {
    /// The packed chunk.
    pub chunk: Chunk,
    /// The meta entry describing the packed chunk.
    pub meta_entry: MetaEntry,
}

/// Packs ordered entry segments into chunks, one variant per node type.
///
/// The parent level of any tree is always [`Chunker::Meta`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chunker {
    /// Packs blob leaves (fixed one-byte entries).
    Blob,
    /// Packs list leaves.
    List,
    /// Packs map leaves.
    Map,
    /// Packs set leaves.
    Set,
    /// Packs meta nodes.
    Meta,
}

impl Chunker {
    /// The chunker for a tree-participating chunk type.
    pub fn for_type(ctype: ChunkType) -> Result<Self, GraftProllyTreeError> {
        Ok(match ctype {
            ChunkType::Blob => Chunker::Blob,
            ChunkType::List => Chunker::List,
            ChunkType::Map => Chunker::Map,
            ChunkType::Set => Chunker::Set,
            ChunkType::Meta => Chunker::Meta,
            other => {
                return Err(GraftProllyTreeError::IncorrectTreeAccess(format!(
                    "No chunker exists for {:?} chunks",
                    other
                )));
            }
        })
    }

    /// The chunk type this chunker packs.
    pub fn ctype(&self) -> ChunkType {
        match self {
            Chunker::Blob => ChunkType::Blob,
            Chunker::List => ChunkType::List,
            Chunker::Map => ChunkType::Map,
            Chunker::Set => ChunkType::Set,
            Chunker::Meta => ChunkType::Meta,
        }
    }

    /// Whether entries have the fixed one-byte shape.
    pub fn is_fixed_entry(&self) -> bool {
        matches!(self, Chunker::Blob)
    }

    /// Whether subtree keys are element counts rather than entry keys.
    pub fn is_by_index(&self) -> bool {
        matches!(self, Chunker::Blob | Chunker::List)
    }

    /// An empty accumulation segment of the right shape for this chunker.
    pub fn empty_segment(&self) -> Segment {
        if self.is_fixed_entry() {
            Segment::fixed_empty()
        } else {
            Segment::variable()
        }
    }

    /// Pack the entries of `segments`, in order, into a single chunk and
    /// derive its meta entry.
    pub fn make(&self, segments: &[&Segment]) -> Result<ChunkInfo, GraftProllyTreeError> {
        let num_entries: usize = segments.iter().map(|segment| segment.num_entries()).sum();
        let num_content_bytes: usize = segments.iter().map(|segment| segment.total_bytes()).sum();

        let mut body = Bytes::new();
        if !self.is_fixed_entry() {
            body.extend_from_slice(&(num_entries as u32).to_le_bytes());
        }
        for segment in segments {
            body.extend_from_slice(segment.as_bytes());
        }
        debug_assert_eq!(
            body.len(),
            num_content_bytes + if self.is_fixed_entry() { 0 } else { VAR_NODE_HEADER_SIZE }
        );

        let last_entry = segments
            .iter()
            .rev()
            .find(|segment| !segment.is_empty())
            .map(|segment| segment.entry(segment.num_entries() - 1));

        let (num_leaves, num_bytes, key) = match self {
            Chunker::Blob | Chunker::List => (
                num_entries as u64,
                num_content_bytes as u64,
                OrderedKey::by_index(num_entries as u64),
            ),
            Chunker::Map => (
                num_entries as u64,
                num_content_bytes as u64,
                last_entry
                    .map(|entry| OrderedKey::by_value(map_key(entry)))
                    .unwrap_or_default(),
            ),
            Chunker::Set => (
                num_entries as u64,
                num_content_bytes as u64,
                last_entry
                    .map(|entry| OrderedKey::by_value(set_key(entry)))
                    .unwrap_or_default(),
            ),
            Chunker::Meta => {
                if num_entries == 0 {
                    return Err(GraftProllyTreeError::InvalidConstruction(
                        "A meta node must reference at least one child".into(),
                    ));
                }
                let mut num_leaves = 0u64;
                let mut num_bytes = 0u64;
                let mut last_key = OrderedKey::default();
                for segment in segments {
                    for index in 0..segment.num_entries() {
                        let child = MetaEntry::decode(segment.entry(index))?;
                        num_leaves += child.num_leaves;
                        num_bytes += child.num_bytes;
                        last_key = child.key;
                    }
                }
                (num_leaves, num_bytes, last_key)
            }
        };

        let chunk = Chunk::new(self.ctype(), body);
        let meta_entry = MetaEntry {
            num_leaves,
            num_bytes,
            child: chunk.digest(),
            key,
        };
        Ok(ChunkInfo { chunk, meta_entry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::map_entry;
    use crate::SeqNode;

    #[test]
    fn it_packs_blob_segments() {
        let segment = Segment::fixed(&b"0123456789"[..]);
        let info = Chunker::Blob.make(&[&segment]).unwrap();
        assert_eq!(info.chunk.ctype(), ChunkType::Blob);
        assert_eq!(info.meta_entry.num_leaves, 10);
        assert_eq!(info.meta_entry.key.to_index(), Some(10));
        assert_eq!(info.chunk.body(), b"0123456789");
    }

    #[test]
    fn it_packs_map_segments_with_the_greatest_key() {
        let segment = Segment::from_frames([map_entry(b"ant", b"1"), map_entry(b"bee", b"2")]);
        let info = Chunker::Map.make(&[&segment]).unwrap();
        assert_eq!(info.meta_entry.key.as_bytes(), b"bee");

        let node = SeqNode::decode(info.chunk).unwrap();
        assert_eq!(node.num_entries(), 2);
        assert_eq!(node.entry_key(1), Some(&b"bee"[..]));
    }

    #[test]
    fn it_aggregates_children_in_meta_chunks() {
        let leaf_a = Chunker::Map
            .make(&[&Segment::from_frames([map_entry(b"a", b"1")])])
            .unwrap();
        let leaf_b = Chunker::Map
            .make(&[&Segment::from_frames([map_entry(b"b", b"2")])])
            .unwrap();
        let metas = Segment::from_frames([leaf_a.meta_entry.encode(), leaf_b.meta_entry.encode()]);

        let info = Chunker::Meta.make(&[&metas]).unwrap();
        assert_eq!(info.meta_entry.num_leaves, 2);
        assert_eq!(info.meta_entry.key.as_bytes(), b"b");

        let node = SeqNode::decode(info.chunk).unwrap();
        assert_eq!(node.num_elements(), 2);
    }

    #[test]
    fn it_refuses_an_empty_meta_chunk() {
        let empty = Segment::variable();
        assert!(Chunker::Meta.make(&[&empty]).is_err());
    }
}
