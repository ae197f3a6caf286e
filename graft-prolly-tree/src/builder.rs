use graft_common::Digest;
use graft_storage::{ChunkLoader, ChunkWriter};

use crate::{
    Chunker, GraftProllyTreeError, NodeCursor, OrderedKey, RollingHasher, Segment, SeqNode,
};

/// Where a splice lands in the leaf sequence.
#[derive(Clone, Debug)]
pub enum Position {
    /// The global element index of the first affected entry.
    Index(u64),
    /// The key of the first affected entry (map and set trees).
    Key(OrderedKey),
}

/// A single-splice tree edit: starting from an existing root (or from
/// nothing), delete a run of entries at a position and append entry segments
/// in their place, producing the root of the resulting tree.
///
/// Chunk boundaries of the result match what a from-scratch construction of
/// the final leaf sequence would produce, so logically equal trees converge
/// on one root digest no matter how they were edited. The builder works one
/// level at a time: the leaf splice emits new leaf chunks and translates
/// itself into a meta-entry splice for the parent level, until a single
/// (canonical) root chunk remains.
pub struct NodeBuilder<'a, Loader: ChunkLoader, Writer: ChunkWriter> {
    loader: &'a Loader,
    writer: &'a Writer,
    chunker: Chunker,
    root: Option<Digest>,
    position: Position,
    num_delete: u64,
    appended: Vec<Segment>,
}

/// What one level of building produced.
struct LevelOutcome<'a, Loader: ChunkLoader> {
    /// Encoded meta entries of the chunks emitted at this level, in order.
    metas: Segment,
    /// Digests of the chunks emitted at this level, in order.
    emitted: Vec<Digest>,
    /// A cursor over the parent level, positioned at the first touched
    /// child, when the old tree has a parent level.
    parent_cursor: Option<NodeCursor<'a, Loader>>,
    /// The number of old chunks at this level consumed by the splice.
    parent_delete: u64,
}

impl<'a, Loader: ChunkLoader, Writer: ChunkWriter> NodeBuilder<'a, Loader, Writer> {
    /// A builder editing the tree rooted at `root` at the given position.
    pub fn from_root(
        root: Digest,
        position: Position,
        loader: &'a Loader,
        writer: &'a Writer,
        chunker: Chunker,
    ) -> Self {
        NodeBuilder {
            loader,
            writer,
            chunker,
            root: Some(root),
            position,
            num_delete: 0,
            appended: Vec::new(),
        }
    }

    /// A builder constructing a fresh tree from nothing.
    pub fn fresh(loader: &'a Loader, writer: &'a Writer, chunker: Chunker) -> Self {
        NodeBuilder {
            loader,
            writer,
            chunker,
            root: None,
            position: Position::Index(0),
            num_delete: 0,
            appended: Vec::new(),
        }
    }

    /// Queue the splice: delete `num_delete` entries at the builder's
    /// position, then insert the entries of `segments` in their place.
    pub fn splice_elements(&mut self, num_delete: u64, segments: Vec<Segment>) {
        self.num_delete += num_delete;
        self.appended.extend(segments);
    }

    /// Run the splice and return the new root digest.
    pub async fn commit(self) -> Result<Digest, GraftProllyTreeError> {
        let appended_entries: usize = self
            .appended
            .iter()
            .map(|segment| segment.num_entries())
            .sum();

        // A splice that neither deletes nor inserts never reads or writes.
        if let Some(root) = self.root {
            if self.num_delete == 0 && appended_entries == 0 {
                return Ok(root);
            }
        }

        // Flatten the input segments into one accumulation segment of the
        // leaf shape.
        let mut append = self.chunker.empty_segment();
        for segment in &self.appended {
            for index in 0..segment.num_entries() {
                append.push_entry(segment.entry(index));
            }
        }

        let mut cursor = match &self.root {
            Some(root) => Some(match &self.position {
                Position::Index(index) => {
                    NodeCursor::seek_index(root, *index, self.loader).await?
                }
                Position::Key(key) => NodeCursor::seek_key(root, key, self.loader).await?,
            }),
            None => None,
        };
        let mut chunker = self.chunker;
        let mut num_delete = self.num_delete;

        let candidate = loop {
            let outcome =
                build_level(cursor, num_delete, &append, chunker, self.writer).await?;

            match outcome.parent_cursor {
                Some(parent_cursor) => {
                    if outcome.parent_delete == 0 && outcome.metas.is_empty() {
                        // Nothing changed at this level, so nothing can
                        // change above it.
                        break self.root.ok_or_else(|| {
                            GraftProllyTreeError::UnexpectedTreeShape(
                                "A parent level appeared without a root".into(),
                            )
                        })?;
                    }
                    cursor = Some(parent_cursor);
                    num_delete = outcome.parent_delete;
                    append = outcome.metas;
                    chunker = Chunker::Meta;
                }
                None => match outcome.emitted.len() {
                    1 => break outcome.emitted[0],
                    0 => {
                        // The edit consumed every entry; the canonical empty
                        // tree is a single empty leaf chunk.
                        let info = self.chunker.make(&[])?;
                        let digest = info.meta_entry.child;
                        self.writer.write(&digest, &info.chunk).await?;
                        break digest;
                    }
                    _ => {
                        cursor = None;
                        num_delete = 0;
                        append = outcome.metas;
                        chunker = Chunker::Meta;
                    }
                },
            }
        };

        // A root must never be a single-entry meta node; unwrap down to the
        // first node that stands on its own.
        let mut root = candidate;
        loop {
            let chunk = self
                .loader
                .load(&root)
                .await?
                .ok_or_else(|| GraftProllyTreeError::MissingChunk(format!("{root}")))?;
            match SeqNode::decode(chunk)? {
                SeqNode::Meta(meta) if meta.num_entries() == 1 => {
                    root = meta.entry(0).child;
                }
                _ => break,
            }
        }
        Ok(root)
    }
}

/// Emit one chunk from the pending entries: pack, write, record its meta
/// entry, and reset the rolling hasher for a fresh run.
async fn emit_chunk<Writer: ChunkWriter>(
    chunker: Chunker,
    pending: &mut Segment,
    hasher: &mut RollingHasher,
    metas: &mut Segment,
    emitted: &mut Vec<Digest>,
    writer: &Writer,
) -> Result<(), GraftProllyTreeError> {
    let info = chunker.make(&[&*pending])?;
    let digest = info.meta_entry.child;
    writer.write(&digest, &info.chunk).await?;
    metas.push_frame(&info.meta_entry.encode());
    emitted.push(digest);
    pending.clear();
    hasher.reset();
    Ok(())
}

/// Run the splice at one level of the tree.
async fn build_level<'a, Loader: ChunkLoader, Writer: ChunkWriter>(
    cursor: Option<NodeCursor<'a, Loader>>,
    num_delete: u64,
    append: &Segment,
    chunker: Chunker,
    writer: &Writer,
) -> Result<LevelOutcome<'a, Loader>, GraftProllyTreeError> {
    let mut hasher = RollingHasher::new();
    let mut pending = chunker.empty_segment();
    let mut metas = Segment::variable();
    let mut emitted = Vec::new();
    let mut parent_delete = 0u64;
    // Whether the chunk the cursor currently sits in has been charged to
    // `parent_delete` yet. A chunk is charged when the splice consumes or
    // skips its first entry, never merely because the cursor entered it.
    let mut counted = false;

    let parent_cursor = cursor
        .as_ref()
        .and_then(|cursor| cursor.clone().into_parent_level());
    let mut cursor = cursor;

    let touch = |counted: &mut bool, parent_delete: &mut u64| {
        if !*counted {
            *counted = true;
            *parent_delete += 1;
        }
    };

    // Resume: replay the entries of the current chunk that precede the
    // splice point, so the hasher and the pending buffer stand exactly as a
    // from-scratch build would have them here. Only entry bytes are hashed;
    // node headers never are. A boundary can fire here only when the cursor
    // sits at the very end of its chunk, in which case the (unchanged) chunk
    // is re-emitted and the splice continues on a fresh run.
    if let Some(cursor) = cursor.as_ref() {
        let upto = if cursor.is_end() {
            cursor.num_entries()
        } else {
            cursor.idx()
        };
        for index in 0..upto {
            let entry = cursor.node().entry(index);
            pending.push_entry(entry);
            hasher.hash_bytes(entry);
        }
        if upto > 0 {
            touch(&mut counted, &mut parent_delete);
        }
        if hasher.crossed_boundary() {
            emit_chunk(
                chunker,
                &mut pending,
                &mut hasher,
                &mut metas,
                &mut emitted,
                writer,
            )
            .await?;
        }
    }

    // Skip the deleted entries. Crossing into a further chunk means that
    // chunk is consumed by the splice as well.
    if let Some(cursor) = cursor.as_mut() {
        let mut remaining = num_delete;
        while remaining > 0 && !cursor.is_end() {
            touch(&mut counted, &mut parent_delete);
            if cursor.advance().await? {
                counted = false;
            }
            remaining -= 1;
        }
    }

    // Append the new entries, emitting a chunk whenever the hasher crosses a
    // boundary.
    for index in 0..append.num_entries() {
        let entry = append.entry(index);
        pending.push_entry(entry);
        hasher.hash_bytes(entry);
        if hasher.crossed_boundary() {
            emit_chunk(
                chunker,
                &mut pending,
                &mut hasher,
                &mut metas,
                &mut emitted,
                writer,
            )
            .await?;
        }
    }

    // Walk the tail: re-append old entries after the splice until a boundary
    // lands exactly on the start of a chunk the splice never touched. From
    // that point on every old chunk re-chunks identically (each began on a
    // fresh hasher run), so the whole suffix is reused as-is.
    match cursor.as_mut() {
        Some(cursor) => loop {
            if cursor.is_end() {
                if !pending.is_empty() {
                    emit_chunk(
                        chunker,
                        &mut pending,
                        &mut hasher,
                        &mut metas,
                        &mut emitted,
                        writer,
                    )
                    .await?;
                }
                break;
            }
            if pending.is_empty() && cursor.at_chunk_start() && !counted {
                break;
            }
            touch(&mut counted, &mut parent_delete);
            if let Some(entry) = cursor.entry() {
                pending.push_entry(entry);
                hasher.hash_bytes(entry);
            }
            if cursor.advance().await? {
                counted = false;
            }
            if hasher.crossed_boundary() {
                emit_chunk(
                    chunker,
                    &mut pending,
                    &mut hasher,
                    &mut metas,
                    &mut emitted,
                    writer,
                )
                .await?;
            }
        },
        None => {
            if !pending.is_empty() {
                emit_chunk(
                    chunker,
                    &mut pending,
                    &mut hasher,
                    &mut metas,
                    &mut emitted,
                    writer,
                )
                .await?;
            }
        }
    }

    Ok(LevelOutcome {
        metas,
        emitted,
        parent_cursor,
        parent_delete,
    })
}
