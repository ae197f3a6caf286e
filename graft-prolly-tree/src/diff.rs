//! Ordered structural difference and intersection of two trees.
//!
//! The iterators here walk two roots in lockstep. Wherever both sides sit at
//! the start of subtrees with equal digests, the whole subtree is skipped
//! without descending into it; this is what makes diffs of two roots that
//! share most of their structure cheap.

use graft_common::{Bytes, Digest};
use graft_storage::{ChunkLoader, ChunkType};

use crate::{
    entry::{list_element, map_key, map_value, set_key},
    GraftProllyTreeError, NodeCursor,
};

/// One differing key between two keyed trees: present only on the left,
/// only on the right, or on both sides with differing values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffEntry {
    /// The entry key.
    pub key: Bytes,
    /// The left-hand value, when the key exists on the left. Sets carry an
    /// empty value.
    pub left: Option<Bytes>,
    /// The right-hand value, when the key exists on the right.
    pub right: Option<Bytes>,
}

/// One differing element position between two indexed trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDiffEntry {
    /// The element index.
    pub index: u64,
    /// The left-hand element, when the index exists on the left.
    pub left: Option<Bytes>,
    /// The right-hand element, when the index exists on the right.
    pub right: Option<Bytes>,
}

fn keyed_parts(ctype: ChunkType, frame: &[u8]) -> (Bytes, Bytes) {
    match ctype {
        ChunkType::Map => (
            Bytes::copy_from_slice(map_key(frame)),
            Bytes::copy_from_slice(map_value(frame)),
        ),
        _ => (Bytes::copy_from_slice(set_key(frame)), Bytes::new()),
    }
}

/// Skip forward over every subtree the two cursors share, largest first.
async fn skip_shared_forward<'a, Loader: ChunkLoader>(
    left: &mut NodeCursor<'a, Loader>,
    right: &mut NodeCursor<'a, Loader>,
    aligned: impl Fn(&NodeCursor<'a, Loader>, &NodeCursor<'a, Loader>) -> bool,
) -> Result<(), GraftProllyTreeError> {
    'outer: loop {
        if left.is_end()
            || right.is_end()
            || !left.at_chunk_start()
            || !right.at_chunk_start()
            || !aligned(left, right)
        {
            return Ok(());
        }
        let deepest = left.height().min(right.height());
        for levels in (0..=deepest).rev() {
            if left.at_subtree_start(levels) && right.at_subtree_start(levels) {
                if let (Some(left_digest), Some(right_digest)) =
                    (left.ancestor_digest(levels), right.ancestor_digest(levels))
                {
                    if left_digest == right_digest {
                        left.advance_subtree(levels).await?;
                        right.advance_subtree(levels).await?;
                        continue 'outer;
                    }
                }
            }
        }
        return Ok(());
    }
}

/// Skip backward over shared sibling chunks when both cursors sit at chunk
/// starts preceded by chunks with equal digests.
async fn skip_shared_backward<'a, Loader: ChunkLoader>(
    left: &mut NodeCursor<'a, Loader>,
    right: &mut NodeCursor<'a, Loader>,
    aligned: impl Fn(&NodeCursor<'a, Loader>, &NodeCursor<'a, Loader>) -> bool,
) -> Result<(), GraftProllyTreeError> {
    loop {
        if !left.at_chunk_start() || !right.at_chunk_start() || !aligned(left, right) {
            return Ok(());
        }
        match (left.prev_sibling_digest(), right.prev_sibling_digest()) {
            (Some(left_digest), Some(right_digest)) if left_digest == right_digest => {
                left.retreat_chunk().await?;
                right.retreat_chunk().await?;
            }
            _ => return Ok(()),
        }
    }
}

async fn peek_prev<'a, Loader: ChunkLoader>(
    cursor: &NodeCursor<'a, Loader>,
) -> Result<Option<NodeCursor<'a, Loader>>, GraftProllyTreeError> {
    let mut prev = cursor.clone();
    prev.retreat().await?;
    if prev.is_begin() {
        Ok(None)
    } else {
        Ok(Some(prev))
    }
}

/// A bidirectional, lazily-evaluated iterator over the keys on which two
/// keyed (map or set) trees differ, in ascending key order.
///
/// `next` and `previous` are exact mirrors: a `next` followed by a
/// `previous` yields the same entry and restores the position between them.
pub struct DuallyDiffKeyIterator<'a, Loader: ChunkLoader> {
    left_root: Digest,
    right_root: Digest,
    loader: &'a Loader,
    ctype: ChunkType,
    left: NodeCursor<'a, Loader>,
    right: NodeCursor<'a, Loader>,
}

impl<'a, Loader: ChunkLoader> DuallyDiffKeyIterator<'a, Loader> {
    /// Create an iterator over the differences between two keyed tree roots,
    /// positioned at the head.
    pub async fn new(
        left_root: Digest,
        right_root: Digest,
        loader: &'a Loader,
    ) -> Result<DuallyDiffKeyIterator<'a, Loader>, GraftProllyTreeError> {
        let left = NodeCursor::seek_index(&left_root, 0, loader).await?;
        let right = NodeCursor::seek_index(&right_root, 0, loader).await?;
        let ctype = left.node().ctype();
        if !matches!(ctype, ChunkType::Map | ChunkType::Set) {
            return Err(GraftProllyTreeError::IncorrectTreeAccess(format!(
                "Keyed diff over {:?} chunks",
                ctype
            )));
        }
        if right.node().ctype() != ctype {
            return Err(GraftProllyTreeError::IncorrectTreeAccess(
                "Cannot diff trees of differing types".into(),
            ));
        }
        Ok(DuallyDiffKeyIterator {
            left_root,
            right_root,
            loader,
            ctype,
            left,
            right,
        })
    }

    /// Reposition before the first difference.
    pub async fn head(&mut self) -> Result<(), GraftProllyTreeError> {
        self.left = NodeCursor::seek_index(&self.left_root, 0, self.loader).await?;
        self.right = NodeCursor::seek_index(&self.right_root, 0, self.loader).await?;
        Ok(())
    }

    /// Reposition after the last difference.
    pub async fn end(&mut self) -> Result<(), GraftProllyTreeError> {
        self.left = NodeCursor::seek_index(&self.left_root, u64::MAX, self.loader).await?;
        self.right = NodeCursor::seek_index(&self.right_root, u64::MAX, self.loader).await?;
        Ok(())
    }

    /// The next difference in ascending key order, or `None` past the last.
    pub async fn next(&mut self) -> Result<Option<DiffEntry>, GraftProllyTreeError> {
        loop {
            skip_shared_forward(&mut self.left, &mut self.right, |_, _| true).await?;

            let left_entry = self.left.entry().map(|entry| entry.to_vec());
            let right_entry = self.right.entry().map(|entry| entry.to_vec());
            match (left_entry, right_entry) {
                (None, None) => return Ok(None),
                (Some(entry), None) => {
                    let (key, value) = keyed_parts(self.ctype, &entry);
                    self.left.advance().await?;
                    return Ok(Some(DiffEntry {
                        key,
                        left: Some(value),
                        right: None,
                    }));
                }
                (None, Some(entry)) => {
                    let (key, value) = keyed_parts(self.ctype, &entry);
                    self.right.advance().await?;
                    return Ok(Some(DiffEntry {
                        key,
                        left: None,
                        right: Some(value),
                    }));
                }
                (Some(left_entry), Some(right_entry)) => {
                    if left_entry == right_entry {
                        self.left.advance().await?;
                        self.right.advance().await?;
                        continue;
                    }
                    let (left_key, left_value) = keyed_parts(self.ctype, &left_entry);
                    let (right_key, right_value) = keyed_parts(self.ctype, &right_entry);
                    return match left_key.cmp(&right_key) {
                        std::cmp::Ordering::Less => {
                            self.left.advance().await?;
                            Ok(Some(DiffEntry {
                                key: left_key,
                                left: Some(left_value),
                                right: None,
                            }))
                        }
                        std::cmp::Ordering::Greater => {
                            self.right.advance().await?;
                            Ok(Some(DiffEntry {
                                key: right_key,
                                left: None,
                                right: Some(right_value),
                            }))
                        }
                        std::cmp::Ordering::Equal => {
                            self.left.advance().await?;
                            self.right.advance().await?;
                            Ok(Some(DiffEntry {
                                key: left_key,
                                left: Some(left_value),
                                right: Some(right_value),
                            }))
                        }
                    };
                }
            }
        }
    }

    /// The previous difference in descending key order, or `None` before
    /// the first.
    pub async fn previous(&mut self) -> Result<Option<DiffEntry>, GraftProllyTreeError> {
        loop {
            skip_shared_backward(&mut self.left, &mut self.right, |_, _| true).await?;

            let prev_left = peek_prev(&self.left).await?;
            let prev_right = peek_prev(&self.right).await?;
            match (prev_left, prev_right) {
                (None, None) => return Ok(None),
                (Some(prev), None) => {
                    let (key, value) = {
                        let entry = prev.entry().unwrap_or_default();
                        keyed_parts(self.ctype, entry)
                    };
                    self.left = prev;
                    return Ok(Some(DiffEntry {
                        key,
                        left: Some(value),
                        right: None,
                    }));
                }
                (None, Some(prev)) => {
                    let (key, value) = {
                        let entry = prev.entry().unwrap_or_default();
                        keyed_parts(self.ctype, entry)
                    };
                    self.right = prev;
                    return Ok(Some(DiffEntry {
                        key,
                        left: None,
                        right: Some(value),
                    }));
                }
                (Some(prev_left), Some(prev_right)) => {
                    let left_entry = prev_left.entry().unwrap_or_default().to_vec();
                    let right_entry = prev_right.entry().unwrap_or_default().to_vec();
                    if left_entry == right_entry {
                        self.left = prev_left;
                        self.right = prev_right;
                        continue;
                    }
                    let (left_key, left_value) = keyed_parts(self.ctype, &left_entry);
                    let (right_key, right_value) = keyed_parts(self.ctype, &right_entry);
                    return match left_key.cmp(&right_key) {
                        std::cmp::Ordering::Greater => {
                            self.left = prev_left;
                            Ok(Some(DiffEntry {
                                key: left_key,
                                left: Some(left_value),
                                right: None,
                            }))
                        }
                        std::cmp::Ordering::Less => {
                            self.right = prev_right;
                            Ok(Some(DiffEntry {
                                key: right_key,
                                left: None,
                                right: Some(right_value),
                            }))
                        }
                        std::cmp::Ordering::Equal => {
                            self.left = prev_left;
                            self.right = prev_right;
                            Ok(Some(DiffEntry {
                                key: left_key,
                                left: Some(left_value),
                                right: Some(right_value),
                            }))
                        }
                    };
                }
            }
        }
    }
}

/// A bidirectional iterator over the element positions on which two indexed
/// (list or blob) trees differ, in ascending index order.
pub struct DuallyDiffIndexIterator<'a, Loader: ChunkLoader> {
    left_root: Digest,
    right_root: Digest,
    loader: &'a Loader,
    ctype: ChunkType,
    left: NodeCursor<'a, Loader>,
    right: NodeCursor<'a, Loader>,
}

impl<'a, Loader: ChunkLoader> DuallyDiffIndexIterator<'a, Loader> {
    /// Create an iterator over the positional differences between two
    /// indexed tree roots, positioned at the head.
    pub async fn new(
        left_root: Digest,
        right_root: Digest,
        loader: &'a Loader,
    ) -> Result<DuallyDiffIndexIterator<'a, Loader>, GraftProllyTreeError> {
        let left = NodeCursor::seek_index(&left_root, 0, loader).await?;
        let right = NodeCursor::seek_index(&right_root, 0, loader).await?;
        let ctype = left.node().ctype();
        if !matches!(ctype, ChunkType::List | ChunkType::Blob) {
            return Err(GraftProllyTreeError::IncorrectTreeAccess(format!(
                "Indexed diff over {:?} chunks",
                ctype
            )));
        }
        if right.node().ctype() != ctype {
            return Err(GraftProllyTreeError::IncorrectTreeAccess(
                "Cannot diff trees of differing types".into(),
            ));
        }
        Ok(DuallyDiffIndexIterator {
            left_root,
            right_root,
            loader,
            ctype,
            left,
            right,
        })
    }

    fn element(&self, frame: &[u8]) -> Bytes {
        match self.ctype {
            ChunkType::List => Bytes::copy_from_slice(list_element(frame)),
            _ => Bytes::copy_from_slice(frame),
        }
    }

    /// Reposition before the first difference.
    pub async fn head(&mut self) -> Result<(), GraftProllyTreeError> {
        self.left = NodeCursor::seek_index(&self.left_root, 0, self.loader).await?;
        self.right = NodeCursor::seek_index(&self.right_root, 0, self.loader).await?;
        Ok(())
    }

    /// Reposition after the last difference.
    pub async fn end(&mut self) -> Result<(), GraftProllyTreeError> {
        self.left = NodeCursor::seek_index(&self.left_root, u64::MAX, self.loader).await?;
        self.right = NodeCursor::seek_index(&self.right_root, u64::MAX, self.loader).await?;
        Ok(())
    }

    /// The next differing position in ascending index order.
    pub async fn next(&mut self) -> Result<Option<IndexDiffEntry>, GraftProllyTreeError> {
        loop {
            // Positions must stay aligned for a structural skip to preserve
            // indexed correspondence.
            skip_shared_forward(&mut self.left, &mut self.right, |left, right| {
                left.global_index() == right.global_index()
            })
            .await?;

            let left_entry = self.left.entry().map(|entry| entry.to_vec());
            let right_entry = self.right.entry().map(|entry| entry.to_vec());
            match (left_entry, right_entry) {
                (None, None) => return Ok(None),
                (Some(entry), None) => {
                    let index = self.left.global_index();
                    self.left.advance().await?;
                    return Ok(Some(IndexDiffEntry {
                        index,
                        left: Some(self.element(&entry)),
                        right: None,
                    }));
                }
                (None, Some(entry)) => {
                    let index = self.right.global_index();
                    self.right.advance().await?;
                    return Ok(Some(IndexDiffEntry {
                        index,
                        left: None,
                        right: Some(self.element(&entry)),
                    }));
                }
                (Some(left_entry), Some(right_entry)) => {
                    let index = self.left.global_index();
                    if left_entry == right_entry {
                        self.left.advance().await?;
                        self.right.advance().await?;
                        continue;
                    }
                    self.left.advance().await?;
                    self.right.advance().await?;
                    return Ok(Some(IndexDiffEntry {
                        index,
                        left: Some(self.element(&left_entry)),
                        right: Some(self.element(&right_entry)),
                    }));
                }
            }
        }
    }

    /// The previous differing position in descending index order.
    ///
    /// While both sides still have unconsumed elements their positions move
    /// in lockstep, so the side whose position is greater is the longer
    /// tree's unmatched tail.
    pub async fn previous(&mut self) -> Result<Option<IndexDiffEntry>, GraftProllyTreeError> {
        loop {
            skip_shared_backward(&mut self.left, &mut self.right, |left, right| {
                left.global_index() == right.global_index()
            })
            .await?;

            let left_index = self.left.global_index();
            let right_index = self.right.global_index();

            if left_index > right_index {
                return match peek_prev(&self.left).await? {
                    Some(prev) => {
                        let element = self.element(prev.entry().unwrap_or_default());
                        self.left = prev;
                        Ok(Some(IndexDiffEntry {
                            index: left_index - 1,
                            left: Some(element),
                            right: None,
                        }))
                    }
                    None => Ok(None),
                };
            }
            if right_index > left_index {
                return match peek_prev(&self.right).await? {
                    Some(prev) => {
                        let element = self.element(prev.entry().unwrap_or_default());
                        self.right = prev;
                        Ok(Some(IndexDiffEntry {
                            index: right_index - 1,
                            left: None,
                            right: Some(element),
                        }))
                    }
                    None => Ok(None),
                };
            }

            let prev_left = peek_prev(&self.left).await?;
            let prev_right = peek_prev(&self.right).await?;
            match (prev_left, prev_right) {
                (Some(prev_left), Some(prev_right)) => {
                    let left_entry = prev_left.entry().unwrap_or_default().to_vec();
                    let right_entry = prev_right.entry().unwrap_or_default().to_vec();
                    let equal = left_entry == right_entry;
                    self.left = prev_left;
                    self.right = prev_right;
                    if equal {
                        continue;
                    }
                    return Ok(Some(IndexDiffEntry {
                        index: left_index - 1,
                        left: Some(self.element(&left_entry)),
                        right: Some(self.element(&right_entry)),
                    }));
                }
                _ => return Ok(None),
            }
        }
    }
}

/// A forward iterator over the keys present in both keyed trees with equal
/// values.
pub struct IntersectKeyIterator<'a, Loader: ChunkLoader> {
    ctype: ChunkType,
    left: NodeCursor<'a, Loader>,
    right: NodeCursor<'a, Loader>,
}

impl<'a, Loader: ChunkLoader> IntersectKeyIterator<'a, Loader> {
    /// Create an intersection iterator over two keyed tree roots.
    pub async fn new(
        left_root: Digest,
        right_root: Digest,
        loader: &'a Loader,
    ) -> Result<IntersectKeyIterator<'a, Loader>, GraftProllyTreeError> {
        let left = NodeCursor::seek_index(&left_root, 0, loader).await?;
        let right = NodeCursor::seek_index(&right_root, 0, loader).await?;
        let ctype = left.node().ctype();
        if !matches!(ctype, ChunkType::Map | ChunkType::Set) {
            return Err(GraftProllyTreeError::IncorrectTreeAccess(format!(
                "Keyed intersection over {:?} chunks",
                ctype
            )));
        }
        Ok(IntersectKeyIterator { ctype, left, right })
    }

    /// The next key present on both sides with an equal value, along with
    /// that value.
    pub async fn next(&mut self) -> Result<Option<(Bytes, Bytes)>, GraftProllyTreeError> {
        loop {
            let left_entry = match self.left.entry() {
                Some(entry) => entry.to_vec(),
                None => return Ok(None),
            };
            let right_entry = match self.right.entry() {
                Some(entry) => entry.to_vec(),
                None => return Ok(None),
            };

            if left_entry == right_entry {
                let (key, value) = keyed_parts(self.ctype, &left_entry);
                self.left.advance().await?;
                self.right.advance().await?;
                return Ok(Some((key, value)));
            }

            let (left_key, _) = keyed_parts(self.ctype, &left_entry);
            let (right_key, _) = keyed_parts(self.ctype, &right_entry);
            match left_key.cmp(&right_key) {
                std::cmp::Ordering::Less => {
                    self.left.advance().await?;
                }
                std::cmp::Ordering::Greater => {
                    self.right.advance().await?;
                }
                std::cmp::Ordering::Equal => {
                    self.left.advance().await?;
                    self.right.advance().await?;
                }
            }
        }
    }
}
