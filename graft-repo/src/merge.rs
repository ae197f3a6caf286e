use std::collections::{BTreeMap, HashSet, VecDeque};

use graft_common::{Bytes, Digest};
use graft_prolly_tree::{ChunkCacher, Chunker, DuallyDiffKeyIterator, NodeBuilder};
use graft_storage::ChunkStore;

use crate::{
    types::{map_set, map_del, set_insert, set_remove},
    RepositoryError, UCell, UList, UType,
};

/// Load and decode the cell stored under `version`.
pub(crate) async fn load_cell<Store: ChunkStore>(
    store: &Store,
    version: &Digest,
) -> Result<UCell, RepositoryError> {
    if version.is_null() {
        return Err(RepositoryError::UCellNotExists);
    }
    let chunk = store
        .get(version)
        .await?
        .ok_or(RepositoryError::UCellNotExists)?;
    UCell::decode(chunk)
}

/// The least common ancestor of two versions, found by breadth-first walks
/// from both tips through the parent links of the cell DAG. The first
/// version reached from both sides is the base.
pub(crate) async fn find_lca<Store: ChunkStore>(
    store: &Store,
    left: &Digest,
    right: &Digest,
) -> Result<Option<Digest>, RepositoryError> {
    let mut seen_left: HashSet<Digest> = HashSet::from([*left]);
    let mut seen_right: HashSet<Digest> = HashSet::from([*right]);
    let mut queue_left: VecDeque<Digest> = VecDeque::from([*left]);
    let mut queue_right: VecDeque<Digest> = VecDeque::from([*right]);

    while !queue_left.is_empty() || !queue_right.is_empty() {
        if let Some(version) = queue_left.pop_front() {
            if seen_right.contains(&version) {
                return Ok(Some(version));
            }
            let cell = load_cell(store, &version).await?;
            for parent in [cell.pre_digest(false), cell.pre_digest(true)] {
                if !parent.is_null() && seen_left.insert(parent) {
                    queue_left.push_back(parent);
                }
            }
        }
        if let Some(version) = queue_right.pop_front() {
            if seen_left.contains(&version) {
                return Ok(Some(version));
            }
            let cell = load_cell(store, &version).await?;
            for parent in [cell.pre_digest(false), cell.pre_digest(true)] {
                if !parent.is_null() && seen_right.insert(parent) {
                    queue_right.push_back(parent);
                }
            }
        }
    }
    Ok(None)
}

/// One side's edit to a key, relative to the merge base.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Change {
    Put(Bytes),
    Del,
}

/// The per-key changes from `base` to `side` for a keyed (map or set) tree.
async fn keyed_changes<Store: ChunkStore>(
    store: &Store,
    base: Digest,
    side: Digest,
) -> Result<BTreeMap<Bytes, Change>, RepositoryError> {
    let mut iter = DuallyDiffKeyIterator::new(base, side, store).await?;
    let mut changes = BTreeMap::new();
    while let Some(entry) = iter.next().await? {
        let change = match entry.right {
            Some(value) => Change::Put(value),
            None => Change::Del,
        };
        changes.insert(entry.key, change);
    }
    Ok(changes)
}

/// Merge the per-key change sets of both sides. `None` marks a conflict:
/// the same key edited differently on each side.
fn join_changes(
    ours: BTreeMap<Bytes, Change>,
    mut theirs: BTreeMap<Bytes, Change>,
) -> Option<BTreeMap<Bytes, Change>> {
    let mut joined = BTreeMap::new();
    for (key, ours_change) in ours {
        match theirs.remove(&key) {
            None => {
                joined.insert(key, ours_change);
            }
            Some(theirs_change) if theirs_change == ours_change => {
                joined.insert(key, ours_change);
            }
            Some(_) => return None,
        }
    }
    joined.extend(theirs);
    Some(joined)
}

async fn merge_keyed<Store: ChunkStore + Clone>(
    store: &Store,
    utype: UType,
    base: Digest,
    ours: Digest,
    theirs: Digest,
) -> Result<Option<Digest>, RepositoryError> {
    let ours_changes = keyed_changes(store, base, ours).await?;
    let theirs_changes = keyed_changes(store, base, theirs).await?;
    let Some(joined) = join_changes(ours_changes, theirs_changes) else {
        return Ok(None);
    };

    let cacher = ChunkCacher::new(store, store);
    let mut root = base;
    for (key, change) in joined {
        root = match (utype, change) {
            (UType::Map, Change::Put(value)) => map_set(&cacher, root, &key, &value).await?,
            (UType::Map, Change::Del) => map_del(&cacher, root, &key).await?,
            (UType::Set, Change::Put(_)) => set_insert(&cacher, root, &key).await?,
            (UType::Set, Change::Del) => set_remove(&cacher, root, &key).await?,
            _ => return Err(RepositoryError::TypeUnsupported),
        };
    }
    cacher.dump_reachable(&root).await?;
    Ok(Some(root))
}

/// A side's list edit normalized to one splice against the base: the start
/// position, the number of deleted base elements, and the inserted run.
fn to_splice(base: &[Bytes], side: &[Bytes]) -> (usize, usize, Vec<Bytes>) {
    let prefix = base
        .iter()
        .zip(side.iter())
        .take_while(|(ours, theirs)| ours == theirs)
        .count();
    let mut suffix = 0;
    while suffix < base.len() - prefix
        && suffix < side.len() - prefix
        && base[base.len() - 1 - suffix] == side[side.len() - 1 - suffix]
    {
        suffix += 1;
    }
    (
        prefix,
        base.len() - prefix - suffix,
        side[prefix..side.len() - suffix].to_vec(),
    )
}

async fn merge_list<Store: ChunkStore + Clone>(
    store: &Store,
    base: Digest,
    ours: Digest,
    theirs: Digest,
) -> Result<Option<Digest>, RepositoryError> {
    let base_elements = UList::load(base, store.clone()).await?.elements().await?;
    let ours_elements = UList::load(ours, store.clone()).await?.elements().await?;
    let theirs_elements = UList::load(theirs, store.clone()).await?.elements().await?;

    let (ours_start, ours_dels, ours_ins) = to_splice(&base_elements, &ours_elements);
    let (theirs_start, theirs_dels, theirs_ins) = to_splice(&base_elements, &theirs_elements);

    // Both splices must address disjoint base ranges; two insertions at the
    // same point have no canonical order.
    let disjoint = ours_start + ours_dels <= theirs_start || theirs_start + theirs_dels <= ours_start;
    if !disjoint || ours_start == theirs_start {
        return Ok(None);
    }

    let (first, second) = if ours_start < theirs_start {
        (
            (ours_start, ours_dels, ours_ins),
            (theirs_start, theirs_dels, theirs_ins),
        )
    } else {
        (
            (theirs_start, theirs_dels, theirs_ins),
            (ours_start, ours_dels, ours_ins),
        )
    };

    let mut merged = base_elements;
    // Apply the higher splice first so the lower one's indices stay valid.
    merged.splice(second.0..second.0 + second.1, second.2);
    merged.splice(first.0..first.0 + first.1, first.2);

    Ok(Some(UList::create(store, &merged).await?))
}

/// Attempt a structural three-way merge of the values committed by `base`,
/// `ours` and `theirs`. `Ok(None)` marks an unresolvable conflict that
/// needs an explicit value.
pub(crate) async fn merge_data<Store: ChunkStore + Clone>(
    store: &Store,
    base: &UCell,
    ours: &UCell,
    theirs: &UCell,
) -> Result<Option<Digest>, RepositoryError> {
    let base_root = base.data_root();
    let ours_root = ours.data_root();
    let theirs_root = theirs.data_root();

    // Digest equality is value equality; these shortcuts cover every merge
    // where at most one side actually changed the data.
    if ours_root == theirs_root {
        return Ok(Some(ours_root));
    }
    if ours_root == base_root {
        return Ok(Some(theirs_root));
    }
    if theirs_root == base_root {
        return Ok(Some(ours_root));
    }

    match ours.utype() {
        UType::Map | UType::Set => {
            merge_keyed(store, ours.utype(), base_root, ours_root, theirs_root).await
        }
        UType::List => merge_list(store, base_root, ours_root, theirs_root).await,
        // Blobs and strings have no sub-value merge; both sides changed, so
        // only an explicit value resolves them.
        UType::Blob | UType::String => Ok(None),
        UType::Bool | UType::Num => Err(RepositoryError::TypeUnsupported),
    }
}

/// Build the canonical empty tree of the given shape.
pub(crate) async fn empty_root<Store: ChunkStore + Clone>(
    store: &Store,
    chunker: Chunker,
) -> Result<Digest, RepositoryError> {
    Ok(NodeBuilder::fresh(store, store, chunker).commit().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(text: &str) -> Bytes {
        Bytes::from(text.as_bytes())
    }

    #[test]
    fn splice_normalization_finds_the_changed_window() {
        let base = vec![bytes("a"), bytes("b"), bytes("c"), bytes("d")];
        let side = vec![bytes("a"), bytes("x"), bytes("y"), bytes("c"), bytes("d")];
        let (start, dels, ins) = to_splice(&base, &side);
        assert_eq!(start, 1);
        assert_eq!(dels, 1);
        assert_eq!(ins, vec![bytes("x"), bytes("y")]);
    }

    #[test]
    fn identical_sides_normalize_to_an_empty_splice() {
        let base = vec![bytes("a"), bytes("b")];
        let (start, dels, ins) = to_splice(&base, &base.clone());
        assert_eq!((start, dels), (2, 0));
        assert!(ins.is_empty());
    }

    #[test]
    fn join_accepts_disjoint_and_identical_changes() {
        let ours = BTreeMap::from([
            (bytes("a"), Change::Put(bytes("1"))),
            (bytes("shared"), Change::Del),
        ]);
        let theirs = BTreeMap::from([
            (bytes("b"), Change::Put(bytes("2"))),
            (bytes("shared"), Change::Del),
        ]);
        let joined = join_changes(ours, theirs).expect("disjoint edits merge");
        assert_eq!(joined.len(), 3);
    }

    #[test]
    fn join_rejects_contradicting_changes() {
        let ours = BTreeMap::from([(bytes("k"), Change::Put(bytes("ours")))]);
        let theirs = BTreeMap::from([(bytes("k"), Change::Put(bytes("theirs")))]);
        assert!(join_changes(ours, theirs).is_none());
    }
}
