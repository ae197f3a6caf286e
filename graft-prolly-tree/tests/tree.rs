use std::collections::HashSet;

use anyhow::Result;
use graft_common::Digest;
use graft_prolly_tree::entry::{list_entry, map_entry, map_key, map_value};
use graft_prolly_tree::{
    AdvancedNodeBuilder, Chunker, DuallyDiffIndexIterator, DuallyDiffKeyIterator,
    IntersectKeyIterator, NodeCursor, Segment, SeqNode,
};
use graft_storage::{ChunkLoader, ChunkStore, MemoryChunkStore};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

fn map_segment(pairs: &[(Vec<u8>, Vec<u8>)]) -> Segment {
    Segment::from_frames(pairs.iter().map(|(key, value)| map_entry(key, value)))
}

fn list_segment(elements: &[&[u8]]) -> Segment {
    Segment::from_frames(elements.iter().map(|element| list_entry(element)))
}

async fn build_blob(store: &MemoryChunkStore, data: &[u8]) -> Result<Digest> {
    Ok(AdvancedNodeBuilder::fresh(store, store)
        .insert(0, vec![Segment::fixed(data)])
        .commit(Chunker::Blob)
        .await?)
}

async fn read_blob(root: &Digest, store: &MemoryChunkStore) -> Result<Vec<u8>> {
    let mut cursor = NodeCursor::seek_index(root, 0, store).await?;
    let mut out = Vec::new();
    loop {
        let byte = cursor.entry().map(|entry| entry[0]);
        match byte {
            Some(byte) => {
                out.push(byte);
                cursor.advance().await?;
            }
            None => break,
        }
    }
    Ok(out)
}

async fn read_map(root: &Digest, store: &MemoryChunkStore) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut cursor = NodeCursor::seek_index(root, 0, store).await?;
    let mut out = Vec::new();
    loop {
        let pair = cursor
            .entry()
            .map(|entry| (map_key(entry).to_vec(), map_value(entry).to_vec()));
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

async fn reachable_chunks(root: &Digest, store: &MemoryChunkStore) -> Result<HashSet<Digest>> {
    let mut seen = HashSet::new();
    let mut stack = vec![*root];
    while let Some(digest) = stack.pop() {
        if !seen.insert(digest) {
            continue;
        }
        let chunk = store
            .load(&digest)
            .await?
            .unwrap_or_else(|| panic!("chunk {digest} should be persisted"));
        if let SeqNode::Meta(meta) = SeqNode::decode(chunk)? {
            for entry in meta.entries() {
                stack.push(entry.child);
            }
        }
    }
    Ok(seen)
}

#[tokio::test]
async fn blob_round_trips_and_converges_across_edit_orders() -> Result<()> {
    let data = random_bytes(1, 64 * 1024);

    let store_a = MemoryChunkStore::new();
    let one_shot = build_blob(&store_a, &data).await?;
    assert_eq!(read_blob(&one_shot, &store_a).await?, data);
    assert!(
        store_a.info().await?.chunk_count > 3,
        "64 KiB should split into multiple chunks"
    );

    // Prepend the first half after inserting the second half first.
    let store_b = MemoryChunkStore::new();
    let split = AdvancedNodeBuilder::fresh(&store_b, &store_b)
        .insert(0, vec![Segment::fixed(&data[32 * 1024..])])
        .insert(0, vec![Segment::fixed(&data[..32 * 1024])])
        .commit(Chunker::Blob)
        .await?;
    assert_eq!(split, one_shot);

    // Delete a middle run and reinsert the same bytes.
    let store_c = MemoryChunkStore::new();
    let rebuilt = {
        let base = build_blob(&store_c, &data).await?;
        AdvancedNodeBuilder::from_root(base, &store_c, &store_c)
            .remove(5_000, 1_000)
            .insert(5_000, vec![Segment::fixed(&data[5_000..6_000])])
            .commit(Chunker::Blob)
            .await?
    };
    assert_eq!(rebuilt, one_shot);
    Ok(())
}

#[tokio::test]
async fn spliced_blob_equals_a_from_scratch_build() -> Result<()> {
    let data = random_bytes(2, 64 * 1024);
    let replacement = random_bytes(3, 5 * 1024);

    let mut expected = data.clone();
    expected.splice(10_000..20_000, replacement.iter().copied());

    let store = MemoryChunkStore::new();
    let base = build_blob(&store, &data).await?;
    let edited = AdvancedNodeBuilder::from_root(base, &store, &store)
        .splice(10_000, 10_000, vec![Segment::fixed(&replacement[..])])
        .commit(Chunker::Blob)
        .await?;

    let scratch_store = MemoryChunkStore::new();
    let scratch = build_blob(&scratch_store, &expected).await?;

    assert_eq!(edited, scratch);
    assert_eq!(read_blob(&edited, &store).await?, expected);
    Ok(())
}

fn numbered_pairs(range: std::ops::Range<usize>) -> Vec<(Vec<u8>, Vec<u8>)> {
    range
        .map(|index| {
            (
                format!("key{index:05}").into_bytes(),
                format!("value for entry number {index}").into_bytes(),
            )
        })
        .collect()
}

#[tokio::test]
async fn map_roots_are_history_independent() -> Result<()> {
    let pairs = numbered_pairs(0..800);

    let store_a = MemoryChunkStore::new();
    let one_shot = AdvancedNodeBuilder::fresh(&store_a, &store_a)
        .insert(0, vec![map_segment(&pairs)])
        .commit(Chunker::Map)
        .await?;

    let store_b = MemoryChunkStore::new();
    let batched = AdvancedNodeBuilder::fresh(&store_b, &store_b)
        .insert(0, vec![map_segment(&pairs[..400])])
        .insert(400, vec![map_segment(&pairs[400..])])
        .commit(Chunker::Map)
        .await?;
    assert_eq!(batched, one_shot);

    // Removing an entry and reinserting it lands on the same root.
    let store_c = MemoryChunkStore::new();
    let churned = {
        let base = AdvancedNodeBuilder::fresh(&store_c, &store_c)
            .insert(0, vec![map_segment(&pairs)])
            .commit(Chunker::Map)
            .await?;
        AdvancedNodeBuilder::from_root(base, &store_c, &store_c)
            .remove(137, 1)
            .insert(137, vec![map_segment(&pairs[137..138])])
            .commit(Chunker::Map)
            .await?
    };
    assert_eq!(churned, one_shot);

    assert_eq!(read_map(&one_shot, &store_a).await?, pairs);
    Ok(())
}

#[tokio::test]
async fn transactions_persist_only_reachable_chunks() -> Result<()> {
    let store = MemoryChunkStore::new();
    let part_a = random_bytes(4, 10 * 1024);
    let part_b = random_bytes(5, 5 * 1024);

    let root = AdvancedNodeBuilder::fresh(&store, &store)
        .insert(0, vec![Segment::fixed(&part_a[..])])
        .splice(1, 4, vec![Segment::fixed(&part_b[..])])
        .remove(4, 6)
        .commit(Chunker::Blob)
        .await?;

    let reachable = reachable_chunks(&root, &store).await?;
    let info = store.info().await?;
    assert_eq!(
        info.chunk_count,
        reachable.len() as u64,
        "every stored chunk must be reachable from the final root"
    );
    Ok(())
}

#[tokio::test]
async fn separate_commits_write_more_chunks_than_one_transaction() -> Result<()> {
    let part_a = random_bytes(6, 10 * 1024);
    let part_b = random_bytes(7, 5 * 1024);

    let coalesced = MemoryChunkStore::new();
    let root = AdvancedNodeBuilder::fresh(&coalesced, &coalesced)
        .insert(0, vec![Segment::fixed(&part_a[..])])
        .splice(100, 400, vec![Segment::fixed(&part_b[..])])
        .remove(4_000, 600)
        .commit(Chunker::Blob)
        .await?;

    let stepped = MemoryChunkStore::new();
    let mut stepped_root = AdvancedNodeBuilder::fresh(&stepped, &stepped)
        .insert(0, vec![Segment::fixed(&part_a[..])])
        .commit(Chunker::Blob)
        .await?;
    stepped_root = AdvancedNodeBuilder::from_root(stepped_root, &stepped, &stepped)
        .splice(100, 400, vec![Segment::fixed(&part_b[..])])
        .commit(Chunker::Blob)
        .await?;
    stepped_root = AdvancedNodeBuilder::from_root(stepped_root, &stepped, &stepped)
        .remove(4_000, 600)
        .commit(Chunker::Blob)
        .await?;

    assert_eq!(stepped_root, root);
    assert!(
        coalesced.info().await?.chunk_count < stepped.info().await?.chunk_count,
        "one transaction should write strictly fewer chunks than three"
    );
    Ok(())
}

#[tokio::test]
async fn cursors_walk_forward_and_backward() -> Result<()> {
    let data = random_bytes(8, 64 * 1024);
    let store = MemoryChunkStore::new();
    let root = build_blob(&store, &data).await?;

    let mut cursor = NodeCursor::seek_index(&root, 0, &store).await?;
    let mut forward = 0usize;
    while cursor.entry().is_some() {
        forward += 1;
        cursor.advance().await?;
    }
    assert_eq!(forward, data.len());
    assert!(cursor.is_end());

    let mut backward = 0usize;
    loop {
        cursor.retreat().await?;
        if cursor.is_begin() {
            break;
        }
        backward += 1;
    }
    assert_eq!(backward, data.len());

    let mut sought = NodeCursor::seek_index(&root, 21_000, &store).await?;
    assert_eq!(sought.global_index(), 21_000);
    assert_eq!(sought.entry(), Some(&data[21_000..21_001]));
    sought.advance().await?;
    assert_eq!(sought.global_index(), 21_001);
    Ok(())
}

#[tokio::test]
async fn keyed_diff_yields_the_exact_difference_both_ways() -> Result<()> {
    let store = MemoryChunkStore::new();
    let lhs_pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"k1".to_vec(), b"v1".to_vec()),
        (b"k2".to_vec(), b"v2".to_vec()),
        (b"k3".to_vec(), b"v3".to_vec()),
    ];
    let rhs_pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"k2".to_vec(), b"v2".to_vec()),
        (b"k3".to_vec(), b"v4".to_vec()),
        (b"k4".to_vec(), b"v4".to_vec()),
    ];
    let lhs = AdvancedNodeBuilder::fresh(&store, &store)
        .insert(0, vec![map_segment(&lhs_pairs)])
        .commit(Chunker::Map)
        .await?;
    let rhs = AdvancedNodeBuilder::fresh(&store, &store)
        .insert(0, vec![map_segment(&rhs_pairs)])
        .commit(Chunker::Map)
        .await?;

    let mut diff = DuallyDiffKeyIterator::new(lhs, rhs, &store).await?;
    let mut forward = Vec::new();
    while let Some(entry) = diff.next().await? {
        forward.push(entry);
    }

    let rendered: Vec<_> = forward
        .iter()
        .map(|entry| {
            (
                entry.key.as_slice().to_vec(),
                entry.left.as_ref().map(|value| value.as_slice().to_vec()),
                entry.right.as_ref().map(|value| value.as_slice().to_vec()),
            )
        })
        .collect();
    assert_eq!(
        rendered,
        vec![
            (b"k1".to_vec(), Some(b"v1".to_vec()), None),
            (b"k3".to_vec(), Some(b"v3".to_vec()), Some(b"v4".to_vec())),
            (b"k4".to_vec(), None, Some(b"v4".to_vec())),
        ]
    );

    // Walking back yields the same entries in reverse.
    let mut backward = Vec::new();
    while let Some(entry) = diff.previous().await? {
        backward.push(entry);
    }
    backward.reverse();
    assert_eq!(backward, forward);

    // And the iterator is back at its head.
    let again = diff.next().await?.expect("first entry again");
    assert_eq!(again, forward[0]);
    Ok(())
}

#[tokio::test]
async fn indexed_diff_yields_positional_differences() -> Result<()> {
    let store = MemoryChunkStore::new();
    let lhs = AdvancedNodeBuilder::fresh(&store, &store)
        .insert(0, vec![list_segment(&[b"alpha", b"beta", b"gamma"])])
        .commit(Chunker::List)
        .await?;
    let rhs = AdvancedNodeBuilder::fresh(&store, &store)
        .insert(0, vec![list_segment(&[b"alpha", b"delta", b"gamma", b"omega"])])
        .commit(Chunker::List)
        .await?;

    let mut diff = DuallyDiffIndexIterator::new(lhs, rhs, &store).await?;
    let mut forward = Vec::new();
    while let Some(entry) = diff.next().await? {
        forward.push(entry);
    }

    assert_eq!(forward.len(), 2);
    assert_eq!(forward[0].index, 1);
    assert_eq!(forward[0].left.as_deref(), Some(&b"beta"[..]));
    assert_eq!(forward[0].right.as_deref(), Some(&b"delta"[..]));
    assert_eq!(forward[1].index, 3);
    assert_eq!(forward[1].left, None);
    assert_eq!(forward[1].right.as_deref(), Some(&b"omega"[..]));

    let mut backward = Vec::new();
    while let Some(entry) = diff.previous().await? {
        backward.push(entry);
    }
    backward.reverse();
    assert_eq!(backward, forward);
    Ok(())
}

#[tokio::test]
async fn diff_skips_shared_structure() -> Result<()> {
    let store = MemoryChunkStore::new();
    let data = random_bytes(9, 64 * 1024);
    let mut altered = data.clone();
    altered[30_000] ^= 0xff;

    let lhs = build_blob(&store, &data).await?;
    let rhs = build_blob(&store, &altered).await?;

    let mut diff = DuallyDiffIndexIterator::new(lhs, rhs, &store).await?;
    let mut entries = Vec::new();
    while let Some(entry) = diff.next().await? {
        entries.push(entry);
    }
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].index, 30_000);
    Ok(())
}

#[tokio::test]
async fn intersection_yields_common_equal_entries() -> Result<()> {
    let store = MemoryChunkStore::new();
    let lhs_pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"a".to_vec(), b"1".to_vec()),
        (b"b".to_vec(), b"2".to_vec()),
        (b"c".to_vec(), b"3".to_vec()),
    ];
    let rhs_pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![
        (b"b".to_vec(), b"2".to_vec()),
        (b"c".to_vec(), b"4".to_vec()),
        (b"d".to_vec(), b"5".to_vec()),
    ];
    let lhs = AdvancedNodeBuilder::fresh(&store, &store)
        .insert(0, vec![map_segment(&lhs_pairs)])
        .commit(Chunker::Map)
        .await?;
    let rhs = AdvancedNodeBuilder::fresh(&store, &store)
        .insert(0, vec![map_segment(&rhs_pairs)])
        .commit(Chunker::Map)
        .await?;

    let mut intersect = IntersectKeyIterator::new(lhs, rhs, &store).await?;
    let mut common = Vec::new();
    while let Some((key, value)) = intersect.next().await? {
        common.push((key.as_slice().to_vec(), value.as_slice().to_vec()));
    }
    assert_eq!(common, vec![(b"b".to_vec(), b"2".to_vec())]);
    Ok(())
}

#[tokio::test]
async fn deleting_everything_leaves_the_canonical_empty_tree() -> Result<()> {
    let store = MemoryChunkStore::new();
    let pairs = numbered_pairs(0..3);
    let base = AdvancedNodeBuilder::fresh(&store, &store)
        .insert(0, vec![map_segment(&pairs)])
        .commit(Chunker::Map)
        .await?;
    let emptied = AdvancedNodeBuilder::from_root(base, &store, &store)
        .remove(0, 3)
        .commit(Chunker::Map)
        .await?;

    let fresh = AdvancedNodeBuilder::fresh(&store, &store)
        .commit(Chunker::Map)
        .await?;
    assert_eq!(emptied, fresh);
    assert!(read_map(&emptied, &store).await?.is_empty());
    Ok(())
}
