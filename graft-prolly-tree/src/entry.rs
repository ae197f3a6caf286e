//! Wire form of variable-length entries.
//!
//! Every variable-entry node type (list, map, set, meta) stores its entries
//! as frames: `content_len:u32 LE | content`. One scanner serves all of
//! them; only the interpretation of the content differs per type:
//!
//! - list: the element bytes
//! - map: `key_len:u32 LE | key | value`
//! - set: the key bytes
//! - meta: `num_leaves:u64 LE | num_bytes:u64 LE | child_digest | key`
//!
//! The rolling hasher consumes whole frames, never node headers, so chunk
//! boundaries depend only on entry content.

use graft_common::{Bytes, Digest, DIGEST_SIZE};

use crate::{GraftProllyTreeError, OrderedKey};

/// The number of bytes in a frame prefix.
pub const FRAME_PREFIX_SIZE: usize = 4;

const META_CONTENT_FIXED: usize = 8 + 8 + DIGEST_SIZE;

fn frame(content_parts: &[&[u8]]) -> Bytes {
    let content_len: usize = content_parts.iter().map(|part| part.len()).sum();
    let mut bytes = Bytes::new();
    bytes.extend_from_slice(&(content_len as u32).to_le_bytes());
    for part in content_parts {
        bytes.extend_from_slice(part);
    }
    bytes
}

/// The content of a frame, without its length prefix.
pub fn frame_content(frame: &[u8]) -> &[u8] {
    &frame[FRAME_PREFIX_SIZE..]
}

/// Encode a list element as a frame.
pub fn list_entry(element: &[u8]) -> Bytes {
    frame(&[element])
}

/// The element bytes of a list frame.
pub fn list_element(frame: &[u8]) -> &[u8] {
    frame_content(frame)
}

/// Encode a map key/value pair as a frame.
pub fn map_entry(key: &[u8], value: &[u8]) -> Bytes {
    frame(&[&(key.len() as u32).to_le_bytes(), key, value])
}

/// The key bytes of a map frame.
pub fn map_key(frame: &[u8]) -> &[u8] {
    let content = frame_content(frame);
    let key_len = u32::from_le_bytes([content[0], content[1], content[2], content[3]]) as usize;
    &content[4..4 + key_len]
}

/// The value bytes of a map frame.
pub fn map_value(frame: &[u8]) -> &[u8] {
    let content = frame_content(frame);
    let key_len = u32::from_le_bytes([content[0], content[1], content[2], content[3]]) as usize;
    &content[4 + key_len..]
}

/// Encode a set key as a frame.
pub fn set_entry(key: &[u8]) -> Bytes {
    frame(&[key])
}

/// The key bytes of a set frame.
pub fn set_key(frame: &[u8]) -> &[u8] {
    frame_content(frame)
}

/// The record a meta node stores per child chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaEntry {
    /// The number of leaf elements in the child's subtree.
    pub num_leaves: u64,
    /// The number of encoded leaf entry bytes in the child's subtree.
    pub num_bytes: u64,
    /// The digest addressing the child chunk.
    pub child: Digest,
    /// The greatest [`OrderedKey`] in the child's subtree.
    pub key: OrderedKey,
}

impl MetaEntry {
    /// Encode this meta entry as a frame.
    pub fn encode(&self) -> Bytes {
        frame(&[
            &self.num_leaves.to_le_bytes(),
            &self.num_bytes.to_le_bytes(),
            self.child.as_bytes(),
            self.key.as_bytes(),
        ])
    }

    /// Decode a meta entry from a frame.
    pub fn decode(frame: &[u8]) -> Result<Self, GraftProllyTreeError> {
        let content = frame_content(frame);
        if content.len() < META_CONTENT_FIXED {
            return Err(GraftProllyTreeError::MalformedNode(format!(
                "Meta entry content too short: {} bytes",
                content.len()
            )));
        }
        let num_leaves = u64::from_le_bytes(content[0..8].try_into().unwrap_or_default());
        let num_bytes = u64::from_le_bytes(content[8..16].try_into().unwrap_or_default());
        let child = Digest::try_from(&content[16..16 + DIGEST_SIZE])
            .map_err(|error| GraftProllyTreeError::MalformedNode(format!("{error}")))?;
        let key = OrderedKey::by_value(&content[META_CONTENT_FIXED..]);
        Ok(MetaEntry {
            num_leaves,
            num_bytes,
            child,
            key,
        })
    }
}

/// Validate a frame of the given expected minimum content, returning the full
/// frame length (prefix plus content) on success.
pub(crate) fn validate_frame(bytes: &[u8]) -> Result<usize, GraftProllyTreeError> {
    if bytes.len() < FRAME_PREFIX_SIZE {
        return Err(GraftProllyTreeError::MalformedNode(format!(
            "Frame prefix truncated: {} bytes",
            bytes.len()
        )));
    }
    let content_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let frame_len = FRAME_PREFIX_SIZE + content_len;
    if bytes.len() < frame_len {
        return Err(GraftProllyTreeError::MalformedNode(format!(
            "Frame content truncated: want {} bytes, have {}",
            frame_len,
            bytes.len()
        )));
    }
    Ok(frame_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_map_entries() {
        let encoded = map_entry(b"name", b"value with spaces");
        assert_eq!(map_key(&encoded), b"name");
        assert_eq!(map_value(&encoded), b"value with spaces");
    }

    #[test]
    fn it_allows_empty_map_values() {
        let encoded = map_entry(b"k", b"");
        assert_eq!(map_key(&encoded), b"k");
        assert_eq!(map_value(&encoded), b"");
    }

    #[test]
    fn it_round_trips_meta_entries() {
        let entry = MetaEntry {
            num_leaves: 12,
            num_bytes: 340,
            child: Digest::compute(b"child"),
            key: OrderedKey::by_value(&b"zebra"[..]),
        };
        let encoded = entry.encode();
        assert_eq!(MetaEntry::decode(&encoded).unwrap(), entry);
    }

    #[test]
    fn it_round_trips_index_meta_keys() {
        let entry = MetaEntry {
            num_leaves: 4096,
            num_bytes: 4096,
            child: Digest::compute(b"leaf"),
            key: OrderedKey::by_index(4096),
        };
        let decoded = MetaEntry::decode(&entry.encode()).unwrap();
        assert_eq!(decoded.key.to_index(), Some(4096));
    }
}
