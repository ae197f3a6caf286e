use graft_common::{Bytes, Digest, DIGEST_SIZE};
use graft_storage::{Chunk, ChunkType};

use crate::RepositoryError;

/// The type tag a commit cell carries for its value.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UType {
    /// A boolean primitive (accepted by the type system, not yet writable)
    Bool = 0,
    /// A numeric primitive (accepted by the type system, not yet writable)
    Num = 1,
    /// A string, stored as a single chunk
    String = 2,
    /// A byte blob, stored as a prolly tree of byte entries
    Blob = 3,
    /// A list of byte elements
    List = 4,
    /// A key/value map ordered by key
    Map = 5,
    /// A set of keys
    Set = 6,
}

impl TryFrom<u8> for UType {
    type Error = RepositoryError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => UType::Bool,
            1 => UType::Num,
            2 => UType::String,
            3 => UType::Blob,
            4 => UType::List,
            5 => UType::Map,
            6 => UType::Set,
            _ => {
                return Err(RepositoryError::InvalidParameter(format!(
                    "Byte does not represent a value type: {:x}",
                    value
                )));
            }
        })
    }
}

// Fixed header offsets of the cell layout. The layout is bit-exact and
// stable; cells written by older processes must remain decodable.
const UTYPE_POS: usize = 0;
const NUM_PRE_DIGEST_POS: usize = 1;
const KEY_LENGTH_POS: usize = 2;
const KEY_OFFSET_POS: usize = 4;
const DATA_LENGTH_POS: usize = 6;
const DATA_OFFSET_POS: usize = 10;
const PRE_DIGEST_POS: usize = 12;

fn key_offset(num_pre_digests: usize) -> usize {
    PRE_DIGEST_POS + num_pre_digests * DIGEST_SIZE
}

/// The commit record of one version of one key.
///
/// Layout:
///
/// ```text
/// | utype:u8 | n_pre:u8 | key_len:u16 | key_off:u16 | data_len:i32 | data_off:i16
/// | pre1[20] | [pre2[20]] | key bytes | data bytes (the data root digest) |
/// ```
///
/// `pre1` is null only for a genesis cell; a merge cell carries both
/// parents. The digest of the cell chunk is the version.
#[derive(Clone, Debug)]
pub struct UCell {
    chunk: Chunk,
}

impl UCell {
    /// Build the chunk form of a new cell.
    pub fn new_chunk(
        utype: UType,
        key: &[u8],
        data_root: &Digest,
        pre1: &Digest,
        pre2: Option<&Digest>,
    ) -> Chunk {
        let num_pre = 1 + usize::from(pre2.is_some());
        let key_off = key_offset(num_pre);
        let data_off = key_off + key.len();

        let mut body = Bytes::new();
        body.push(utype as u8);
        body.push(num_pre as u8);
        body.extend_from_slice(&(key.len() as u16).to_le_bytes());
        body.extend_from_slice(&(key_off as u16).to_le_bytes());
        body.extend_from_slice(&(DIGEST_SIZE as i32).to_le_bytes());
        body.extend_from_slice(&(data_off as i16).to_le_bytes());
        body.extend_from_slice(pre1.as_bytes());
        if let Some(pre2) = pre2 {
            body.extend_from_slice(pre2.as_bytes());
        }
        body.extend_from_slice(key);
        body.extend_from_slice(data_root.as_bytes());
        Chunk::new(ChunkType::Cell, body)
    }

    /// Decode and validate a cell from its chunk.
    pub fn decode(chunk: Chunk) -> Result<Self, RepositoryError> {
        if chunk.ctype() != ChunkType::Cell {
            return Err(RepositoryError::UCellNotExists);
        }
        let body = chunk.body();
        if body.len() < PRE_DIGEST_POS + DIGEST_SIZE {
            return Err(RepositoryError::InvalidSchema);
        }
        UType::try_from(body[UTYPE_POS])?;
        let num_pre = body[NUM_PRE_DIGEST_POS] as usize;
        if !(1..=2).contains(&num_pre) {
            return Err(RepositoryError::InvalidSchema);
        }
        let key_len =
            u16::from_le_bytes([body[KEY_LENGTH_POS], body[KEY_LENGTH_POS + 1]]) as usize;
        let key_off =
            u16::from_le_bytes([body[KEY_OFFSET_POS], body[KEY_OFFSET_POS + 1]]) as usize;
        let data_len = i32::from_le_bytes(
            body[DATA_LENGTH_POS..DATA_LENGTH_POS + 4]
                .try_into()
                .unwrap_or_default(),
        ) as usize;
        let data_off = i16::from_le_bytes([body[DATA_OFFSET_POS], body[DATA_OFFSET_POS + 1]])
            as usize;
        if key_off != key_offset(num_pre)
            || data_off != key_off + key_len
            || data_len != DIGEST_SIZE
            || body.len() != data_off + data_len
        {
            return Err(RepositoryError::InvalidSchema);
        }
        Ok(UCell { chunk })
    }

    /// The value type this cell commits.
    pub fn utype(&self) -> UType {
        UType::try_from(self.chunk.body()[UTYPE_POS]).unwrap_or(UType::Blob)
    }

    /// The user key this cell belongs to.
    pub fn key(&self) -> &[u8] {
        let body = self.chunk.body();
        let key_len =
            u16::from_le_bytes([body[KEY_LENGTH_POS], body[KEY_LENGTH_POS + 1]]) as usize;
        let key_off =
            u16::from_le_bytes([body[KEY_OFFSET_POS], body[KEY_OFFSET_POS + 1]]) as usize;
        &body[key_off..key_off + key_len]
    }

    /// The digest of the value's data root.
    pub fn data_root(&self) -> Digest {
        let body = self.chunk.body();
        let data_off = i16::from_le_bytes([body[DATA_OFFSET_POS], body[DATA_OFFSET_POS + 1]])
            as usize;
        Digest::try_from(&body[data_off..data_off + DIGEST_SIZE]).unwrap_or(Digest::NULL)
    }

    /// The first (or, with `second`, the second) parent version. The second
    /// parent is null unless this is a merge cell; the first is null only
    /// for a genesis cell.
    pub fn pre_digest(&self, second: bool) -> Digest {
        let body = self.chunk.body();
        if second && !self.merged() {
            return Digest::NULL;
        }
        let at = PRE_DIGEST_POS + usize::from(second) * DIGEST_SIZE;
        Digest::try_from(&body[at..at + DIGEST_SIZE]).unwrap_or(Digest::NULL)
    }

    /// Whether this cell merges two parent versions.
    pub fn merged(&self) -> bool {
        self.chunk.body()[NUM_PRE_DIGEST_POS] == 2
    }

    /// The version: the digest of this cell's chunk.
    pub fn digest(&self) -> Digest {
        self.chunk.digest()
    }

    /// The underlying chunk.
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_a_genesis_cell() {
        let data_root = Digest::compute(b"data root");
        let chunk = UCell::new_chunk(UType::Map, b"accounts", &data_root, &Digest::NULL, None);
        let cell = UCell::decode(chunk).unwrap();

        assert_eq!(cell.utype(), UType::Map);
        assert_eq!(cell.key(), b"accounts");
        assert_eq!(cell.data_root(), data_root);
        assert!(cell.pre_digest(false).is_null());
        assert!(cell.pre_digest(true).is_null());
        assert!(!cell.merged());
    }

    #[test]
    fn it_round_trips_a_merge_cell() {
        let data_root = Digest::compute(b"merged data");
        let parent_one = Digest::compute(b"parent one");
        let parent_two = Digest::compute(b"parent two");
        let chunk = UCell::new_chunk(
            UType::List,
            b"queue",
            &data_root,
            &parent_one,
            Some(&parent_two),
        );
        let cell = UCell::decode(chunk).unwrap();

        assert!(cell.merged());
        assert_eq!(cell.pre_digest(false), parent_one);
        assert_eq!(cell.pre_digest(true), parent_two);
    }

    #[test]
    fn it_rejects_non_cell_chunks() {
        let chunk = Chunk::new(ChunkType::Blob, Bytes::from(&b"not a cell"[..]));
        assert!(UCell::decode(chunk).is_err());
    }

    #[test]
    fn versions_differ_when_parents_differ() {
        let data_root = Digest::compute(b"same data");
        let one = UCell::new_chunk(UType::Blob, b"k", &data_root, &Digest::NULL, None);
        let two = UCell::new_chunk(
            UType::Blob,
            b"k",
            &data_root,
            &Digest::compute(b"some parent"),
            None,
        );
        assert_ne!(one.digest(), two.digest());
    }
}
