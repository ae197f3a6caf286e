use graft_common::{Bytes, Digest};

use crate::GraftStorageError;

/// The number of bytes preceding a chunk body in its encoded form: a one-byte
/// type tag and a four-byte total length.
pub const CHUNK_HEADER_SIZE: usize = 5;

/// The kinds of chunks that occur in the store.
///
/// Leaf and meta variants carry tree node payloads; [`ChunkType::Cell`]
/// carries a commit record.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChunkType {
    /// An internal tree node holding meta entries for its children
    Meta = 0,
    /// A blob leaf; each body byte is one element
    Blob = 1,
    /// A string node; a single chunk, never part of a larger tree
    String = 2,
    /// A list leaf of length-prefixed elements
    List = 3,
    /// A map leaf of length-prefixed key/value entries
    Map = 4,
    /// A set leaf of length-prefixed keys
    Set = 5,
    /// A commit cell
    Cell = 6,
}

impl From<ChunkType> for u8 {
    fn from(value: ChunkType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for ChunkType {
    type Error = GraftStorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ChunkType::Meta,
            1 => ChunkType::Blob,
            2 => ChunkType::String,
            3 => ChunkType::List,
            4 => ChunkType::Map,
            5 => ChunkType::Set,
            6 => ChunkType::Cell,
            _ => {
                return Err(GraftStorageError::DecodeFailed(format!(
                    "Byte does not represent a chunk type: {:x}",
                    value
                )));
            }
        })
    }
}

/// An immutable tagged byte buffer, addressed by the digest of
/// `type ‖ body`.
///
/// The encoded (stored) form is `type:u8 | total_length:u32 LE | body`, where
/// `total_length` covers the header and the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    ctype: ChunkType,
    body: Bytes,
}

impl Chunk {
    /// Create a chunk from a type tag and body bytes.
    pub fn new(ctype: ChunkType, body: Bytes) -> Self {
        Chunk { ctype, body }
    }

    /// The type tag of this chunk.
    pub fn ctype(&self) -> ChunkType {
        self.ctype
    }

    /// The body bytes of this chunk.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The full encoded length of this chunk: header plus body.
    pub fn total_length(&self) -> u32 {
        (CHUNK_HEADER_SIZE + self.body.len()) as u32
    }

    /// The content digest of this chunk, computed over `type ‖ body`.
    pub fn digest(&self) -> Digest {
        Digest::compute_parts(&[&[self.ctype as u8], &self.body])
    }

    /// Serialize to the stored byte form.
    pub fn encode(&self) -> Bytes {
        let mut encoded = Bytes::new();
        encoded.push(self.ctype as u8);
        encoded.extend_from_slice(&self.total_length().to_le_bytes());
        encoded.extend_from_slice(&self.body);
        encoded
    }

    /// Deserialize from the stored byte form.
    pub fn decode(bytes: &[u8]) -> Result<Self, GraftStorageError> {
        if bytes.len() < CHUNK_HEADER_SIZE {
            return Err(GraftStorageError::DecodeFailed(format!(
                "Chunk shorter than its header: {} bytes",
                bytes.len()
            )));
        }
        let ctype = ChunkType::try_from(bytes[0])?;
        let total_length = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        if total_length != bytes.len() {
            return Err(GraftStorageError::DecodeFailed(format!(
                "Chunk length field ({}) disagrees with payload ({})",
                total_length,
                bytes.len()
            )));
        }
        Ok(Chunk {
            ctype,
            body: Bytes::copy_from_slice(&bytes[CHUNK_HEADER_SIZE..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_the_encoded_form() {
        let chunk = Chunk::new(ChunkType::Map, Bytes::from(&b"entry payload"[..]));
        let encoded = chunk.encode();
        let decoded = Chunk::decode(&encoded).unwrap();
        assert_eq!(decoded, chunk);
        assert_eq!(decoded.digest(), chunk.digest());
    }

    #[test]
    fn it_digests_over_type_and_body() {
        let body = Bytes::from(&b"same body"[..]);
        let blob = Chunk::new(ChunkType::Blob, body.clone());
        let list = Chunk::new(ChunkType::List, body);
        assert_ne!(blob.digest(), list.digest());
    }

    #[test]
    fn it_rejects_inconsistent_lengths() {
        let mut encoded = Chunk::new(ChunkType::Set, Bytes::from(&b"abc"[..])).encode();
        encoded.push(0);
        assert!(Chunk::decode(&encoded).is_err());
    }

    #[test]
    fn it_rejects_unknown_type_tags() {
        let mut encoded = Chunk::new(ChunkType::Set, Bytes::from(&b"abc"[..]))
            .encode()
            .into_vec();
        encoded[0] = 0x7f;
        assert!(Chunk::decode(&encoded).is_err());
    }
}
