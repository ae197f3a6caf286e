//! The content digest used to address every chunk in the store.

use data_encoding::BASE32;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The size of a [`Digest`] in bytes.
pub const DIGEST_SIZE: usize = 20;

/// The length of the base-32 text form of a [`Digest`].
pub const DIGEST_BASE32_LEN: usize = 32;

/// A 20-byte content digest (truncated BLAKE3).
///
/// Two chunks with identical bytes have identical digests; the mapping is
/// assumed collision-free within this design. The all-zero digest is reserved
/// as [`Digest::NULL`] and never addresses a stored chunk.
///
/// ```rust
/// use graft_common::Digest;
///
/// let digest = Digest::compute(b"hello world");
/// assert_eq!(digest.to_base32().len(), 32);
/// assert_eq!(Digest::parse_base32(&digest.to_base32()).unwrap(), digest);
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Digest([u8; DIGEST_SIZE]);

/// An error produced when constructing a [`Digest`] from external input.
#[derive(thiserror::Error, Debug)]
pub enum DigestError {
    /// The input did not have the expected length.
    #[error("Invalid digest length: {0}")]
    InvalidLength(usize),

    /// The input was not valid base-32 text.
    #[error("Invalid base-32 digest: {0}")]
    InvalidEncoding(String),
}

impl Digest {
    /// The designated null digest (all zero bytes).
    pub const NULL: Digest = Digest([0u8; DIGEST_SIZE]);

    /// Compute the digest of the given bytes: BLAKE3, truncated to 20 bytes.
    pub fn compute(bytes: &[u8]) -> Self {
        Self::compute_parts(&[bytes])
    }

    /// Compute the digest of the concatenation of `parts` without copying
    /// them into one buffer first.
    pub fn compute_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        let hash = hasher.finalize();
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&hash.as_bytes()[..DIGEST_SIZE]);
        Self(digest)
    }

    /// Whether this is the null digest.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    /// The digest as a byte slice.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Render the 32-character base-32 text form.
    pub fn to_base32(&self) -> String {
        BASE32.encode(&self.0)
    }

    /// Parse a digest from its 32-character base-32 text form.
    pub fn parse_base32(text: &str) -> Result<Self, DigestError> {
        if text.len() != DIGEST_BASE32_LEN {
            return Err(DigestError::InvalidLength(text.len()));
        }
        let bytes = BASE32
            .decode(text.as_bytes())
            .map_err(|error| DigestError::InvalidEncoding(format!("{error}")))?;
        Self::try_from(bytes.as_slice())
    }
}

impl From<[u8; DIGEST_SIZE]> for Digest {
    fn from(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = DigestError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; DIGEST_SIZE] = bytes
            .try_into()
            .map_err(|_| DigestError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.to_base32())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DigestVisitor;

        impl<'de> serde::de::Visitor<'de> for DigestVisitor {
            type Value = Digest;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a 20-byte digest")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Digest::try_from(v).map_err(|error| E::custom(format!("{error}")))
            }
        }

        deserializer.deserialize_bytes(DigestVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_computes_a_stable_digest() {
        let one = Digest::compute(b"graft");
        let two = Digest::compute(b"graft");
        assert_eq!(one, two);
        assert_ne!(one, Digest::compute(b"graff"));
    }

    #[test]
    fn it_renders_thirty_two_base32_characters() {
        let digest = Digest::compute(b"some chunk body");
        let text = digest.to_base32();
        assert_eq!(text.len(), DIGEST_BASE32_LEN);
        assert_eq!(Digest::parse_base32(&text).unwrap(), digest);
    }

    #[test]
    fn it_rejects_malformed_text() {
        assert!(Digest::parse_base32("too short").is_err());
        assert!(Digest::parse_base32(&"!".repeat(DIGEST_BASE32_LEN)).is_err());
    }

    #[test]
    fn it_treats_all_zeroes_as_null() {
        assert!(Digest::NULL.is_null());
        assert!(!Digest::compute(b"").is_null());
    }
}
