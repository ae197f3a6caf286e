use graft_common::Bytes;

/// The key that totally orders sibling entries within a tree level.
///
/// For maps and sets this is the entry key itself, compared
/// lexicographically. For lists and blobs it is an element count encoded
/// big-endian, so that the same lexicographic comparison is numeric
/// comparison and one ordering rule serves every node type.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderedKey(Bytes);

impl OrderedKey {
    /// An ordered key over raw key bytes (map and set entries).
    pub fn by_value(bytes: impl Into<Bytes>) -> Self {
        OrderedKey(bytes.into())
    }

    /// An ordered key over an element count (list and blob subtrees): the
    /// 1-based index of the last element within its subtree.
    pub fn by_index(count: u64) -> Self {
        OrderedKey(Bytes::from(count.to_be_bytes()))
    }

    /// The raw comparable bytes of this key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Reinterpret the key as an element count, when it has the by-index
    /// shape.
    pub fn to_index(&self) -> Option<u64> {
        let array: [u8; 8] = self.0.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(array))
    }

    /// Consume the key, yielding its raw bytes.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for OrderedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_orders_value_keys_lexicographically() {
        let alpha = OrderedKey::by_value(&b"alpha"[..]);
        let beta = OrderedKey::by_value(&b"beta"[..]);
        assert!(alpha < beta);
    }

    #[test]
    fn it_orders_index_keys_numerically() {
        assert!(OrderedKey::by_index(9) < OrderedKey::by_index(10));
        assert!(OrderedKey::by_index(255) < OrderedKey::by_index(256));
        assert_eq!(OrderedKey::by_index(77).to_index(), Some(77));
    }
}
