use graft_common::{Bytes, Digest};

use crate::UType;

/// The write descriptor a caller hands to [`crate::Worker::put`] and
/// [`crate::Worker::merge`].
///
/// A `Value` either constructs a value from scratch (`vals`/`keys` carry the
/// full contents) or describes a delta against an existing value: a splice
/// for blobs and lists, upserts and removals for maps and sets. When `base`
/// is set it names the data root to edit; otherwise the edit applies to the
/// value of the previous version, or constructs from scratch when there is
/// none.
#[derive(Clone, Debug)]
pub struct Value {
    /// The value type being written.
    pub utype: UType,
    /// An explicit data root to edit from.
    pub base: Option<Digest>,
    /// The splice position, for blob and list edits.
    pub pos: u64,
    /// The number of elements the splice deletes, for blob and list edits.
    pub dels: u64,
    /// Blob bytes, string payload (single entry), list elements, or map
    /// values parallel to `keys`.
    pub vals: Vec<Bytes>,
    /// Map or set keys; for maps, parallel to `vals`.
    pub keys: Vec<Bytes>,
    /// Map or set keys to remove.
    pub del_keys: Vec<Bytes>,
}

impl Value {
    fn empty(utype: UType) -> Self {
        Value {
            utype,
            base: None,
            pos: 0,
            dels: 0,
            vals: Vec::new(),
            keys: Vec::new(),
            del_keys: Vec::new(),
        }
    }

    /// A blob holding `data`.
    pub fn blob(data: impl Into<Bytes>) -> Self {
        Value {
            vals: vec![data.into()],
            ..Value::empty(UType::Blob)
        }
    }

    /// A blob splice: delete `dels` bytes at `pos`, insert `data`.
    pub fn blob_splice(pos: u64, dels: u64, data: impl Into<Bytes>) -> Self {
        Value {
            pos,
            dels,
            vals: vec![data.into()],
            ..Value::empty(UType::Blob)
        }
    }

    /// A string holding `text`.
    pub fn string(text: impl Into<Bytes>) -> Self {
        Value {
            vals: vec![text.into()],
            ..Value::empty(UType::String)
        }
    }

    /// A list holding `elements`.
    pub fn list<Elements>(elements: Elements) -> Self
    where
        Elements: IntoIterator,
        Elements::Item: Into<Bytes>,
    {
        Value {
            vals: elements.into_iter().map(Into::into).collect(),
            ..Value::empty(UType::List)
        }
    }

    /// A list splice: delete `dels` elements at `pos`, insert `elements`.
    pub fn list_splice<Elements>(pos: u64, dels: u64, elements: Elements) -> Self
    where
        Elements: IntoIterator,
        Elements::Item: Into<Bytes>,
    {
        Value {
            pos,
            dels,
            vals: elements.into_iter().map(Into::into).collect(),
            ..Value::empty(UType::List)
        }
    }

    /// A map holding (or upserting) `pairs`.
    pub fn map<Pairs, Key, Val>(pairs: Pairs) -> Self
    where
        Pairs: IntoIterator<Item = (Key, Val)>,
        Key: Into<Bytes>,
        Val: Into<Bytes>,
    {
        let (keys, vals) = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .unzip();
        Value {
            keys,
            vals,
            ..Value::empty(UType::Map)
        }
    }

    /// A map delta removing `keys`.
    pub fn map_remove<Keys>(keys: Keys) -> Self
    where
        Keys: IntoIterator,
        Keys::Item: Into<Bytes>,
    {
        Value {
            del_keys: keys.into_iter().map(Into::into).collect(),
            ..Value::empty(UType::Map)
        }
    }

    /// A set holding (or inserting) `keys`.
    pub fn set<Keys>(keys: Keys) -> Self
    where
        Keys: IntoIterator,
        Keys::Item: Into<Bytes>,
    {
        Value {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Value::empty(UType::Set)
        }
    }

    /// A set delta removing `keys`.
    pub fn set_remove<Keys>(keys: Keys) -> Self
    where
        Keys: IntoIterator,
        Keys::Item: Into<Bytes>,
    {
        Value {
            del_keys: keys.into_iter().map(Into::into).collect(),
            ..Value::empty(UType::Set)
        }
    }

    /// This value, edited from the given data root instead of the previous
    /// version's value.
    pub fn based_on(mut self, root: Digest) -> Self {
        self.base = Some(root);
        self
    }
}
