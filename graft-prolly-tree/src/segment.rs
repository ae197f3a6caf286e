use graft_common::Bytes;

use crate::{entry::validate_frame, GraftProllyTreeError};

/// An ordered run of encoded entries, used both as splice input and as the
/// accumulation buffer a builder chunks from.
///
/// Two shapes exist:
///
/// - **fixed**: every byte is one entry (blob leaves);
/// - **variable**: entries are length-prefixed frames (list, map, set and
///   meta nodes).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    bytes: Bytes,
    /// Entry start offsets for the variable shape; `None` for fixed.
    offsets: Option<Vec<usize>>,
}

impl Segment {
    /// Create a fixed-shape segment over raw bytes (one entry per byte).
    pub fn fixed(bytes: impl Into<Bytes>) -> Self {
        Segment {
            bytes: bytes.into(),
            offsets: None,
        }
    }

    /// Create an empty fixed-shape segment.
    pub fn fixed_empty() -> Self {
        Self::fixed(Bytes::new())
    }

    /// Create an empty variable-shape segment.
    pub fn variable() -> Self {
        Segment {
            bytes: Bytes::new(),
            offsets: Some(Vec::new()),
        }
    }

    /// Create a variable-shape segment from already-encoded frames.
    pub fn from_frames<Frames>(frames: Frames) -> Self
    where
        Frames: IntoIterator,
        Frames::Item: AsRef<[u8]>,
    {
        let mut segment = Self::variable();
        for frame in frames {
            segment.push_frame(frame.as_ref());
        }
        segment
    }

    /// Parse a variable-shape segment from a contiguous run of `count`
    /// frames, validating every prefix.
    pub fn parse_frames(bytes: &[u8], count: usize) -> Result<Self, GraftProllyTreeError> {
        let mut offsets = Vec::with_capacity(count);
        let mut at = 0;
        for _ in 0..count {
            offsets.push(at);
            at += validate_frame(&bytes[at..])?;
        }
        if at != bytes.len() {
            return Err(GraftProllyTreeError::MalformedNode(format!(
                "Segment has {} trailing bytes after {} frames",
                bytes.len() - at,
                count
            )));
        }
        Ok(Segment {
            bytes: Bytes::copy_from_slice(bytes),
            offsets: Some(offsets),
        })
    }

    /// Whether this segment has the fixed (per-byte) shape.
    pub fn is_fixed(&self) -> bool {
        self.offsets.is_none()
    }

    /// Append an encoded frame (variable shape only).
    pub fn push_frame(&mut self, frame: &[u8]) {
        if let Some(offsets) = self.offsets.as_mut() {
            offsets.push(self.bytes.len());
            self.bytes.extend_from_slice(frame);
        } else {
            self.bytes.extend_from_slice(frame);
        }
    }

    /// Append a single byte entry (fixed shape only).
    pub fn push_byte(&mut self, byte: u8) {
        debug_assert!(self.is_fixed());
        self.bytes.push(byte);
    }

    /// Append an entry from another segment.
    pub fn push_entry(&mut self, entry: &[u8]) {
        match self.offsets.as_mut() {
            Some(offsets) => {
                offsets.push(self.bytes.len());
                self.bytes.extend_from_slice(entry);
            }
            None => self.bytes.extend_from_slice(entry),
        }
    }

    /// The number of entries held.
    pub fn num_entries(&self) -> usize {
        match &self.offsets {
            Some(offsets) => offsets.len(),
            None => self.bytes.len(),
        }
    }

    /// Whether no entries are held.
    pub fn is_empty(&self) -> bool {
        self.num_entries() == 0
    }

    /// The bytes of the i-th entry.
    pub fn entry(&self, index: usize) -> &[u8] {
        match &self.offsets {
            Some(offsets) => {
                let start = offsets[index];
                let end = offsets
                    .get(index + 1)
                    .copied()
                    .unwrap_or_else(|| self.bytes.len());
                &self.bytes[start..end]
            }
            None => &self.bytes[index..index + 1],
        }
    }

    /// The total byte length across all entries.
    pub fn total_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// All entry bytes, contiguously.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Drop every entry, keeping the shape and allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
        if let Some(offsets) = self.offsets.as_mut() {
            offsets.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{list_entry, map_entry};

    #[test]
    fn it_indexes_fixed_entries_per_byte() {
        let segment = Segment::fixed(&b"abc"[..]);
        assert_eq!(segment.num_entries(), 3);
        assert_eq!(segment.entry(1), b"b");
        assert_eq!(segment.total_bytes(), 3);
    }

    #[test]
    fn it_indexes_variable_entries_by_frame() {
        let mut segment = Segment::variable();
        segment.push_frame(&list_entry(b"first"));
        segment.push_frame(&list_entry(b"second, longer"));
        assert_eq!(segment.num_entries(), 2);
        assert_eq!(crate::entry::list_element(segment.entry(0)), b"first");
        assert_eq!(
            crate::entry::list_element(segment.entry(1)),
            b"second, longer"
        );
    }

    #[test]
    fn it_parses_contiguous_frames_back() {
        let source = Segment::from_frames([map_entry(b"a", b"1"), map_entry(b"b", b"2")]);
        let parsed = Segment::parse_frames(source.as_bytes(), 2).unwrap();
        assert_eq!(parsed, source);
        assert!(Segment::parse_frames(source.as_bytes(), 3).is_err());
    }
}
