//! Key ranges for scans.

use std::ops::Bound;

use bytes::Bytes;

/// Range bounds for a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Start bound.
    pub start: Bound<Bytes>,
    /// End bound.
    pub end: Bound<Bytes>,
}

impl KeyRange {
    /// Creates a range covering all keys.
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Creates a range from start (inclusive) to end (exclusive).
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Excluded(end.into()),
        }
    }

    /// Creates a range from start (inclusive) to end (inclusive).
    pub fn inclusive(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Included(end.into()),
        }
    }

    /// Creates a range starting from a key (inclusive).
    pub fn from(start: impl Into<Bytes>) -> Self {
        Self {
            start: Bound::Included(start.into()),
            end: Bound::Unbounded,
        }
    }

    /// Creates a range up to a key (exclusive).
    pub fn until(end: impl Into<Bytes>) -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Excluded(end.into()),
        }
    }

    /// Creates a range of all keys starting with `prefix`.
    pub fn prefix(prefix: impl Into<Bytes>) -> Self {
        let prefix = prefix.into();
        let end = match prefix_successor(&prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Self {
            start: Bound::Included(prefix),
            end,
        }
    }

    /// Checks if a key is within the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        !self.is_before_start(key) && !self.is_after_end(key)
    }

    /// Checks if a key is before the start of the range.
    pub fn is_before_start(&self, key: &[u8]) -> bool {
        match &self.start {
            Bound::Included(start) => key < start.as_ref(),
            Bound::Excluded(start) => key <= start.as_ref(),
            Bound::Unbounded => false,
        }
    }

    /// Checks if a key is after the end of the range.
    pub fn is_after_end(&self, key: &[u8]) -> bool {
        match &self.end {
            Bound::Included(end) => key > end.as_ref(),
            Bound::Excluded(end) => key >= end.as_ref(),
            Bound::Unbounded => false,
        }
    }

    /// Returns the start key for seeking, if bounded.
    pub fn seek_key(&self) -> Option<&[u8]> {
        match &self.start {
            Bound::Included(k) | Bound::Excluded(k) => Some(k),
            Bound::Unbounded => None,
        }
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

/// Smallest key greater than every key with this prefix.
fn prefix_successor(prefix: &[u8]) -> Option<Bytes> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(Bytes::from(end));
        }
    }
    None
}
