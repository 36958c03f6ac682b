//! Key ranges for directional scans.

use std::ops::{Bound, RangeBounds};

use bytes::Bytes;

/// Returns the first byte string that sorts after every key beginning with
/// `prefix`, or `None` when no such string exists (empty or all-`0xFF`
/// prefixes).
///
/// `b"ab"` → `b"ac"`, `b"a\xFF"` → `b"b"`.
pub fn prefix_successor(prefix: &[u8]) -> Option<Bytes> {
    let last = prefix.iter().rposition(|&b| b != 0xFF)?;
    let mut successor = prefix[..=last].to_vec();
    successor[last] += 1;
    Some(Bytes::from(successor))
}

/// A contiguous slice of the keyspace handed to a storage scan.
///
/// Scans walk the range in either direction; the constructors cover the
/// shapes keyspace queries need.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    /// The whole keyspace.
    pub fn unbounded() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// `[key, +inf)`: an ascending scan resuming at `key`.
    pub fn starting_at(key: Bytes) -> Self {
        Self {
            start: Bound::Included(key),
            end: Bound::Unbounded,
        }
    }

    /// `(-inf, key]`: a descending scan resuming at `key`.
    pub fn ending_at(key: Bytes) -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Included(key),
        }
    }

    /// Every key that sorts before `prefix` or begins with it.
    ///
    /// Walked in reverse, the first key visited is the greatest key carrying
    /// the prefix.
    pub fn through_prefix(prefix: Bytes) -> Self {
        Self {
            start: Bound::Unbounded,
            end: prefix_successor(&prefix).map_or(Bound::Unbounded, Bound::Excluded),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let above_start = match &self.start {
            Bound::Included(s) => key >= s.as_ref(),
            Bound::Excluded(s) => key > s.as_ref(),
            Bound::Unbounded => true,
        };
        let below_end = match &self.end {
            Bound::Included(e) => key <= e.as_ref(),
            Bound::Excluded(e) => key < e.as_ref(),
            Bound::Unbounded => true,
        };
        above_start && below_end
    }
}

impl RangeBounds<Bytes> for BytesRange {
    fn start_bound(&self) -> Bound<&Bytes> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> Bound<&Bytes> {
        self.end.as_ref()
    }
}
