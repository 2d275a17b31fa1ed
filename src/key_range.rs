// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Half-open key ranges and the partitioning of a key prefix into them.

use std::fmt;

/// A half-open key interval `[left, right)`.
///
/// An empty `right` means the range extends to the end of the keyspace.
/// Both boundaries are owned, so a range can be moved to another task freely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

impl KeyRange {
    pub fn new(left: impl Into<Vec<u8>>, right: impl Into<Vec<u8>>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Returns true if `right` is empty, i.e. the range is open-ended.
    pub fn is_unbounded(&self) -> bool {
        self.right.is_empty()
    }

    /// Returns true if `key` has reached or passed the right boundary.
    pub fn is_past_end(&self, key: &[u8]) -> bool {
        !self.right.is_empty() && key >= self.right.as_slice()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.left.as_slice() && !self.is_past_end(key)
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "[{:?}, +∞)", self.left.escape_ascii().to_string())
        } else {
            write!(
                f,
                "[{:?}, {:?})",
                self.left.escape_ascii().to_string(),
                self.right.escape_ascii().to_string()
            )
        }
    }
}

/// Returns the smallest key greater than every key that starts with `prefix`.
///
/// Returns `None` if there is no such key: the prefix is empty or consists only of `0xff`.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Partition the keys starting with `prefix` into contiguous, disjoint ranges.
///
/// The first range starts at `prefix`, each range ends where the next one starts,
/// and the last one ends at [`prefix_end`] or is open-ended if the prefix is unbounded.
///
/// Split points that do not fall strictly inside the prefix, or that do not increase,
/// are ignored. At least one range is always returned.
pub fn split_ranges<I, T>(prefix: &[u8], split_points: I) -> Vec<KeyRange>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let end = prefix_end(prefix).unwrap_or_default();

    let mut ranges = Vec::new();
    let mut start = prefix.to_vec();

    for point in split_points {
        let point = point.as_ref();

        if point <= start.as_slice() {
            continue;
        }
        if !end.is_empty() && point >= end.as_slice() {
            continue;
        }

        ranges.push(KeyRange::new(start, point));
        start = point.to_vec();
    }

    ranges.push(KeyRange::new(start, end));
    ranges
}
