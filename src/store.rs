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

//! Defines the interfaces a storage engine provides to the stream pipeline.
//!
//! The pipeline never touches storage internals. It asks a [`Store`] for split points
//! and a frozen [`Snapshot`], and each scan worker derives its own [`Cursor`] from
//! that snapshot.

use std::io;

use crate::record::VersionedEntry;

/// A versioned, sorted key-value store that can be exported.
pub trait Store: Send + Sync + 'static {
    type Snapshot: Snapshot;

    /// Whether the caller is responsible for assigning commit versions.
    ///
    /// A managed store can only be exported at an explicit read version,
    /// an unmanaged one only at its latest committed state.
    fn is_managed(&self) -> bool;

    /// How many versions of each key the store retains. `1` means only the newest.
    fn num_versions_to_keep(&self) -> usize;

    /// Returns ordered keys that split the keys starting with `prefix` into roughly equal parts.
    ///
    /// May return nothing for a small dataset.
    fn key_splits(&self, prefix: &[u8]) -> Vec<Vec<u8>>;

    /// Freeze a read view at `read_ts`. `0` means the latest committed state.
    fn snapshot(&self, read_ts: u64) -> Result<Self::Snapshot, io::Error>;
}

/// An immutable point-in-time view shared by all scan workers.
///
/// Creating cursors concurrently must be safe.
pub trait Snapshot: Send + Sync + 'static {
    type Cursor: Cursor + 'static;

    /// The version this view is pinned to. Entries with a greater version are invisible.
    fn read_ts(&self) -> u64;

    /// Create a cursor over all visible versions of keys starting with `prefix`.
    ///
    /// The returned cursor is owned by exactly one scan worker.
    fn new_cursor(&self, prefix: &[u8]) -> Result<Self::Cursor, io::Error>;
}

/// A forward cursor over [`VersionedEntry`], sorted by key ascending then version descending.
pub trait Cursor: Send {
    /// Position at the first entry whose key is `>= key`.
    fn seek(&mut self, key: &[u8]);

    /// The current entry, or `None` once the cursor is exhausted.
    ///
    /// The returned reference is only valid until the cursor moves.
    fn entry(&self) -> Option<&VersionedEntry>;

    /// Advance to the next entry.
    fn next(&mut self);

    /// Copy out the value of the current entry.
    ///
    /// Stores that load values lazily may fail here.
    fn value_copy(&self) -> Result<Vec<u8>, io::Error> {
        match self.entry() {
            Some(e) => Ok(e.value.clone()),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "value_copy() on an exhausted cursor",
            )),
        }
    }

    fn valid(&self) -> bool {
        self.entry().is_some()
    }
}

impl<C> Cursor for Box<C>
where C: Cursor + ?Sized
{
    fn seek(&mut self, key: &[u8]) {
        (**self).seek(key)
    }

    fn entry(&self) -> Option<&VersionedEntry> {
        (**self).entry()
    }

    fn next(&mut self) {
        (**self).next()
    }

    fn value_copy(&self) -> Result<Vec<u8>, io::Error> {
        (**self).value_copy()
    }

    fn valid(&self) -> bool {
        (**self).valid()
    }
}
