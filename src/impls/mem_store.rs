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

//! An in-memory multi-version [`Store`].
//!
//! [`MemStore`] keeps every committed version of every key in one ordered map. It is
//! meant for tests and demonstrations, and as a reference for what the stream pipeline
//! expects from a storage engine.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::ops::Bound;
use std::sync::Arc;

use crate::record::VersionedEntry;
use crate::store::Cursor;
use crate::store::Snapshot;
use crate::store::Store;

/// Entries are ordered by key ascending, then by version descending.
type Inner = BTreeMap<(Vec<u8>, Reverse<u64>), Cell>;

/// Errors returned by writes to a [`MemStore`].
#[derive(Clone, PartialEq, Eq, thiserror::Error, Debug)]
pub enum WriteError {
    #[error("version 0 is reserved and can not be written")]
    ZeroVersion,

    #[error("version {version} of key {:?} is already written", .key.escape_ascii().to_string())]
    Duplicate { key: Vec<u8>, version: u64 },

    #[error("an unmanaged store assigns versions itself, explicit version {version} is rejected")]
    ExplicitVersion { version: u64 },

    #[error("a managed store requires an explicit version")]
    AutoVersion,
}

/// The stored payload of one version of a key.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub value: Vec<u8>,
    pub user_meta: u8,
    /// Unix timestamp in seconds. `0` never expires.
    pub expires_at: u64,
    pub deleted: bool,
    pub discard_earlier_versions: bool,
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deleted {
            return write!(f, "TOMBSTONE");
        }

        let mut s = f.debug_struct("Cell");
        s.field("value", &self.value.escape_ascii().to_string());
        if self.user_meta != 0 {
            s.field("user_meta", &self.user_meta);
        }
        if self.expires_at != 0 {
            s.field("expires_at", &self.expires_at);
        }
        if self.discard_earlier_versions {
            s.field("discard_earlier_versions", &true);
        }
        s.finish()
    }
}

impl Cell {
    pub fn normal(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn tombstone() -> Self {
        Self {
            deleted: true,
            ..Default::default()
        }
    }

    pub fn with_user_meta(mut self, user_meta: u8) -> Self {
        self.user_meta = user_meta;
        self
    }

    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_discard_earlier_versions(mut self) -> Self {
        self.discard_earlier_versions = true;
        self
    }
}

/// A multi-version sorted key-value map held in memory.
///
/// An unmanaged store assigns a new version to every write. A managed store leaves
/// versioning to the caller and only accepts writes through [`MemStore::insert_at`].
///
/// Snapshots share the map with the store. A write after a snapshot is taken copies
/// the map, so the snapshot never observes it.
#[derive(Debug, Clone)]
pub struct MemStore {
    inner: Arc<Inner>,
    last_ts: u64,
    managed: bool,
    num_versions_to_keep: usize,

    /// Emit a split point every this many distinct keys.
    split_every: usize,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    /// Create an unmanaged store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BTreeMap::new()),
            last_ts: 0,
            managed: false,
            num_versions_to_keep: 1,
            split_every: 1024,
        }
    }

    /// Create a store whose versions are assigned by the caller.
    pub fn new_managed() -> Self {
        Self {
            managed: true,
            ..Self::new()
        }
    }

    pub fn with_num_versions_to_keep(mut self, n: usize) -> Self {
        self.num_versions_to_keep = n;
        self
    }

    /// `0` is treated as `1`.
    pub fn with_split_every(mut self, n: usize) -> Self {
        self.split_every = n.max(1);
        self
    }

    /// The greatest version written so far.
    pub fn last_ts(&self) -> u64 {
        self.last_ts
    }

    /// Write a new version of `key` in an unmanaged store. Returns the assigned version.
    pub fn set(
        &mut self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Result<u64, WriteError> {
        self.commit(key, Cell::normal(value))
    }

    /// Write a deletion marker for `key` in an unmanaged store.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> Result<u64, WriteError> {
        self.commit(key, Cell::tombstone())
    }

    /// Write `cell` as a new version of `key` in an unmanaged store.
    pub fn commit(&mut self, key: impl Into<Vec<u8>>, cell: Cell) -> Result<u64, WriteError> {
        if self.managed {
            return Err(WriteError::AutoVersion);
        }

        let version = self.last_ts + 1;
        self.internal_insert(key.into(), version, cell)?;
        Ok(version)
    }

    /// Write `cell` as version `version` of `key` in a managed store.
    ///
    /// Versions need not be increasing, but each `(key, version)` is written at most once.
    pub fn insert_at(
        &mut self,
        key: impl Into<Vec<u8>>,
        version: u64,
        cell: Cell,
    ) -> Result<(), WriteError> {
        if !self.managed {
            return Err(WriteError::ExplicitVersion { version });
        }
        self.internal_insert(key.into(), version, cell)
    }

    fn internal_insert(&mut self, key: Vec<u8>, version: u64, cell: Cell) -> Result<(), WriteError> {
        if version == 0 {
            return Err(WriteError::ZeroVersion);
        }

        let k = (key, Reverse(version));
        if self.inner.contains_key(&k) {
            return Err(WriteError::Duplicate {
                key: k.0,
                version,
            });
        }

        Arc::make_mut(&mut self.inner).insert(k, cell);
        self.last_ts = self.last_ts.max(version);
        Ok(())
    }
}

impl Store for MemStore {
    type Snapshot = MemSnapshot;

    fn is_managed(&self) -> bool {
        self.managed
    }

    fn num_versions_to_keep(&self) -> usize {
        self.num_versions_to_keep
    }

    fn key_splits(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let start = (prefix.to_vec(), Reverse(u64::MAX));

        let mut distinct: Vec<&[u8]> = Vec::new();
        for ((key, _), _) in self
            .inner
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(|((key, _), _)| key.starts_with(prefix))
        {
            if distinct.last() != Some(&key.as_slice()) {
                distinct.push(key);
            }
        }

        distinct
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i > 0 && *i % self.split_every == 0)
            .map(|(_, key)| key.to_vec())
            .collect()
    }

    fn snapshot(&self, read_ts: u64) -> Result<Self::Snapshot, io::Error> {
        let read_ts = if read_ts == 0 { self.last_ts } else { read_ts };
        Ok(MemSnapshot {
            read_ts,
            inner: self.inner.clone(),
        })
    }
}

/// A frozen view of a [`MemStore`] at a version.
#[derive(Debug, Clone)]
pub struct MemSnapshot {
    read_ts: u64,
    inner: Arc<Inner>,
}

impl Snapshot for MemSnapshot {
    type Cursor = MemCursor;

    fn read_ts(&self) -> u64 {
        self.read_ts
    }

    fn new_cursor(&self, prefix: &[u8]) -> Result<Self::Cursor, io::Error> {
        let mut c = MemCursor {
            inner: self.inner.clone(),
            read_ts: self.read_ts,
            prefix: prefix.to_vec(),
            entry: VersionedEntry::default(),
            valid: false,
        };
        c.seek(prefix);
        Ok(c)
    }
}

/// Iterates the versions visible at the snapshot version, for keys under one prefix.
#[derive(Debug)]
pub struct MemCursor {
    inner: Arc<Inner>,
    read_ts: u64,
    prefix: Vec<u8>,

    /// Reused for every position to avoid allocating per entry.
    entry: VersionedEntry,
    valid: bool,
}

impl MemCursor {
    fn load(&mut self, start: Bound<(Vec<u8>, Reverse<u64>)>) {
        let prefix = self.prefix.as_slice();
        let read_ts = self.read_ts;

        let found = self
            .inner
            .range((start, Bound::Unbounded))
            .take_while(|((key, _), _)| key.starts_with(prefix))
            .find(|((_, Reverse(version)), _)| *version <= read_ts);

        let Some(((key, Reverse(version)), cell)) = found else {
            self.valid = false;
            return;
        };

        let e = &mut self.entry;
        e.key.clear();
        e.key.extend_from_slice(key);
        e.value.clear();
        e.value.extend_from_slice(&cell.value);
        e.version = *version;
        e.user_meta = cell.user_meta;
        e.expires_at = cell.expires_at;
        e.deleted = cell.deleted;
        e.discard_earlier_versions = cell.discard_earlier_versions;
        self.valid = true;
    }
}

impl Cursor for MemCursor {
    fn seek(&mut self, key: &[u8]) {
        let key = if key < self.prefix.as_slice() {
            self.prefix.clone()
        } else {
            key.to_vec()
        };
        self.load(Bound::Included((key, Reverse(u64::MAX))));
    }

    fn entry(&self) -> Option<&VersionedEntry> {
        self.valid.then_some(&self.entry)
    }

    fn next(&mut self) {
        if !self.valid {
            return;
        }
        let current = (self.entry.key.clone(), Reverse(self.entry.version));
        self.load(Bound::Excluded(current));
    }
}
