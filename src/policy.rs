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

//! Pluggable policies applied by scan workers to every key.
//!
//! - [`KeySelector`] decides from the newest version whether a key is exported at all.
//! - [`KeyExpander`] walks the versions of a selected key and turns them into records.
//!
//! Both are called concurrently from every scan worker.

use std::io;

use crate::record::Record;
use crate::record::VersionedEntry;
use crate::store::Cursor;

/// Chooses which keys to export.
///
/// Called once per key, with the highest visible version of the key.
pub trait KeySelector: Send + Sync {
    fn select(&self, entry: &VersionedEntry) -> bool;
}

impl<F> KeySelector for F
where F: Fn(&VersionedEntry) -> bool + Send + Sync
{
    fn select(&self, entry: &VersionedEntry) -> bool {
        self(entry)
    }
}

/// Converts the versions of one key into zero or more records.
///
/// `cursor` is positioned at the highest version of `key`. An implementation may advance
/// it through older versions of the same key, but it **must** return as soon as the
/// cursor reaches a different key, or the scan of the following key is corrupted.
///
/// Records must own their data: the cursor reuses its buffers once it moves.
pub trait KeyExpander: Send + Sync {
    fn expand(&self, key: &[u8], cursor: &mut dyn Cursor) -> Result<Vec<Record>, io::Error>;
}

/// The default [`KeyExpander`]: emit every live version, newest first.
///
/// Walking stops at the first version that is deleted or expired, after the newest
/// version if only one version is kept, or after a version that discards earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapseVersions {
    pub versions_to_keep: usize,
}

impl Default for CollapseVersions {
    fn default() -> Self {
        Self {
            versions_to_keep: usize::MAX,
        }
    }
}

impl CollapseVersions {
    pub fn new(versions_to_keep: usize) -> Self {
        Self { versions_to_keep }
    }
}

impl KeyExpander for CollapseVersions {
    fn expand(&self, key: &[u8], cursor: &mut dyn Cursor) -> Result<Vec<Record>, io::Error> {
        let mut records = Vec::new();

        while let Some(entry) = cursor.entry() {
            if entry.is_deleted_or_expired() {
                break;
            }
            if entry.key != key {
                break;
            }

            let discard_earlier = entry.discard_earlier_versions;
            let mut rec = Record {
                key: entry.key.clone(),
                value: Vec::new(),
                user_meta: entry.user_meta,
                version: entry.version,
                expires_at: entry.expires_at,
            };
            rec.value = cursor.value_copy()?;
            records.push(rec);

            if self.versions_to_keep == 1 || discard_earlier {
                break;
            }

            cursor.next();
        }

        Ok(records)
    }
}
