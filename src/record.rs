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

//! Versioned entries as surfaced by a storage cursor, and the records emitted from them.

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::util::delimited_len;
use crate::util::varint_len;

/// One version of a key, as seen through a [`Cursor`](crate::store::Cursor).
///
/// Entries sharing a key are visited in strictly descending `version` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedEntry {
    pub key: Vec<u8>,
    pub version: u64,
    pub value: Vec<u8>,
    pub user_meta: u8,
    /// Unix timestamp in seconds after which this version is expired. `0` never expires.
    pub expires_at: u64,
    /// This version is a deletion marker.
    pub deleted: bool,
    /// Versions older than this one are obsolete and must not be exported.
    pub discard_earlier_versions: bool,
}

impl VersionedEntry {
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now_secs
    }

    /// A deleted or expired version hides itself and every older version of the key.
    pub fn is_deleted_or_expired(&self) -> bool {
        if self.deleted {
            return true;
        }
        if self.expires_at == 0 {
            return false;
        }
        self.is_expired_at(now_secs())
    }
}

/// A single exported key-value unit.
///
/// `key` and `value` are always owned copies, never views into a cursor's buffers.
#[derive(Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub user_meta: u8,
    pub version: u64,
    pub expires_at: u64,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, version: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            user_meta: 0,
            version,
            expires_at: 0,
        }
    }

    /// Size of this record in the length-delimited wire framing.
    ///
    /// `key`, `value` and the one-byte `user_meta` are length-delimited fields;
    /// `version` and `expires_at` are varint fields omitted when zero.
    /// The record itself is framed as a delimited field of a list.
    pub fn encoded_len(&self) -> usize {
        let mut n = delimited_len(self.key.len()) + delimited_len(self.value.len());
        n += delimited_len(1);

        if self.version != 0 {
            n += 1 + varint_len(self.version);
        }
        if self.expires_at != 0 {
            n += 1 + varint_len(self.expires_at);
        }

        delimited_len(n)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key.escape_ascii().to_string())
            .field("value", &self.value.escape_ascii().to_string())
            .field("user_meta", &self.user_meta)
            .field("version", &self.version)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ent(key: &str, version: u64) -> VersionedEntry {
        VersionedEntry {
            key: key.as_bytes().to_vec(),
            version,
            value: b"v".to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_deleted_or_expired() {
        let e = ent("a", 1);
        assert!(!e.is_deleted_or_expired());

        let e = VersionedEntry {
            deleted: true,
            ..ent("a", 1)
        };
        assert!(e.is_deleted_or_expired());

        let e = VersionedEntry {
            expires_at: 1,
            ..ent("a", 1)
        };
        assert!(e.is_deleted_or_expired());

        let e = VersionedEntry {
            expires_at: now_secs() + 3600,
            ..ent("a", 1)
        };
        assert!(!e.is_deleted_or_expired());
    }

    #[test]
    fn test_is_expired_at_boundary() {
        let e = VersionedEntry {
            expires_at: 100,
            ..ent("a", 1)
        };
        assert!(!e.is_expired_at(99));
        assert!(e.is_expired_at(100));
        assert!(e.is_expired_at(101));
    }

    #[test]
    fn test_record_encoded_len() {
        // key: 1+1+1, value: 1+1+2, user_meta: 1+1+1, version: 1+1 => 12, framed: 1+1+12
        let rec = Record::new("k", "vv", 5);
        assert_eq!(rec.encoded_len(), 14);

        let rec = Record {
            expires_at: 300,
            ..Record::new("k", "vv", 0)
        };
        // 3 + 4 + 3 + (1 + 2) => 13, framed: 1+1+13
        assert_eq!(rec.encoded_len(), 15);

        let big = Record::new(vec![0u8; 10], vec![0u8; 1000], 1);
        assert!(big.encoded_len() > 1010);
    }

    #[test]
    fn test_record_debug_escapes_bytes() {
        let rec = Record::new(b"a\x00".to_vec(), "v", 1);
        let s = format!("{:?}", rec);
        assert!(s.contains(r#"key: "a\\x00""#), "got: {}", s);
    }
}
