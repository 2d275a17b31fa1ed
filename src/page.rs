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

//! Size-bounded pages of records, the unit passed from scan workers to the drainer.

use crate::record::Record;

/// A scan worker flushes its current page once the page reaches this many encoded bytes.
pub const PAGE_SIZE: usize = 4 << 20;

/// An ordered list of records with their cumulative encoded size.
///
/// A page produced by a scan worker never holds records from more than one key range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    records: Vec<Record>,
    size: usize,
}

/// What the sink receives: one page, or several pages concatenated in arrival order.
pub type Batch = Page;

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.size += record.encoded_len();
        self.records.push(record);
    }

    /// Move all records of `other` to the end of this page.
    pub fn append(&mut self, mut other: Page) {
        self.size += other.size;
        if self.records.is_empty() {
            self.records = other.records;
        } else {
            self.records.append(&mut other.records);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cumulative encoded size of all records, see [`Record::encoded_len`].
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl Extend<Record> for Page {
    fn extend<T: IntoIterator<Item = Record>>(&mut self, iter: T) {
        for rec in iter {
            self.push(rec);
        }
    }
}

impl FromIterator<Record> for Page {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        let mut page = Page::new();
        page.extend(iter);
        page
    }
}
