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

//! Throughput accounting shared by the scan workers and the drainer.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::util::fixed_duration;
use crate::util::human_bytes;

/// Cumulative counters of one export run.
///
/// Scan workers update the `*_scanned` counters, the drainer the `*_sent` ones.
/// Readers may observe the counters at any time, e.g. from another task.
#[derive(Debug, Default)]
pub struct Progress {
    keys_scanned: AtomicU64,
    bytes_scanned: AtomicU64,
    records_sent: AtomicU64,
    bytes_sent: AtomicU64,
    batches_sent: AtomicU64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_scanned(&self, keys: u64, bytes: u64) {
        self.keys_scanned.fetch_add(keys, Ordering::Relaxed);
        self.bytes_scanned.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn add_sent(&self, records: u64, bytes: u64) {
        self.records_sent.fetch_add(records, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn records_sent(&self) -> u64 {
        self.records_sent.load(Ordering::Relaxed)
    }

    pub fn stat(&self) -> ProgressStat {
        ProgressStat {
            keys_scanned: self.keys_scanned.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`Progress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProgressStat {
    /// Keys that produced at least one record.
    pub keys_scanned: u64,
    pub bytes_scanned: u64,
    pub records_sent: u64,
    pub bytes_sent: u64,
    pub batches_sent: u64,
}

/// One periodic throughput observation: `elapsed`, cumulative `bytes_sent` and their rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    pub elapsed: Duration,
    pub bytes_sent: u64,
}

impl Throughput {
    /// Returns `None` before one whole second has elapsed, when no rate can be computed.
    pub fn new(elapsed: Duration, bytes_sent: u64) -> Option<Self> {
        if elapsed.as_secs() == 0 {
            return None;
        }
        Some(Self {
            elapsed,
            bytes_sent,
        })
    }

    /// Average bytes per second over whole elapsed seconds.
    pub fn bytes_per_sec(&self) -> u64 {
        self.bytes_sent / self.elapsed.as_secs()
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time elapsed: {}, bytes sent: {}, speed: {}/sec",
            fixed_duration(self.elapsed),
            human_bytes(self.bytes_sent),
            human_bytes(self.bytes_per_sec())
        )
    }
}
