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

//! Tunables of the stream pipeline.

use std::time::Duration;

use crate::error::ConfigError;
use crate::page::PAGE_SIZE;

/// Sizing of pages and queues, and the throughput log interval.
///
/// The defaults bound the memory held by a run to a small multiple of [`PAGE_SIZE`]
/// while still letting scanning and sending overlap.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// A scan worker flushes its page once the encoded size reaches this many bytes.
    pub page_size: usize,

    /// Capacity of the queue between the range splitter and the scan workers.
    pub range_queue_depth: usize,

    /// Capacity of the queue between the scan workers and the drainer.
    ///
    /// A full queue blocks the scan workers, which is how a slow sink slows the scan down.
    pub page_queue_depth: usize,

    /// Interval of the throughput log, in milliseconds.
    pub throughput_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            range_queue_depth: 3,
            page_queue_depth: 3,
            throughput_interval_ms: 1_000,
        }
    }
}

impl StreamConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_range_queue_depth(mut self, depth: usize) -> Self {
        self.range_queue_depth = depth;
        self
    }

    pub fn with_page_queue_depth(mut self, depth: usize) -> Self {
        self.page_queue_depth = depth;
        self
    }

    pub fn with_throughput_interval(mut self, interval: Duration) -> Self {
        self.throughput_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn throughput_interval(&self) -> Duration {
        Duration::from_millis(self.throughput_interval_ms)
    }

    /// Check every tunable is usable. Zero-sized queues or pages are rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("page_size", self.page_size as u64),
            ("range_queue_depth", self.range_queue_depth as u64),
            ("page_queue_depth", self.page_queue_depth as u64),
            ("throughput_interval_ms", self.throughput_interval_ms),
        ];

        for (name, v) in checks {
            if v == 0 {
                return Err(ConfigError::ZeroTunable { name });
            }
        }
        Ok(())
    }
}
