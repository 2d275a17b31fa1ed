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

//! # Snapshot Stream
//!
//! Exports a consistent point-in-time snapshot of a versioned, sorted key-value store,
//! or the part of it under a key prefix, to a caller-provided [`Sink`].
//!
//! The key space is split into ranges that are scanned concurrently. Scanned records are
//! grouped into size-bounded pages, and a single drainer task hands the pages to the sink
//! in batches. Memory held by a run stays bounded: a slow sink fills the small page queue,
//! which in turn blocks the scanners.
//!
//! ## Core Components
//!
//! - [`Store`], [`Snapshot`] and [`Cursor`]: what a storage engine provides to the pipeline.
//! - [`KeySelector`] and [`KeyExpander`]: per-key filtering and conversion policies.
//! - [`Sink`]: where exported batches go.
//! - [`Stream`]: configures and runs an export.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use snapshot_stream::impls::mem_store::MemStore;
//! use snapshot_stream::Batch;
//! use snapshot_stream::Stream;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut store = MemStore::new();
//!     store.set("user/1", "alice")?;
//!     store.set("user/2", "bob")?;
//!     store.set("order/1", "book")?;
//!
//!     let (tx, rx) = flume::unbounded::<Batch>();
//!
//!     let stream = Stream::new(Arc::new(store), tx)?.with_prefix("user/");
//!     stream.orchestrate(CancellationToken::new(), 2, "[users]").await?;
//!
//!     for batch in rx.drain() {
//!         for rec in batch.records() {
//!             println!("{:?}", rec);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod impls;
pub mod key_range;
pub mod page;
pub mod policy;
pub mod progress;
pub mod record;
pub mod sink;
pub mod store;
pub mod stream;
pub mod util;

pub use crate::config::StreamConfig;
pub use crate::error::ConfigError;
pub use crate::error::StreamError;
pub use crate::key_range::KeyRange;
pub use crate::page::Batch;
pub use crate::page::Page;
pub use crate::page::PAGE_SIZE;
pub use crate::policy::CollapseVersions;
pub use crate::policy::KeyExpander;
pub use crate::policy::KeySelector;
pub use crate::progress::Progress;
pub use crate::progress::ProgressStat;
pub use crate::progress::Throughput;
pub use crate::record::Record;
pub use crate::record::VersionedEntry;
pub use crate::sink::Sink;
pub use crate::store::Cursor;
pub use crate::store::Snapshot;
pub use crate::store::Store;
pub use crate::stream::Stream;
