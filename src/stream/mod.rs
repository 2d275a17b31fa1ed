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

//! Concurrent export of a store snapshot.
//!
//! A run is made of three kinds of tasks connected by two small bounded queues:
//!
//! ```text
//! splitter --ranges--> scan worker x N --pages--> drainer --batches--> Sink
//! ```
//!
//! - The splitter partitions the prefix into disjoint key ranges.
//! - Each scan worker scans whole ranges against the shared snapshot and emits pages.
//! - The drainer coalesces queued pages and calls the sink, one call at a time.
//!
//! Because ranges are scanned concurrently, records are **not** delivered in key order.

pub(crate) mod drain;
pub(crate) mod scan;
pub(crate) mod splitter;


use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use log::info;
use log::warn;
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::error::ConfigError;
use crate::error::ErrorSlot;
use crate::error::StreamError;
use crate::policy::CollapseVersions;
use crate::policy::KeyExpander;
use crate::policy::KeySelector;
use crate::progress::Progress;
use crate::sink::Sink;
use crate::store::Snapshot;
use crate::store::Store;
use crate::stream::drain::Drainer;
use crate::stream::scan::ScanWorker;
use crate::stream::splitter::Splitter;

/// Exports a consistent snapshot of a [`Store`], or the part of it under a key prefix,
/// to a [`Sink`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use snapshot_stream::impls::mem_store::MemStore;
/// use snapshot_stream::stream::Stream;
/// use snapshot_stream::Batch;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let mut store = MemStore::new();
///     store.set("a", "1")?;
///     store.set("b", "2")?;
///
///     let (tx, rx) = flume::unbounded::<Batch>();
///     let stream = Stream::new(Arc::new(store), tx)?;
///     stream.orchestrate(CancellationToken::new(), 4, "[export]").await?;
///
///     let records: usize = rx.drain().map(|batch| batch.len()).sum();
///     assert_eq!(records, 2);
///     Ok(())
/// }
/// ```
pub struct Stream<S, T>
where
    S: Store,
    T: Sink,
{
    store: Arc<S>,

    /// The version to read at. `0` means the latest committed state.
    read_ts: u64,

    /// Only keys starting with this prefix are exported. Empty exports everything.
    prefix: Vec<u8>,

    /// Called concurrently with the newest version of every key. `None` selects all keys.
    key_selector: Option<Arc<dyn KeySelector>>,

    /// Called concurrently for every selected key.
    key_expander: Arc<dyn KeyExpander>,

    sink: T,

    config: StreamConfig,

    progress: Arc<Progress>,
}

impl<S, T> fmt::Debug for Stream<S, T>
where
    S: Store,
    T: Sink,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("read_ts", &self.read_ts)
            .field("prefix", &self.prefix.escape_ascii().to_string())
            .field("key_selector", &self.key_selector.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl<S, T> Stream<S, T>
where
    S: Store,
    T: Sink,
{
    /// Create a stream over the latest committed state of an unmanaged store.
    pub fn new(store: Arc<S>, sink: T) -> Result<Self, ConfigError> {
        if store.is_managed() {
            return Err(ConfigError::ManagedStore);
        }
        Ok(Self::new_unchecked(store, 0, sink))
    }

    /// Create a stream reading a managed store at `read_ts`.
    pub fn new_at(store: Arc<S>, read_ts: u64, sink: T) -> Result<Self, ConfigError> {
        if !store.is_managed() {
            return Err(ConfigError::UnmanagedStore);
        }
        Ok(Self::new_unchecked(store, read_ts, sink))
    }

    fn new_unchecked(store: Arc<S>, read_ts: u64, sink: T) -> Self {
        let expander = CollapseVersions::new(store.num_versions_to_keep());
        Self {
            store,
            read_ts,
            prefix: Vec::new(),
            key_selector: None,
            key_expander: Arc::new(expander),
            sink,
            config: StreamConfig::default(),
            progress: Arc::new(Progress::new()),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_key_selector(mut self, selector: impl KeySelector + 'static) -> Self {
        self.key_selector = Some(Arc::new(selector));
        self
    }

    /// Replace the default [`CollapseVersions`] policy.
    pub fn with_key_expander(mut self, expander: impl KeyExpander + 'static) -> Self {
        self.key_expander = Arc::new(expander);
        self
    }

    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn read_ts(&self) -> u64 {
        self.read_ts
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// The counters of this stream, readable while [`Self::orchestrate`] runs.
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Run the export with `parallelism` scan workers and return once it is over.
    ///
    /// Returns `Ok(())` only after every produced record has been handed to the sink.
    /// Otherwise returns the first error raised by any task, which is
    /// [`StreamError::Cancelled`] if `cancel` was triggered. After an error, every task
    /// is stopped and awaited before returning, so the sink is never called once this
    /// method has returned.
    ///
    /// Log lines are prefixed with `log_prefix`.
    ///
    /// Consumes the stream: a stream runs at most once.
    pub async fn orchestrate(
        self,
        cancel: CancellationToken,
        parallelism: usize,
        log_prefix: &str,
    ) -> Result<(), StreamError> {
        if parallelism == 0 {
            return Err(ConfigError::ZeroParallelism.into());
        }
        self.config.validate()?;

        let snapshot = self.store.snapshot(self.read_ts).map_err(StreamError::Storage)?;
        let snapshot = Arc::new(snapshot);
        let log_prefix = log_prefix.to_string();

        info!(
            "{} Stream started: read_ts={}, prefix={:?}, parallelism={}",
            log_prefix,
            snapshot.read_ts(),
            self.prefix.escape_ascii().to_string(),
            parallelism
        );

        // Every task stops on the caller's token, or once the first error is recorded.
        let stop = cancel.child_token();
        let errors = Arc::new(ErrorSlot::new(stop.clone()));

        // Stop the tasks if the caller drops this future before it completes.
        let _stop_on_drop = stop.clone().drop_guard();

        let (range_tx, range_rx) = flume::bounded(self.config.range_queue_depth);
        let (page_tx, page_rx) = flume::bounded(self.config.page_queue_depth);

        let splitter = Splitter {
            store: self.store.clone(),
            prefix: self.prefix.clone(),
            ranges: range_tx,
            cancel: stop.clone(),
            errors: errors.clone(),
        };
        let splitter_handle = tokio::spawn(splitter.run());

        let mut scan_handles = Vec::with_capacity(parallelism);
        for id in 0..parallelism {
            let worker = ScanWorker {
                id,
                snapshot: snapshot.clone(),
                prefix: self.prefix.clone(),
                key_selector: self.key_selector.clone(),
                key_expander: self.key_expander.clone(),
                ranges: range_rx.clone(),
                pages: page_tx.clone(),
                page_size: self.config.page_size,
                progress: self.progress.clone(),
                cancel: stop.clone(),
                errors: errors.clone(),
            };
            scan_handles.push(tokio::spawn(worker.run()));
        }
        drop(range_rx);

        let drainer = Drainer {
            pages: page_rx,
            sink: self.sink,
            throughput_interval: self.config.throughput_interval(),
            log_prefix: log_prefix.clone(),
            progress: self.progress.clone(),
            cancel: stop.clone(),
            errors: errors.clone(),
        };
        let drain_handle = tokio::spawn(drainer.run());

        for res in join_all(scan_handles).await {
            record_panic(&errors, res);
        }

        // Only scan workers write pages. Closing the queue lets the drainer finish.
        drop(page_tx);

        record_panic(&errors, splitter_handle.await);
        record_panic(&errors, drain_handle.await);

        let first_error = Arc::into_inner(errors).and_then(|slot| slot.take());

        match first_error {
            None => Ok(()),
            Some(err) => {
                warn!("{} Stream failed: {}", log_prefix, err);
                Err(err)
            }
        }
    }
}

fn record_panic(errors: &ErrorSlot, res: Result<(), tokio::task::JoinError>) {
    if let Err(join_err) = res {
        errors.record(StreamError::Panicked(join_err.to_string()));
    }
}
