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

use std::sync::Arc;

use log::debug;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorSlot;
use crate::error::StreamError;
use crate::key_range::KeyRange;
use crate::page::Page;
use crate::policy::KeyExpander;
use crate::policy::KeySelector;
use crate::progress::Progress;
use crate::store::Cursor;
use crate::store::Snapshot;

/// Pulls key ranges off the range queue, scans each against the shared snapshot,
/// and pushes size-bounded pages onto the page queue.
///
/// Cursor, selector and expander calls may block on storage. Each range is therefore
/// scanned on the blocking pool, and the workers run in parallel on any runtime.
pub(crate) struct ScanWorker<Snap: Snapshot> {
    pub(crate) id: usize,
    pub(crate) snapshot: Arc<Snap>,
    pub(crate) prefix: Vec<u8>,
    pub(crate) key_selector: Option<Arc<dyn KeySelector>>,
    pub(crate) key_expander: Arc<dyn KeyExpander>,
    pub(crate) ranges: flume::Receiver<KeyRange>,
    pub(crate) pages: flume::Sender<Page>,
    pub(crate) page_size: usize,
    pub(crate) progress: Arc<Progress>,
    pub(crate) cancel: CancellationToken,
    pub(crate) errors: Arc<ErrorSlot>,
}

impl<Snap: Snapshot> ScanWorker<Snap> {
    pub(crate) async fn run(self) {
        let this = Arc::new(self);
        if let Err(e) = this.scan_ranges().await {
            debug!("scan worker-{} stopped: {}", this.id, e);
            this.errors.record(e);
        }
    }

    async fn scan_ranges(self: &Arc<Self>) -> Result<(), StreamError> {
        loop {
            let kr = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
                res = self.ranges.recv_async() => match res {
                    Ok(kr) => kr,
                    // Closed and empty: every range is taken.
                    Err(_) => return Ok(()),
                },
            };

            debug!("scan worker-{} scanning {}", self.id, kr);
            self.scan_range(kr).await?;
        }
    }

    /// Scan one range on the blocking pool. Pages never span two ranges.
    async fn scan_range(self: &Arc<Self>, kr: KeyRange) -> Result<(), StreamError> {
        let this = self.clone();
        let rt = Handle::current();

        tokio::task::spawn_blocking(move || this.scan_range_blocking(&kr, &rt))
            .await
            .map_err(|e| StreamError::Panicked(e.to_string()))?
    }

    fn scan_range_blocking(&self, kr: &KeyRange, rt: &Handle) -> Result<(), StreamError> {
        let mut cursor = self
            .snapshot
            .new_cursor(&self.prefix)
            .map_err(StreamError::Storage)?;

        let mut page = Page::new();
        let mut prev_key: Option<Vec<u8>> = None;

        cursor.seek(&kr.left);

        while let Some(entry) = cursor.entry() {
            // An expander leaves the cursor on the key it stopped at; skip the rest of it.
            if prev_key.as_deref() == Some(entry.key.as_slice()) {
                cursor.next();
                continue;
            }

            if self.cancel.is_cancelled() {
                return Err(StreamError::Cancelled);
            }

            let prev = prev_key.get_or_insert_with(Vec::new);
            prev.clear();
            prev.extend_from_slice(&entry.key);

            if kr.is_past_end(&entry.key) {
                break;
            }

            if let Some(selector) = &self.key_selector {
                if !selector.select(entry) {
                    continue;
                }
            }

            let key = entry.key.clone();
            let records = match self.key_expander.expand(&key, &mut cursor) {
                Ok(records) => records,
                Err(source) => return Err(StreamError::Expand { key, source }),
            };

            if records.is_empty() {
                continue;
            }

            let before = page.size();
            page.extend(records);
            self.progress.add_scanned(1, (page.size() - before) as u64);

            if page.size() >= self.page_size {
                rt.block_on(self.send_page(std::mem::take(&mut page)))?;
            }
        }

        if !page.is_empty() {
            rt.block_on(self.send_page(page))?;
        }

        Ok(())
    }

    /// Blocks while the page queue is full, which is how a slow sink throttles the scan.
    async fn send_page(&self, page: Page) -> Result<(), StreamError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StreamError::Cancelled),
            res = self.pages.send_async(page) => {
                // The drainer only drops the queue after it failed or was cancelled,
                // and its error is recorded already.
                res.map_err(|_e| StreamError::Cancelled)
            }
        }
    }
}
