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
use tokio_util::sync::CancellationToken;

use crate::error::ErrorSlot;
use crate::error::StreamError;
use crate::key_range::split_ranges;
use crate::key_range::KeyRange;
use crate::store::Store;

/// Feeds the range queue with the partition of the prefix, then closes it.
pub(crate) struct Splitter<S: Store> {
    pub(crate) store: Arc<S>,
    pub(crate) prefix: Vec<u8>,
    pub(crate) ranges: flume::Sender<KeyRange>,
    pub(crate) cancel: CancellationToken,
    pub(crate) errors: Arc<ErrorSlot>,
}

impl<S: Store> Splitter<S> {
    pub(crate) async fn run(self) {
        if let Err(e) = self.produce_ranges().await {
            debug!("range splitter stopped: {}", e);
            self.errors.record(e);
        }
        // Dropping `self.ranges` closes the queue.
    }

    async fn produce_ranges(&self) -> Result<(), StreamError> {
        let splits = self.store.key_splits(&self.prefix);
        let ranges = split_ranges(&self.prefix, &splits);

        debug!(
            "split prefix {:?} into {} ranges with {} split points",
            self.prefix.escape_ascii().to_string(),
            ranges.len(),
            splits.len()
        );

        for kr in ranges {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
                res = self.ranges.send_async(kr) => {
                    if res.is_err() {
                        // Every scan worker is gone; one of them has recorded why.
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::impls::mem_store::MemStore;

    fn splitter(
        store: MemStore,
        prefix: &str,
        depth: usize,
    ) -> (Splitter<MemStore>, flume::Receiver<KeyRange>, CancellationToken) {
        let (tx, rx) = flume::bounded(depth);
        let cancel = CancellationToken::new();
        let s = Splitter {
            store: Arc::new(store),
            prefix: prefix.as_bytes().to_vec(),
            ranges: tx,
            cancel: cancel.clone(),
            errors: Arc::new(ErrorSlot::new(cancel.clone())),
        };
        (s, rx, cancel)
    }

    #[tokio::test]
    async fn test_splitter_empty_store_yields_one_range() {
        let (s, rx, _cancel) = splitter(MemStore::new(), "", 3);
        s.run().await;

        let got = rx.drain().collect::<Vec<_>>();
        assert_eq!(got, vec![KeyRange::new("", "")]);
        assert!(rx.is_disconnected());
    }

    #[tokio::test]
    async fn test_splitter_chains_ranges() -> anyhow::Result<()> {
        let mut store = MemStore::new().with_split_every(2);
        for k in ["p1", "p2", "p3", "p4", "p5", "q1"] {
            store.set(k, "v")?;
        }

        let (s, rx, _cancel) = splitter(store, "p", 16);
        s.run().await;

        let got = rx.drain().collect::<Vec<_>>();
        assert_eq!(got, vec![
            KeyRange::new("p", "p3"),
            KeyRange::new("p3", "p5"),
            KeyRange::new("p5", "q"),
        ]);
        Ok(())
    }

    #[tokio::test]
    async fn test_splitter_cancelled_while_blocked() -> anyhow::Result<()> {
        let mut store = MemStore::new().with_split_every(1);
        for k in ["a", "b", "c", "d"] {
            store.set(k, "v")?;
        }

        // Queue of 1 and no reader: the splitter blocks on the second range.
        let (s, rx, cancel) = splitter(store, "", 1);
        let errors = s.errors.clone();
        let h = tokio::spawn(s.run());

        cancel.cancel();
        h.await?;

        assert!(errors.is_set());
        assert!(rx.len() <= 1);
        Ok(())
    }
}
