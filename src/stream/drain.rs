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
use std::time::Duration;

use log::debug;
use log::info;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorSlot;
use crate::error::StreamError;
use crate::page::Page;
use crate::progress::Progress;
use crate::progress::Throughput;
use crate::sink::Sink;
use crate::util::human_bytes;

/// The only consumer of the page queue and the only caller of the sink.
///
/// Pages already waiting in the queue are coalesced into one batch, so a slow sink
/// receives fewer, larger batches. Only the first page of a batch is waited for.
pub(crate) struct Drainer<T: Sink> {
    pub(crate) pages: flume::Receiver<Page>,
    pub(crate) sink: T,
    pub(crate) throughput_interval: Duration,
    pub(crate) log_prefix: String,
    pub(crate) progress: Arc<Progress>,
    pub(crate) cancel: CancellationToken,
    pub(crate) errors: Arc<ErrorSlot>,
}

impl<T: Sink> Drainer<T> {
    pub(crate) async fn run(mut self) {
        if let Err(e) = self.drain().await {
            debug!("{} drainer stopped: {}", self.log_prefix, e);
            self.errors.record(e);
        }
    }

    async fn drain(&mut self) -> Result<(), StreamError> {
        let started = Instant::now();

        let period = self.throughput_interval;
        let mut ticker = tokio::time::interval_at(started + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StreamError::Cancelled),
                _ = ticker.tick() => {
                    let sent = self.progress.bytes_sent();
                    if let Some(t) = Throughput::new(started.elapsed(), sent) {
                        info!("{} {}", self.log_prefix, t);
                    }
                }
                res = self.pages.recv_async() => match res {
                    Ok(page) => self.send_batch(page).await?,
                    // Closed and empty: every scan worker is done.
                    Err(_) => break,
                },
            }
        }

        info!(
            "{} Sent {} keys",
            self.log_prefix,
            self.progress.records_sent()
        );
        Ok(())
    }

    async fn send_batch(&mut self, first: Page) -> Result<(), StreamError> {
        let mut batch = first;
        while let Ok(page) = self.pages.try_recv() {
            batch.append(page);
        }

        let size = batch.size() as u64;
        let n = batch.len() as u64;

        let start = Instant::now();
        self.sink.send(batch).await.map_err(StreamError::Sink)?;
        self.progress.add_sent(n, size);

        debug!(
            "{} Created batch of size: {} in {:?}",
            self.log_prefix,
            human_bytes(size),
            start.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::page::Batch;
    use crate::record::Record;

    #[derive(Clone, Default)]
    struct Collect {
        batches: Arc<Mutex<Vec<Vec<Vec<u8>>>>>,
        fail_at: Option<usize>,
    }

    #[async_trait::async_trait]
    impl Sink for Collect {
        async fn send(&mut self, batch: Batch) -> Result<(), io::Error> {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_at == Some(batches.len()) {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            batches.push(batch.into_records().into_iter().map(|r| r.key).collect());
            Ok(())
        }
    }

    fn page(keys: &[&str]) -> Page {
        keys.iter().map(|k| Record::new(*k, "v", 1)).collect()
    }

    fn drainer(sink: Collect, depth: usize) -> (Drainer<Collect>, flume::Sender<Page>) {
        let (tx, rx) = flume::bounded(depth);
        let cancel = CancellationToken::new();
        let d = Drainer {
            pages: rx,
            sink,
            throughput_interval: Duration::from_secs(1),
            log_prefix: "[test]".to_string(),
            progress: Arc::new(Progress::new()),
            cancel: cancel.clone(),
            errors: Arc::new(ErrorSlot::new(cancel)),
        };
        (d, tx)
    }

    /// Keeps the message of every log record emitted in this test binary.
    struct CaptureLog;

    static CAPTURE: CaptureLog = CaptureLog;
    static LINES: Mutex<Vec<String>> = Mutex::new(Vec::new());

    impl log::Log for CaptureLog {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            LINES.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    fn capture_logs() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let _ = log::set_logger(&CAPTURE);
            log::set_max_level(log::LevelFilter::Info);
        });
    }

    fn logged(prefix: &str) -> Vec<String> {
        let lines = LINES.lock().unwrap();
        lines.iter().filter(|l| l.starts_with(prefix)).cloned().collect()
    }

    fn keys(batches: &Mutex<Vec<Vec<Vec<u8>>>>) -> Vec<Vec<String>> {
        batches
            .lock()
            .unwrap()
            .iter()
            .map(|b| {
                b.iter()
                    .map(|k| String::from_utf8_lossy(k).to_string())
                    .collect()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_drain_coalesces_queued_pages() -> anyhow::Result<()> {
        let sink = Collect::default();
        let (d, tx) = drainer(sink.clone(), 3);
        let progress = d.progress.clone();

        // Everything is queued before the drainer starts: one sink call.
        tx.send_async(page(&["a", "b"])).await.unwrap();
        tx.send_async(page(&["c"])).await.unwrap();
        tx.send_async(page(&["d"])).await.unwrap();
        drop(tx);

        let errors = d.errors.clone();
        d.run().await;

        assert!(!errors.is_set());
        assert_eq!(keys(&sink.batches), vec![vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string()
        ]]);

        let stat = progress.stat();
        assert_eq!(stat.records_sent, 4);
        assert_eq!(stat.batches_sent, 1);
        assert_eq!(stat.bytes_sent, page(&["a", "b", "c", "d"]).size() as u64);
        Ok(())
    }

    #[tokio::test]
    async fn test_drain_empty_queue() -> anyhow::Result<()> {
        let sink = Collect::default();
        let (d, tx) = drainer(sink.clone(), 3);
        drop(tx);

        let errors = d.errors.clone();
        d.run().await;

        assert!(!errors.is_set());
        assert!(sink.batches.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_drain_sink_failure_stops_delivery() -> anyhow::Result<()> {
        let sink = Collect {
            fail_at: Some(0),
            ..Default::default()
        };
        let (d, tx) = drainer(sink.clone(), 3);
        let errors = d.errors.clone();
        let cancel = d.cancel.clone();

        tx.send_async(page(&["a"])).await.unwrap();

        d.run().await;

        assert!(errors.is_set());
        assert!(cancel.is_cancelled(), "the first error stops the other tasks");
        assert!(sink.batches.lock().unwrap().is_empty());

        // The queue is dropped with the drainer: producers can not block on it.
        assert!(tx.send_async(page(&["b"])).await.is_err());

        let err = Arc::into_inner(errors).unwrap().take().unwrap();
        assert_eq!(err.to_string(), "sink failed: disk full");
        Ok(())
    }

    #[tokio::test]
    async fn test_drain_cancelled_before_start_sends_nothing() -> anyhow::Result<()> {
        let sink = Collect::default();
        let (d, tx) = drainer(sink.clone(), 3);
        tx.send_async(page(&["a"])).await.unwrap();

        d.cancel.cancel();
        let errors = d.errors.clone();
        d.run().await;

        assert!(sink.batches.lock().unwrap().is_empty());
        let err = Arc::into_inner(errors).unwrap().take().unwrap();
        assert!(err.is_cancelled());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_throughput_tick_does_not_consume_pages() -> anyhow::Result<()> {
        let sink = Collect::default();
        let (d, tx) = drainer(sink.clone(), 3);
        let h = tokio::spawn(d.run());

        // Let several ticks fire while no page is available.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(sink.batches.lock().unwrap().is_empty());

        tx.send_async(page(&["a"])).await.unwrap();
        drop(tx);
        h.await?;

        assert_eq!(keys(&sink.batches), vec![vec!["a".to_string()]]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_logs_throughput_on_tick() -> anyhow::Result<()> {
        capture_logs();

        let sink = Collect::default();
        let (mut d, tx) = drainer(sink.clone(), 3);
        d.log_prefix = "[throughput]".to_string();
        let h = tokio::spawn(d.run());

        let p = page(&["a"]);
        let size = p.size() as u64;
        tx.send_async(p).await.unwrap();

        // Ticks fire at 1s, 2s and 3s.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        drop(tx);
        h.await?;

        let want = (1..=3)
            .map(|secs| {
                let t = Throughput::new(Duration::from_secs(secs), size).unwrap();
                format!("[throughput] {}", t)
            })
            .collect::<Vec<_>>();
        assert_eq!(logged("[throughput] Time elapsed"), want);
        assert_eq!(logged("[throughput] Sent"), vec![
            "[throughput] Sent 1 keys".to_string()
        ]);
        Ok(())
    }
}
