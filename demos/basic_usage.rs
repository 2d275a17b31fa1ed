use std::io;
use std::sync::Arc;

use snapshot_stream::impls::mem_store::Cell;
use snapshot_stream::impls::mem_store::MemStore;
use snapshot_stream::Batch;
use snapshot_stream::Sink;
use snapshot_stream::Stream;
use snapshot_stream::StreamConfig;
use snapshot_stream::VersionedEntry;
use tokio_util::sync::CancellationToken;

/// Prints every batch it receives.
struct PrintSink {
    batches: usize,
}

#[async_trait::async_trait]
impl Sink for PrintSink {
    async fn send(&mut self, batch: Batch) -> Result<(), io::Error> {
        self.batches += 1;
        println!(
            "batch-{}: {} records, {} bytes",
            self.batches,
            batch.len(),
            batch.size()
        );
        for rec in batch.records() {
            println!("    {:?}", rec);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // An unmanaged store assigns a version to every write
    let mut store = MemStore::new().with_split_every(2);

    for i in 0..6 {
        store.set(format!("user/{}", i), format!("name-{}", i))?;
    }
    store.set("user/1", "renamed")?;
    store.delete("user/2")?;
    store.commit("user/3", Cell::normal("admin").with_user_meta(1))?;
    store.set("order/1", "book")?;

    let config = StreamConfig::default().with_page_size(64);

    // Export users whose newest version carries no user meta
    let stream = Stream::new(Arc::new(store), PrintSink { batches: 0 })?
        .with_prefix("user/")
        .with_key_selector(|e: &VersionedEntry| e.user_meta == 0)
        .with_config(config);

    let progress = stream.progress();

    stream
        .orchestrate(CancellationToken::new(), 4, "[demo]")
        .await?;

    println!("{}", serde_json::to_string_pretty(&progress.stat())?);
    Ok(())
}
