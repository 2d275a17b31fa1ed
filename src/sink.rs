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

//! Defines the destination of exported batches.

use std::io;

use crate::page::Batch;

/// Receives the exported data, one batch at a time.
///
/// All calls are made from a single task and never overlap, so an implementation
/// needs no internal synchronization. Records inside a batch, and batches relative to
/// each other, are not globally sorted: treat them as an unordered partition of the snapshot.
///
/// Returning an error aborts the export; no further batches are delivered.
#[async_trait::async_trait]
pub trait Sink: Send + 'static {
    async fn send(&mut self, batch: Batch) -> Result<(), io::Error>;
}

#[async_trait::async_trait]
impl<T> Sink for Box<T>
where T: Sink + ?Sized
{
    async fn send(&mut self, batch: Batch) -> Result<(), io::Error> {
        (**self).send(batch).await
    }
}

/// Dummy implementation of [`Sink`] for `()`, which drops everything it receives.
#[async_trait::async_trait]
impl Sink for () {
    async fn send(&mut self, _batch: Batch) -> Result<(), io::Error> {
        Ok(())
    }
}

/// Forwards every batch to a channel, so the export can be consumed elsewhere.
///
/// Fails with [`io::ErrorKind::BrokenPipe`] once the receiving side is dropped.
#[async_trait::async_trait]
impl Sink for flume::Sender<Batch> {
    async fn send(&mut self, batch: Batch) -> Result<(), io::Error> {
        self.send_async(batch)
            .await
            .map_err(|_e| io::Error::new(io::ErrorKind::BrokenPipe, "batch receiver is dropped"))
    }
}
