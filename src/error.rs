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

//! Errors returned by a stream export, and the single-assignment slot that collects them.

use std::io;
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

/// The error returned by [`Stream::orchestrate`](crate::stream::Stream::orchestrate).
///
/// Only the first error raised by any stage of a run is reported.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The cancellation token was triggered while a stage was waiting.
    #[error("stream is cancelled")]
    Cancelled,

    /// The key expansion policy failed, e.g., a value could not be copied out.
    #[error("failed to expand key {:?}: {source}", .key.escape_ascii().to_string())]
    Expand {
        key: Vec<u8>,
        #[source]
        source: io::Error,
    },

    /// The sink rejected a batch.
    #[error("sink failed: {0}")]
    Sink(#[source] io::Error),

    /// The store failed to provide a snapshot or a cursor.
    #[error("storage error: {0}")]
    Storage(#[source] io::Error),

    /// The stream is used in a way its store does not support. Detected before any task starts.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A pipeline task panicked.
    #[error("stream task panicked: {0}")]
    Panicked(String),
}

impl StreamError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }
}

/// Misuse of the stream API, reported synchronously.
#[derive(Clone, PartialEq, Eq, thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Stream::new() can not be used with a managed store, use Stream::new_at()")]
    ManagedStore,

    #[error("Stream::new_at() can only be used with a managed store")]
    UnmanagedStore,

    #[error("parallelism must be at least 1")]
    ZeroParallelism,

    #[error("{name} must be at least 1")]
    ZeroTunable { name: &'static str },
}

/// Holds the first error of a run. Later errors are dropped.
///
/// Recording never blocks on other reporters. The first successful record also
/// cancels `cancel`, so every other stage stops at its next suspension point.
#[derive(Debug)]
pub(crate) struct ErrorSlot {
    first: OnceLock<StreamError>,
    cancel: CancellationToken,
}

impl ErrorSlot {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self {
            first: OnceLock::new(),
            cancel,
        }
    }

    /// Record `err` if no error is recorded yet. Returns true if `err` is the one kept.
    pub(crate) fn record(&self, err: StreamError) -> bool {
        let kept = self.first.set(err).is_ok();
        if kept {
            self.cancel.cancel();
        }
        kept
    }

    pub(crate) fn is_set(&self) -> bool {
        self.first.get().is_some()
    }

    pub(crate) fn take(self) -> Option<StreamError> {
        self.first.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_slot_first_wins() {
        let token = CancellationToken::new();
        let slot = ErrorSlot::new(token.clone());
        assert!(!slot.is_set());

        assert!(slot.record(StreamError::Sink(io::Error::new(
            io::ErrorKind::Other,
            "first"
        ))));
        assert!(token.is_cancelled());

        assert!(!slot.record(StreamError::Cancelled));
        assert!(!slot.record(StreamError::Panicked("x".to_string())));

        let got = slot.take().unwrap();
        assert_eq!(got.to_string(), "sink failed: first");
    }

    #[test]
    fn test_error_slot_concurrent_record() {
        let slot = ErrorSlot::new(CancellationToken::new());

        std::thread::scope(|s| {
            for i in 0..8 {
                let slot = &slot;
                s.spawn(move || slot.record(StreamError::Panicked(i.to_string())));
            }
        });

        let got = slot.take().unwrap();
        assert!(matches!(got, StreamError::Panicked(_)));
    }

    #[test]
    fn test_stream_error_display() {
        let e = StreamError::Expand {
            key: b"k\x01".to_vec(),
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        assert_eq!(e.to_string(), r#"failed to expand key "k\\x01": boom"#);

        let e = StreamError::from(ConfigError::ZeroTunable { name: "page_size" });
        assert_eq!(e.to_string(), "page_size must be at least 1");

        assert!(StreamError::Cancelled.is_cancelled());
    }
}
