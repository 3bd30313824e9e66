//! Listener side of a session's audio fan-out

use crate::models::StationKey;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::io;
use tokio::io::AsyncRead;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::io::StreamReader;
use tracing::warn;

/// Live audio of one station, as handed to an `AudioSink`
///
/// Backed by a broadcast receiver: a listener that falls behind skips the
/// stale chunks instead of slowing the upstream down.
#[derive(Debug)]
pub struct AudioResource {
    station: StationKey,
    rx: broadcast::Receiver<Bytes>,
    skipped_chunks: u64,
}

impl AudioResource {
    pub(crate) fn new(station: StationKey, rx: broadcast::Receiver<Bytes>) -> Self {
        Self {
            station,
            rx,
            skipped_chunks: 0,
        }
    }

    pub fn station(&self) -> &StationKey {
        &self.station
    }

    /// Chunks dropped so far because this listener lagged
    pub fn skipped_chunks(&self) -> u64 {
        self.skipped_chunks
    }

    /// Next audio chunk, `None` once the session is closed
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await {
                Ok(chunk) => return Some(chunk),
                Err(RecvError::Lagged(n)) => {
                    self.skipped_chunks += n;
                    warn!(station = %self.station, skipped = n, "Audio listener lagging, skipping stale chunks");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send + 'static {
        stream::unfold(self, |mut audio| async move {
            audio.recv().await.map(|chunk| (chunk, audio))
        })
    }

    /// Byte reader for sinks that copy into `AsyncWrite`s
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin + 'static {
        StreamReader::new(Box::pin(self.into_stream().map(Ok::<_, io::Error>)))
    }
}
