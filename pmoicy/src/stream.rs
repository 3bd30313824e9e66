//! `Stream` adapter running an upstream byte stream through the splicer

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;

use crate::splicer::{IcySplicer, Spliced, SplicerStats};

/// Spliced view of an upstream HTTP body
///
/// Without a splicer (server did not announce `icy-metaint`) every chunk is
/// forwarded verbatim as [`Spliced::Audio`].
///
/// ```
/// use bytes::Bytes;
/// use futures::{stream, StreamExt};
/// use pmoicy::{IcySplicer, Spliced, SplicedStream};
///
/// # tokio_test::block_on(async {
/// let chunks = vec![
///     Ok::<_, std::io::Error>(Bytes::from_static(b"ab\x00")),
///     Ok(Bytes::from_static(b"cd")),
/// ];
/// let spliced = SplicedStream::new(stream::iter(chunks), IcySplicer::from_header(Some("2")));
/// let items: Vec<_> = spliced.collect().await;
/// let audio: Vec<u8> = items
///     .iter()
///     .filter_map(|item| item.as_ref().ok().and_then(Spliced::as_audio))
///     .flat_map(|b| b.iter().copied())
///     .collect();
/// assert_eq!(audio, b"abcd");
/// # });
/// ```
pub struct SplicedStream<S> {
    upstream: S,
    splicer: Option<IcySplicer>,
    pending: VecDeque<Spliced>,
    done: bool,
}

impl<S> SplicedStream<S> {
    pub fn new(upstream: S, splicer: Option<IcySplicer>) -> Self {
        Self {
            upstream,
            splicer,
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Plain audio stream, no metadata extraction
    pub fn passthrough(upstream: S) -> Self {
        Self::new(upstream, None)
    }

    pub fn is_splicing(&self) -> bool {
        self.splicer.is_some()
    }

    /// Splicer counters, `None` in passthrough mode
    pub fn stats(&self) -> Option<SplicerStats> {
        self.splicer.as_ref().map(IcySplicer::stats)
    }
}

impl<S, E> Stream for SplicedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Spliced, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.upstream).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    match this.splicer.as_mut() {
                        Some(splicer) => this.pending.extend(splicer.push(chunk)),
                        None => return Poll::Ready(Some(Ok(Spliced::Audio(chunk)))),
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
