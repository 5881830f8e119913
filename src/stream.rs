//! Async frame stream over a chunked response body.
//!
//! [`frame_stream`] wraps any byte-chunk stream (normally
//! `reqwest::Response::bytes_stream`) in a [`FrameDecoder`] and yields the
//! decoded records in arrival order. Chunks are read only when the consumer
//! polls for the next record, so the decoder never runs ahead of the
//! reducer that consumes it.
//!
//! The stream ends in one of three ways:
//!
//! | Cause | Last item |
//! |-------|-----------|
//! | Server closed the body | none; the stream simply ends |
//! | Read error | `Err(StreamError::Read)` |
//! | [`CancellationToken`] fired | `Err(StreamError::Cancelled)` |
//!
//! On read error or cancellation the body is dropped right away, which
//! closes the underlying connection.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use mnemora_core::frame::FrameDecoder;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Decoded records of one streaming response.
pub type EventStream<T> = BoxStream<'static, Result<T, StreamError>>;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream read failed: {0}")]
    Read(#[source] BoxError),
    #[error("stream cancelled")]
    Cancelled,
}

struct FrameState<S, T> {
    /// Body and decoder; `None` once the stream has ended.
    inner: Option<(Pin<Box<S>>, FrameDecoder<T>)>,
    ready: VecDeque<T>,
    cancel: CancellationToken,
}

enum Next<I> {
    Cancelled,
    Chunk(Option<I>),
}

/// Decode `bytes` into a stream of `T` records.
pub fn frame_stream<S, E, T>(bytes: S, cancel: CancellationToken) -> EventStream<T>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    let state = FrameState {
        inner: Some((Box::pin(bytes), FrameDecoder::new())),
        ready: VecDeque::new(),
        cancel,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.cancel.is_cancelled() && st.inner.is_some() {
                st.inner = None;
                st.ready.clear();
                return Some((Err(StreamError::Cancelled), st));
            }

            if let Some(record) = st.ready.pop_front() {
                return Some((Ok(record), st));
            }

            let (bytes, decoder) = st.inner.as_mut()?;

            let next = tokio::select! {
                biased;
                _ = st.cancel.cancelled() => Next::Cancelled,
                chunk = bytes.next() => Next::Chunk(chunk),
            };

            match next {
                Next::Cancelled => {
                    tracing::debug!("stream cancelled by caller");
                    st.inner = None;
                    return Some((Err(StreamError::Cancelled), st));
                }
                Next::Chunk(Some(Ok(chunk))) => {
                    st.ready.extend(decoder.push(&chunk));
                }
                Next::Chunk(Some(Err(e))) => {
                    st.inner = None;
                    return Some((Err(StreamError::Read(e.into())), st));
                }
                Next::Chunk(None) => {
                    if let Some((_, decoder)) = st.inner.take() {
                        tracing::trace!(
                            decoded = decoder.frames_decoded(),
                            dropped = decoder.frames_dropped(),
                            "stream closed by server"
                        );
                        decoder.finish();
                    }
                    return None;
                }
            }
        }
    })
    .boxed()
}
