//! Timed chunk streaming
//!
//! A [`ChunkSequence`] is an ordered list of byte payloads, each followed by
//! an optional pause. [`ChunkedBody`] turns a sequence into a response body
//! that the connection pulls one frame at a time:
//!
//! ```text
//! HeadersPending -> Writing(0) -> Delaying(0) -> Writing(1) -> ... -> Closed
//! ```
//!
//! `HeadersPending` is the response head, which is fixed before the body is
//! first polled. A pause only starts once the connection comes back for the
//! next frame, so a chunk has been taken by the transport before its delay
//! runs. Delays are `tokio` timers, so a waiting stream never occupies a
//! worker thread. When the client goes away the connection drops the body,
//! and with it the pending timer and every chunk not yet written.

use bytes::{Bytes, BytesMut};
use hyper::body::{Frame, SizeHint};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::time::Sleep;
use tracing::{debug, trace};

/// One write, and the pause that follows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: Bytes,
    pub delay: Duration,
}

/// Ordered chunks making up one streamed response
#[derive(Debug, Clone, Default)]
pub struct ChunkSequence {
    chunks: Vec<Chunk>,
}

impl ChunkSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk with no pause after it
    pub fn write(self, content: impl Into<Bytes>) -> Self {
        self.write_then_wait(content, Duration::ZERO)
    }

    /// Append a chunk followed by `delay`
    pub fn write_then_wait(mut self, content: impl Into<Bytes>, delay: Duration) -> Self {
        self.chunks.push(Chunk {
            content: content.into(),
            delay,
        });
        self
    }

    /// Append the same content `times` times back to back
    ///
    /// Every copy is a separate write; the payload itself is shared.
    pub fn repeat(mut self, content: impl Into<Bytes>, times: usize) -> Self {
        let content = content.into();
        self.chunks.reserve(times);
        self.chunks.extend((0..times).map(|_| Chunk {
            content: content.clone(),
            delay: Duration::ZERO,
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Sum of all pauses
    pub fn total_delay(&self) -> Duration {
        self.chunks.iter().map(|c| c.delay).sum()
    }

    /// Total payload size in bytes
    pub fn content_length(&self) -> usize {
        self.chunks.iter().map(|c| c.content.len()).sum()
    }

    /// The bytes a client holds once the stream has been fully drained
    pub fn concat(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.content_length());
        for chunk in &self.chunks {
            buf.extend_from_slice(&chunk.content);
        }
        buf.freeze()
    }

    /// Turn the sequence into a response body
    pub fn into_body(self, label: &'static str) -> ChunkedBody {
        ChunkedBody::new(label, self)
    }
}

/// Observable position of a [`ChunkedBody`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Chunk `n` is the next one to be written
    Writing(usize),
    /// Chunk `n` has been written; its pause is pending or running
    Delaying(usize),
    Closed,
}

enum State {
    Writing(usize),
    Delaying {
        index: usize,
        timer: Option<Pin<Box<Sleep>>>,
    },
    Closed,
}

/// Response body that replays a [`ChunkSequence`] with its pauses
pub struct ChunkedBody {
    label: &'static str,
    chunks: Vec<Chunk>,
    state: State,
}

impl ChunkedBody {
    pub fn new(label: &'static str, sequence: ChunkSequence) -> Self {
        Self {
            label,
            chunks: sequence.chunks,
            state: State::Writing(0),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn state(&self) -> StreamState {
        match self.state {
            State::Writing(index) => StreamState::Writing(index),
            State::Delaying { index, .. } => StreamState::Delaying(index),
            State::Closed => StreamState::Closed,
        }
    }

    fn close(&mut self, written: usize) {
        self.state = State::Closed;
        debug!(stream = self.label, chunks = written, "stream closed");
    }
}

impl std::fmt::Debug for ChunkedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedBody")
            .field("label", &self.label)
            .field("chunks", &self.chunks.len())
            .field("state", &self.state())
            .finish()
    }
}

impl hyper::body::Body for ChunkedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                State::Writing(index) => {
                    let index = *index;
                    let Some(chunk) = this.chunks.get(index) else {
                        this.close(index);
                        return Poll::Ready(None);
                    };

                    let content = chunk.content.clone();
                    this.state = if chunk.delay.is_zero() {
                        State::Writing(index + 1)
                    } else {
                        State::Delaying { index, timer: None }
                    };
                    return Poll::Ready(Some(Ok(Frame::data(content))));
                }
                State::Delaying { index, timer } => {
                    let index = *index;
                    let label = this.label;
                    let delay = this.chunks.get(index).map(|c| c.delay).unwrap_or_default();
                    let timer = timer.get_or_insert_with(|| {
                        trace!(stream = label, chunk = index, ?delay, "pausing");
                        Box::pin(tokio::time::sleep(delay))
                    });
                    ready!(timer.as_mut().poll(cx));
                    this.state = State::Writing(index + 1);
                }
                State::Closed => return Poll::Ready(None),
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

impl Drop for ChunkedBody {
    fn drop(&mut self) {
        match self.state() {
            StreamState::Closed => {}
            StreamState::Writing(next) => {
                debug!(stream = self.label, next, total = self.chunks.len(), "stream abandoned");
            }
            StreamState::Delaying(index) => {
                debug!(stream = self.label, next = index + 1, total = self.chunks.len(), "stream abandoned");
            }
        }
    }
}
