//! Queued frame subscription

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

use super::FramePoll;
use crate::types::MoCapFrame;

/// One consumer's ordered view of the frame sequence.
///
/// Created by [`NatNetClient::subscribe`](crate::NatNetClient::subscribe). A reader only
/// sees frames published after it was created.
#[derive(Debug)]
pub struct FrameReader {
    frames: broadcast::Receiver<Arc<MoCapFrame>>,
    dropped: u64,
}

impl FrameReader {
    pub(crate) fn new(frames: broadcast::Receiver<Arc<MoCapFrame>>) -> Self {
        Self { frames, dropped: 0 }
    }

    fn lagged(&mut self, skipped: u64) {
        self.dropped += skipped;
        debug!(skipped, total = self.dropped, "Subscriber fell behind, oldest frames dropped");
    }

    /// Wait for the next frame, blocking the calling thread.
    ///
    /// Returns `None` once the connection has stopped and the queue is drained. Inside
    /// an async task use [`next_frame`](Self::next_frame) instead.
    pub fn next_frame_blocking(&mut self) -> Option<Arc<MoCapFrame>> {
        futures::executor::block_on(self.next_frame())
    }

    /// Wait for the next frame without blocking the thread.
    ///
    /// Cancel-safe: dropping the future never loses a frame.
    pub async fn next_frame(&mut self) -> Option<Arc<MoCapFrame>> {
        loop {
            match self.frames.recv().await {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next queued frame if there is one.
    pub fn try_next_frame(&mut self) -> FramePoll {
        loop {
            match self.frames.try_recv() {
                Ok(frame) => return FramePoll::Frame(frame),
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty) => return FramePoll::Empty,
                Err(TryRecvError::Closed) => return FramePoll::Closed,
            }
        }
    }

    /// Frames this reader lost because its queue overflowed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Frames waiting in this reader's queue.
    pub fn queued(&self) -> usize {
        self.frames.len()
    }

    pub fn into_stream(self) -> FrameStream {
        FrameStream { inner: BroadcastStream::new(self.frames), dropped: self.dropped }
    }
}

impl Iterator for FrameReader {
    type Item = Arc<MoCapFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame_blocking()
    }
}

pin_project! {
    /// [`FrameReader`] adapted to a [`Stream`].
    pub struct FrameStream {
        #[pin]
        inner: BroadcastStream<Arc<MoCapFrame>>,
        dropped: u64,
    }
}

impl FrameStream {
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Stream for FrameStream {
    type Item = Arc<MoCapFrame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(frame)) => return Poll::Ready(Some(frame)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    *this.dropped += skipped;
                    debug!(skipped, total = *this.dropped, "Stream fell behind, oldest frames dropped");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}
