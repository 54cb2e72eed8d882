//! Latest-only frame subscription

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::FramePoll;
use crate::types::MoCapFrame;

/// Conflating view that always yields the newest frame.
///
/// Frames published while the consumer was busy are skipped, never queued. Each frame
/// is yielded at most once per subscription.
#[derive(Debug, Clone)]
pub struct LatestFrames {
    frames: watch::Receiver<Option<Arc<MoCapFrame>>>,
}

impl LatestFrames {
    pub(crate) fn new(mut frames: watch::Receiver<Option<Arc<MoCapFrame>>>) -> Self {
        // Whatever is current at subscription time is "already seen"
        frames.mark_unchanged();
        Self { frames }
    }

    /// Newest frame, without marking it as seen.
    pub fn latest(&self) -> Option<Arc<MoCapFrame>> {
        self.frames.borrow().clone()
    }

    /// Wait for a frame newer than the last one returned.
    ///
    /// Returns `None` once the connection has stopped.
    pub async fn next_frame(&mut self) -> Option<Arc<MoCapFrame>> {
        loop {
            self.frames.changed().await.ok()?;
            if let Some(frame) = self.frames.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }

    /// Blocking version of [`next_frame`](Self::next_frame).
    ///
    /// Parks the calling thread; do not call it from inside an async task.
    pub fn next_frame_blocking(&mut self) -> Option<Arc<MoCapFrame>> {
        futures::executor::block_on(self.next_frame())
    }

    /// Newest frame if it has not been returned yet.
    pub fn try_next_frame(&mut self) -> FramePoll {
        match self.frames.has_changed() {
            Ok(true) => match self.frames.borrow_and_update().clone() {
                Some(frame) => FramePoll::Frame(frame),
                None => FramePoll::Empty,
            },
            Ok(false) => FramePoll::Empty,
            Err(_) => FramePoll::Closed,
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<MoCapFrame>> + Send + 'static {
        WatchStream::from_changes(self.frames).filter_map(|frame| async move { frame })
    }
}

impl Iterator for LatestFrames {
    type Item = Arc<MoCapFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame_blocking()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(number: i32) -> Option<Arc<MoCapFrame>> {
        Some(Arc::new(MoCapFrame::empty(number)))
    }

    #[test]
    fn skips_to_the_newest_frame() {
        let (tx, rx) = watch::channel(None);
        let mut latest = LatestFrames::new(rx);
        assert_eq!(latest.try_next_frame(), FramePoll::Empty);

        for number in 1..=3 {
            tx.send_replace(frame(number));
        }
        assert_eq!(latest.next_frame_blocking().map(|f| f.frame_number), Some(3));
        assert_eq!(latest.try_next_frame(), FramePoll::Empty);
        assert_eq!(latest.latest().map(|f| f.frame_number), Some(3));
    }

    #[test]
    fn frame_current_at_subscription_is_not_replayed() {
        let (tx, rx) = watch::channel(frame(9));
        let mut latest = LatestFrames::new(rx);
        assert_eq!(latest.try_next_frame(), FramePoll::Empty);
        tx.send_replace(frame(10));
        assert_eq!(latest.try_next_frame().into_frame().map(|f| f.frame_number), Some(10));
    }

    #[test]
    fn ends_when_the_receiver_stops() {
        let (tx, rx) = watch::channel(None);
        let mut latest = LatestFrames::new(rx);
        let waiter = std::thread::spawn(move || latest.next_frame_blocking());
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(tx);
        assert_eq!(waiter.join().expect("waiter"), None);
    }

    #[tokio::test]
    async fn stream_yields_updates() {
        let (tx, rx) = watch::channel(None);
        let mut stream = Box::pin(LatestFrames::new(rx).into_stream());
        tx.send_replace(frame(4));
        assert_eq!(stream.next().await.map(|f| f.frame_number), Some(4));
        drop(tx);
        assert!(stream.next().await.is_none());
    }
}
