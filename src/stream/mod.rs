//! Consumer-side frame subscriptions
//!
//! Two subscription kinds sit on top of the background receiver:
//!
//! - [`FrameReader`] gives every consumer its own bounded queue. Frames arrive in the
//!   order they were published, none are skipped while the consumer keeps pace, and a
//!   consumer that falls more than a queue's worth behind loses its *oldest* frames.
//!   [`FrameReader::dropped`] counts them.
//! - [`LatestFrames`] conflates: it only ever yields the newest frame, which is what
//!   pose consumers running slower than the capture rate usually want.
//!
//! Both can be pulled by blocking the calling thread, polled without blocking, awaited
//! from async code, or turned into a [`futures::Stream`]. Once the receiver stops, every
//! pull reports end-of-stream instead of waiting forever.

mod latest;
mod reader;

pub use latest::LatestFrames;
pub use reader::{FrameReader, FrameStream};

use std::sync::Arc;

use crate::types::MoCapFrame;

/// Result of a non-blocking pull.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePoll {
    Frame(Arc<MoCapFrame>),
    /// Nothing new yet; the connection is still running.
    Empty,
    /// The receiver stopped and everything it published has been consumed.
    Closed,
}

impl FramePoll {
    pub fn into_frame(self) -> Option<Arc<MoCapFrame>> {
        match self {
            FramePoll::Frame(frame) => Some(frame),
            FramePoll::Empty | FramePoll::Closed => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, FramePoll::Closed)
    }
}
