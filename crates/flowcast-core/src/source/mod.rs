//! Frame sources
//!
//! A source yields captured frames one at a time from a blocking call.
//! [`FixtureSource`] replays frames from memory; on Linux,
//! [`RawSocketSource`] reads an AF_PACKET socket.

#[cfg(target_os = "linux")]
mod raw;

#[cfg(target_os = "linux")]
pub use raw::{RawSocketSource, MAX_FRAME_LEN};

use crate::error::Result;
use crate::packet::RawFrame;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Blocking producer of captured frames
pub trait FrameSource: Send {
    /// Next frame, `None` once the source is exhausted or shut down
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Flag the source should poll while blocked; cleared means stop
    fn attach_shutdown(&mut self, _running: Arc<AtomicBool>) {}

    /// Human-readable name for logs
    fn describe(&self) -> String;
}

/// In-memory frame queue
#[derive(Debug, Default)]
pub struct FixtureSource {
    frames: VecDeque<RawFrame>,
}

impl FixtureSource {
    /// Source replaying `frames` in order
    pub fn new(frames: impl IntoIterator<Item = RawFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Queue another frame
    pub fn push(&mut self, frame: RawFrame) {
        self.frames.push_back(frame);
    }

    /// Frames not yet delivered
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for FixtureSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        Ok(self.frames.pop_front())
    }

    fn describe(&self) -> String {
        format!("fixture ({} frames)", self.frames.len())
    }
}
