//! Video surface: the playback target a camera session feeds.
//!
//! Capture threads present decoded frames here; the detection loop reads
//! the latest one. Readiness mirrors media element ready states so callers
//! can wait for "enough data" before running inference.

use crate::frame::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

#[derive(Default)]
struct SurfaceInner {
    attached: bool,
    ended: bool,
    width: u32,
    height: u32,
    decoded: u64,
    latest: Option<Arc<Frame>>,
}

pub struct VideoSurface {
    warmup_frames: u64,
    inner: Mutex<SurfaceInner>,
}

impl VideoSurface {
    /// `warmup_frames` frames must be decoded before the surface reports
    /// [`ReadyState::HaveEnoughData`] (camera AGC/AE settling).
    pub fn new(warmup_frames: usize) -> Self {
        Self {
            warmup_frames: warmup_frames as u64,
            inner: Mutex::new(SurfaceInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start playback of a new stream with the given frame size.
    pub fn attach(&self, width: u32, height: u32) {
        let mut inner = self.lock();
        *inner = SurfaceInner {
            attached: true,
            width,
            height,
            ..SurfaceInner::default()
        };
    }

    /// Drop the stream and any buffered frame.
    pub fn detach(&self) {
        *self.lock() = SurfaceInner::default();
    }

    /// Mark the stream as ended (track died). Frames are no longer served.
    pub fn end(&self) {
        let mut inner = self.lock();
        inner.ended = true;
        inner.latest = None;
    }

    /// Present a decoded frame. Ignored unless attached.
    pub fn present(&self, frame: Frame) {
        let mut inner = self.lock();
        if !inner.attached || inner.ended {
            return;
        }
        inner.decoded += 1;
        inner.latest = Some(Arc::new(frame));
    }

    pub fn is_attached(&self) -> bool {
        let inner = self.lock();
        inner.attached && !inner.ended
    }

    pub fn ready_state(&self) -> ReadyState {
        let inner = self.lock();
        if !inner.attached || inner.ended {
            ReadyState::HaveNothing
        } else if inner.decoded == 0 {
            ReadyState::HaveMetadata
        } else if inner.decoded <= self.warmup_frames {
            ReadyState::HaveCurrentData
        } else {
            ReadyState::HaveEnoughData
        }
    }

    /// Latest decoded frame, if playing.
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        let inner = self.lock();
        if inner.attached && !inner.ended {
            inner.latest.clone()
        } else {
            None
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let inner = self.lock();
        (inner.width, inner.height)
    }

    pub fn frames_decoded(&self) -> u64 {
        self.lock().decoded
    }
}
