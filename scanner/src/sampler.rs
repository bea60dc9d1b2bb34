use chrono::Utc;
use loyalty_client_common::frame::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

use crate::camera::{ReadyState, VideoSource};

/// Copies the current picture of a video source into a [`Frame`].
///
/// Has no timer of its own: the owning scan session calls
/// [`capture_frame`](FrameSampler::capture_frame) on every tick.
#[derive(Debug, Default)]
pub struct FrameSampler {
    seq: AtomicU64,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until the source has enough data to render a non-empty picture.
    pub fn capture_frame(&self, source: &dyn VideoSource) -> Option<Frame> {
        let state = source.ready_state();
        if state != ReadyState::HaveEnoughData {
            trace!(?state, "source not ready, skipping capture");
            return None;
        }
        let picture = source.draw()?;
        if picture.width() == 0 || picture.height() == 0 {
            return None;
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        Some(Frame::from_rgba(picture, Utc::now().timestamp_millis(), seq))
    }

    /// Number of frames captured so far.
    pub fn captured(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}
