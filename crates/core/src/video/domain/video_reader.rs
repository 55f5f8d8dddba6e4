use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

pub type FrameResult = Result<Frame, Box<dyn std::error::Error>>;

/// Source of timestamped frames for a measurement session.
///
/// Frames are yielded in presentation order with strictly increasing
/// `timestamp_sec`; the measurement engine rejects anything else.
pub trait VideoReader: Send {
    /// Opens a video file or image directory and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_>;

    fn close(&mut self);
}

/// Keeps timestamps strictly increasing when a container reports
/// duplicate or out-of-order presentation times.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    frame_interval_sec: f64,
    last: Option<f64>,
}

impl MonotonicClock {
    pub fn new(fps: f64) -> Self {
        let frame_interval_sec = if fps.is_finite() && fps > 0.0 {
            1.0 / fps
        } else {
            1.0 / crate::shared::constants::DEFAULT_SEQUENCE_FPS
        };
        Self {
            frame_interval_sec,
            last: None,
        }
    }

    /// Timestamp for the next frame. `reported` is the container's value,
    /// if any; `index` is the decode position, used when it is missing.
    pub fn next(&mut self, reported: Option<f64>, index: usize) -> f64 {
        let candidate = reported
            .filter(|t| t.is_finite())
            .unwrap_or(index as f64 * self.frame_interval_sec);
        let ts = match self.last {
            Some(last) if candidate <= last => last + self.frame_interval_sec,
            _ => candidate,
        };
        self.last = Some(ts);
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uses_reported_times() {
        let mut clock = MonotonicClock::new(30.0);
        assert_relative_eq!(clock.next(Some(0.5), 0), 0.5);
        assert_relative_eq!(clock.next(Some(0.6), 1), 0.6);
    }

    #[test]
    fn test_falls_back_to_index() {
        let mut clock = MonotonicClock::new(25.0);
        assert_relative_eq!(clock.next(None, 0), 0.0);
        assert_relative_eq!(clock.next(None, 5), 0.2);
    }

    #[test]
    fn test_repairs_duplicate_times() {
        let mut clock = MonotonicClock::new(10.0);
        clock.next(Some(1.0), 0);
        assert_relative_eq!(clock.next(Some(1.0), 1), 1.1);
        assert_relative_eq!(clock.next(Some(0.9), 2), 1.2);
        assert_relative_eq!(clock.next(Some(2.0), 3), 2.0);
    }

    #[test]
    fn test_unknown_rate_uses_default() {
        let mut clock = MonotonicClock::new(0.0);
        clock.next(None, 0);
        assert_relative_eq!(clock.next(None, 0), 1.0 / 30.0);
    }
}
