use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
    /// Clockwise turn applied to decoded frames so they display upright.
    /// `width` and `height` are given after the turn.
    pub rotation: u32,
}

impl VideoMetadata {
    /// Nominal duration derived from frame count and rate, `None` when
    /// either is unknown.
    pub fn duration_sec(&self) -> Option<f64> {
        if self.fps > 0.0 && self.total_frames > 0 {
            Some(self.total_frames as f64 / self.fps)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(fps: f64, total_frames: usize) -> VideoMetadata {
        VideoMetadata {
            width: 640,
            height: 480,
            fps,
            total_frames,
            codec: "h264".to_string(),
            source_path: Some(PathBuf::from("/tmp/face.mp4")),
            rotation: 0,
        }
    }

    #[test]
    fn test_duration_from_rate_and_count() {
        assert_eq!(meta(30.0, 900).duration_sec(), Some(30.0));
    }

    #[test]
    fn test_duration_unknown_without_rate() {
        assert_eq!(meta(0.0, 900).duration_sec(), None);
        assert_eq!(meta(30.0, 0).duration_sec(), None);
    }

    #[test]
    fn test_clone_is_equal() {
        let m = meta(24.0, 100);
        assert_eq!(m.clone(), m);
    }
}
