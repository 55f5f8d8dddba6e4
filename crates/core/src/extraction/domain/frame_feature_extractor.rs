use serde::{Deserialize, Serialize};

use crate::shared::frame::Frame;
use crate::shared::geometry::{FacePose, NormalizedFaceBbox};

/// What the detector saw of the face in one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bbox: NormalizedFaceBbox,
    pub pose: Option<FacePose>,
    pub confidence: f64,
}

/// Per-frame features handed to the measurement engine.
///
/// `face == None` means no face was found; `ppg_value` is only present
/// when a skin region could be sampled.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameSample {
    pub timestamp_sec: f64,
    pub face: Option<FaceObservation>,
    pub ppg_value: Option<f64>,
}

impl FrameSample {
    pub fn no_face(timestamp_sec: f64) -> Self {
        Self {
            timestamp_sec,
            face: None,
            ppg_value: None,
        }
    }
}

/// Domain interface for turning a frame into a [`FrameSample`].
///
/// Implementations may be stateful (e.g., smoothing across frames),
/// hence `&mut self`.
pub trait FrameFeatureExtractor: Send {
    fn extract(&mut self, frame: &Frame) -> Result<FrameSample, Box<dyn std::error::Error>>;

    /// Drops any cross-frame state; called when a new session starts.
    fn reset(&mut self) {}
}
