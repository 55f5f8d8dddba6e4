use crate::extraction::domain::bbox_smoother::BboxSmoother;
use crate::extraction::domain::frame_feature_extractor::FrameSample;
use crate::shared::geometry::{FacePose, NormalizedFaceBbox};

use super::config::{CameraFacing, GateThresholds};
use super::face_state::FaceState;

/// Gate verdict for one frame, in user-facing camera conventions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateDecision {
    pub face_state: FaceState,
    pub bbox: Option<NormalizedFaceBbox>,
    pub pose: Option<FacePose>,
    pub admitted: bool,
}

/// Turns raw extractor output into a stable [`FaceState`] and decides
/// whether the frame's pulse sample enters the signal buffer.
pub struct FaceQualityGate {
    thresholds: GateThresholds,
    facing: CameraFacing,
    smoother: Box<dyn BboxSmoother>,
}

impl FaceQualityGate {
    pub fn new(
        thresholds: GateThresholds,
        facing: CameraFacing,
        smoother: Box<dyn BboxSmoother>,
    ) -> Self {
        Self {
            thresholds,
            facing,
            smoother,
        }
    }

    pub fn set_thresholds(&mut self, thresholds: GateThresholds) {
        self.thresholds = thresholds;
    }

    pub fn set_facing(&mut self, facing: CameraFacing) {
        if facing != self.facing {
            self.smoother.reset();
        }
        self.facing = facing;
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
    }

    /// A frame is admitted only when the face is `Ok` and a finite pulse
    /// sample was taken from it.
    pub fn evaluate(&mut self, sample: &FrameSample) -> GateDecision {
        let Some(face) = sample.face else {
            self.smoother.reset();
            return GateDecision {
                face_state: FaceState::NotVisible,
                bbox: None,
                pose: None,
                admitted: false,
            };
        };

        let (raw_bbox, pose) = match self.facing {
            CameraFacing::User => (face.bbox, face.pose),
            CameraFacing::Environment => (face.bbox.mirrored(), face.pose.map(|p| p.mirrored())),
        };

        if !raw_bbox.is_valid() {
            self.smoother.reset();
            return GateDecision {
                face_state: FaceState::Unknown,
                bbox: None,
                pose,
                admitted: false,
            };
        }

        let bbox = self.smoother.smooth(raw_bbox);
        let face_state = classify(&bbox, pose.as_ref(), &self.thresholds);
        let admitted = face_state.is_ok() && sample.ppg_value.is_some_and(f64::is_finite);

        GateDecision {
            face_state,
            bbox: Some(bbox),
            pose,
            admitted,
        }
    }
}

/// Size first, then centring, then head rotation.
pub fn classify(
    bbox: &NormalizedFaceBbox,
    pose: Option<&FacePose>,
    t: &GateThresholds,
) -> FaceState {
    if bbox.height < t.min_face_height {
        return FaceState::TooFar;
    }
    if bbox.height > t.max_face_height {
        return FaceState::TooClose;
    }

    let (cx, cy) = bbox.center();
    if (cx - 0.5).abs() > t.max_center_offset || (cy - 0.5).abs() > t.max_center_offset {
        return FaceState::NotCentered;
    }

    if let Some(pose) = pose {
        let r = pose.rotation;
        if r.yaw.abs() > t.max_yaw_deg
            || r.pitch.abs() > t.max_pitch_deg
            || r.roll.abs() > t.max_roll_deg
        {
            return FaceState::NotCentered;
        }
    }

    FaceState::Ok
}
