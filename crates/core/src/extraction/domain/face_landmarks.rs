use crate::shared::geometry::{EulerAngles, FacePose, Vector3d};

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;
const LEFT_MOUTH: usize = 3;
const RIGHT_MOUTH: usize = 4;

/// Landmark weights: [left_eye, right_eye, nose, left_mouth, right_mouth].
/// The nose is the steadiest anchor across head rotations.
const WEIGHTS: [f64; 5] = [2.0, 2.0, 3.0, 1.0, 1.0];

/// Nose height between the eye line (0) and the mouth line (1) for a
/// level head.
const NEUTRAL_NOSE_RATIO: f64 = 0.55;

/// Eye span, as a fraction of frame width, of a face at unit distance.
const REFERENCE_EYE_SPAN: f64 = 0.12;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Pixel coordinates. Points with x <= 0 are treated as invisible.
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    pub fn has_visible(&self) -> bool {
        self.points.iter().any(|(x, _)| *x > 0.0)
    }

    fn visible(&self, idx: usize) -> Option<(f64, f64)> {
        let p = self.points[idx];
        (p.0 > 0.0).then_some(p)
    }

    /// Weighted centroid of visible landmarks (x > 0).
    pub fn center(&self) -> Option<(f64, f64)> {
        let mut wx_sum = 0.0;
        let mut wy_sum = 0.0;
        let mut w_sum = 0.0;

        for (i, (x, y)) in self.points.iter().enumerate() {
            if *x > 0.0 {
                wx_sum += x * WEIGHTS[i];
                wy_sum += y * WEIGHTS[i];
                w_sum += WEIGHTS[i];
            }
        }

        (w_sum > 0.0).then(|| (wx_sum / w_sum, wy_sum / w_sum))
    }

    /// Signed nose offset from the eye midpoint relative to eye span:
    /// 0.0 = frontal, positive = nose towards the right eye.
    fn yaw_offset(&self) -> Option<f64> {
        let nose = self.visible(NOSE)?;
        let left_eye = self.visible(LEFT_EYE)?;
        let right_eye = self.visible(RIGHT_EYE)?;

        let eye_span = right_eye.0 - left_eye.0;
        if eye_span.abs() <= f64::EPSILON {
            return None;
        }
        let eye_mid_x = (left_eye.0 + right_eye.0) / 2.0;
        Some(((nose.0 - eye_mid_x) / eye_span).clamp(-1.0, 1.0))
    }

    /// Head pose from landmark geometry.
    ///
    /// Yaw comes from the nose offset against the eye span, roll from the
    /// eye-line slope and pitch from the nose height between the eye and
    /// mouth lines. Position is the face centre relative to the frame
    /// centre (x, y in `[-0.5, 0.5]`) with a distance proxy in z.
    /// Returns `None` when eyes or nose are not visible.
    pub fn estimate_pose(&self, frame_w: u32, frame_h: u32) -> Option<FacePose> {
        let left_eye = self.visible(LEFT_EYE)?;
        let right_eye = self.visible(RIGHT_EYE)?;
        let nose = self.visible(NOSE)?;

        let yaw = (self.yaw_offset()? * 2.0).atan().to_degrees();
        let roll = (right_eye.1 - left_eye.1)
            .atan2(right_eye.0 - left_eye.0)
            .to_degrees();

        let eye_mid_y = (left_eye.1 + right_eye.1) / 2.0;
        let pitch = match (self.visible(LEFT_MOUTH), self.visible(RIGHT_MOUTH)) {
            (Some(lm), Some(rm)) => {
                let mouth_mid_y = (lm.1 + rm.1) / 2.0;
                let face_h = mouth_mid_y - eye_mid_y;
                if face_h > f64::EPSILON {
                    let ratio = (nose.1 - eye_mid_y) / face_h;
                    ((ratio - NEUTRAL_NOSE_RATIO) * 2.0).atan().to_degrees()
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let fw = (frame_w as f64).max(1.0);
        let fh = (frame_h as f64).max(1.0);
        let (cx, cy) = self.center()?;
        let eye_span = ((right_eye.0 - left_eye.0).hypot(right_eye.1 - left_eye.1) / fw).max(1e-6);

        Some(FacePose {
            position: Vector3d {
                x: cx / fw - 0.5,
                y: cy / fh - 0.5,
                z: REFERENCE_EYE_SPAN / eye_span,
            },
            rotation: EulerAngles { yaw, pitch, roll },
        })
    }
}
