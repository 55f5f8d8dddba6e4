use crate::shared::frame::Frame;

use super::face_landmarks::FaceLandmarks;

/// Skin ROI as fractions of the face box: `(left, top, right, bottom)`.
/// Covers forehead and upper cheeks, excluding eyes-to-chin clutter.
const BOX_ROI: (f64, f64, f64, f64) = (0.2, 0.1, 0.8, 0.6);

/// Minimum ROI area in pixels for a sample to be meaningful.
const MIN_ROI_PIXELS: u32 = 16;

/// Pixel rectangle `(x0, y0, x1, y1)`, half-open.
pub type PixelRect = (u32, u32, u32, u32);

/// Samples the PPG value from the skin region of a detected face: the green
/// channel over mean intensity, negated so that a blood-volume increase
/// reads as a rising value.
#[derive(Clone, Debug, Default)]
pub struct PpgSampler;

impl PpgSampler {
    pub fn new() -> Self {
        Self
    }

    /// Chooses the skin ROI for a face box in pixel corners `(x1, y1, x2, y2)`.
    ///
    /// With landmarks, the ROI spans the eye corners horizontally and runs
    /// from above the eyes down to the nose; otherwise a fixed fraction of
    /// the box is used.
    pub fn skin_roi(
        &self,
        face_box: (f64, f64, f64, f64),
        landmarks: Option<&FaceLandmarks>,
        frame_w: u32,
        frame_h: u32,
    ) -> Option<PixelRect> {
        let (bx1, by1, bx2, by2) = face_box;
        let bw = bx2 - bx1;
        let bh = by2 - by1;
        if !(bw > 0.0 && bh > 0.0) {
            return None;
        }

        let roi = match landmarks.map(|lm| lm.points()) {
            Some(p) if p[0].0 > 0.0 && p[1].0 > 0.0 && p[2].0 > 0.0 => {
                let eye_y = (p[0].1 + p[1].1) / 2.0;
                (p[0].0, eye_y - 0.25 * bh, p[1].0, p[2].1)
            }
            _ => (
                bx1 + BOX_ROI.0 * bw,
                by1 + BOX_ROI.1 * bh,
                bx1 + BOX_ROI.2 * bw,
                by1 + BOX_ROI.3 * bh,
            ),
        };

        let clamp_x = |v: f64| v.clamp(0.0, frame_w as f64) as u32;
        let clamp_y = |v: f64| v.clamp(0.0, frame_h as f64) as u32;
        let rect = (
            clamp_x(roi.0.min(roi.2)),
            clamp_y(roi.1.min(roi.3)),
            clamp_x(roi.0.max(roi.2)),
            clamp_y(roi.1.max(roi.3)),
        );

        let area = (rect.2 - rect.0) * (rect.3 - rect.1);
        (area >= MIN_ROI_PIXELS).then_some(rect)
    }

    pub fn sample(&self, frame: &Frame, roi: PixelRect) -> Option<f64> {
        let [r, g, b] = frame.mean_rgb(roi.0, roi.1, roi.2, roi.3)?;
        let intensity = (r + g + b) / 3.0;
        (intensity > 1.0).then(|| -g / intensity)
    }
}
