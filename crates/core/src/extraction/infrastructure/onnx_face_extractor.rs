/// Face feature extractor using a YOLO pose model through ONNX Runtime (`ort`).
///
/// Handles letterbox preprocessing, inference and NMS, then picks the subject
/// face, derives its pose from the landmarks and samples the skin ROI for the
/// PPG value. Temporal smoothing is left to the quality gate.
use std::path::Path;

use crate::extraction::domain::face_landmarks::FaceLandmarks;
use crate::extraction::domain::frame_feature_extractor::{
    FaceObservation, FrameFeatureExtractor, FrameSample,
};
use crate::extraction::domain::ppg_sampler::PpgSampler;
use crate::shared::frame::Frame;
use crate::shared::geometry::NormalizedFaceBbox;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Number of keypoint values per detection (5 landmarks × x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

pub struct OnnxFaceExtractor {
    session: ort::session::Session,
    sampler: PpgSampler,
    confidence: f64,
    input_size: u32,
}

impl OnnxFaceExtractor {
    /// Load the ONNX model. The input resolution is read from the model's
    /// NCHW input shape, falling back to 640 when dynamic.
    pub fn new(
        model_path: &Path,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ref shape, .. }
                    if shape.len() >= 4 && shape[2] > 0 =>
                {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded face model {} (input {input_size}px)",
            model_path.display()
        );

        Ok(Self {
            session,
            sampler: PpgSampler::new(),
            confidence,
            input_size,
        })
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let (input_tensor, letterbox) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("face model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("unexpected face model output shape: {shape:?}").into());
        }

        // Output is [1, features, detections] (transposed) or
        // [1, detections, features].
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor.as_slice().ok_or("face model output is not contiguous")?;

        let mut dets = Vec::new();
        for i in 0..num_dets {
            let feature = |f: usize| -> f64 {
                if transposed {
                    data[f * num_dets + i] as f64
                } else {
                    data[i * num_feats + f] as f64
                }
            };
            if num_feats < 5 || feature(4) < self.confidence {
                continue;
            }
            if let Some(det) = parse_detection(&feature, num_feats, &letterbox) {
                dets.push(det);
            }
        }

        Ok(nms(&mut dets, NMS_IOU_THRESH))
    }
}

impl FrameFeatureExtractor for OnnxFaceExtractor {
    fn extract(&mut self, frame: &Frame) -> Result<FrameSample, Box<dyn std::error::Error>> {
        let timestamp_sec = frame.timestamp_sec();
        let dets = self.detect(frame)?;

        // The subject is the most confident face after NMS.
        let Some(best) = dets.into_iter().next() else {
            return Ok(FrameSample::no_face(timestamp_sec));
        };

        let (fw, fh) = (frame.width(), frame.height());
        let corners = (best.x1, best.y1, best.x2, best.y2);
        let landmarks = best.keypoints.map(FaceLandmarks::new);

        let bbox = NormalizedFaceBbox::from_pixels(corners, fw, fh);
        let pose = landmarks
            .as_ref()
            .filter(|lm| lm.has_visible())
            .and_then(|lm| lm.estimate_pose(fw, fh));

        let ppg_value = self
            .sampler
            .skin_roi(corners, landmarks.as_ref(), fw, fh)
            .and_then(|roi| self.sampler.sample(frame, roi));

        Ok(FrameSample {
            timestamp_sec,
            face: Some(FaceObservation {
                bbox,
                pose,
                confidence: best.confidence,
            }),
            ppg_value,
        })
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Mapping from letterboxed model coordinates back to frame pixels.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f64,
    pad_x: f64,
    pad_y: f64,
}

impl Letterbox {
    fn to_frame(self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size` NCHW float32.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray (YOLO convention).
    let gray = 114.0f32 / 255.0;
    let size = target_size as usize;
    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, size, size), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour resize into the padded region.
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f64,
            pad_y: pad_y as f64,
        },
    )
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
    keypoints: Option<[(f64, f64); 5]>,
}

/// Decodes one detection row `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]`
/// into frame pixel coordinates.
fn parse_detection(
    feature: &dyn Fn(usize) -> f64,
    num_feats: usize,
    lb: &Letterbox,
) -> Option<RawDetection> {
    let (cx, cy, w, h) = (feature(0), feature(1), feature(2), feature(3));
    if !(w > 0.0 && h > 0.0) {
        return None;
    }
    let (x1, y1) = lb.to_frame(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = lb.to_frame(cx + w / 2.0, cy + h / 2.0);

    let keypoints = (num_feats >= 5 + NUM_KEYPOINT_VALUES).then(|| {
        let mut pts = [(0.0f64, 0.0f64); 5];
        for (k, pt) in pts.iter_mut().enumerate() {
            let base = 5 + k * 3;
            // Low-confidence points stay at (0, 0), which FaceLandmarks
            // treats as invisible.
            if feature(base + 2) >= KEYPOINT_CONF_THRESH {
                *pt = lb.to_frame(feature(base), feature(base + 1));
            }
        }
        pts
    });

    Some(RawDetection {
        x1,
        y1,
        x2,
        y2,
        confidence: feature(4),
        keypoints,
    })
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        let overlaps = keep
            .iter()
            .any(|k| bbox_iou(&corners(k), &corners(det)) > iou_thresh);
        if !overlaps {
            keep.push(det.clone());
        }
    }
    keep
}

fn corners(d: &RawDetection) -> [f64; 4] {
    [d.x1, d.y1, d.x2, d.y2]
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
            keypoints: None,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → 640: scale 3.2, new 640x320, pad_y 160
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0, 0.0);
        let (tensor, lb) = letterbox(&frame, 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(lb.scale, 3.2, epsilon = 1e-9);
        assert_relative_eq!(lb.pad_x, 0.0);
        assert_relative_eq!(lb.pad_y, 160.0);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0, 0.0);
        let (tensor, lb) = letterbox(&frame, 640);

        let y = lb.pad_y as usize + 1;
        assert!((tensor[[0, 0, y, 1]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn test_letterbox_to_frame_inverts_padding() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0.0,
            pad_y: 100.0,
        };
        let (x, y) = lb.to_frame(200.0, 300.0);
        assert_relative_eq!(x, 100.0);
        assert_relative_eq!(y, 100.0);
    }

    #[test]
    fn test_parse_detection_with_keypoints() {
        let mut row = vec![100.0, 100.0, 40.0, 60.0, 0.9];
        // nose visible, everything else low-confidence
        for k in 0..5 {
            let conf = if k == 2 { 0.9 } else { 0.1 };
            row.extend_from_slice(&[100.0, 110.0, conf]);
        }
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let feature = |f: usize| row[f];
        let det = parse_detection(&feature, row.len(), &lb).unwrap();

        assert_relative_eq!(det.x1, 80.0);
        assert_relative_eq!(det.y2, 130.0);
        let kps = det.keypoints.unwrap();
        assert_eq!(kps[2], (100.0, 110.0));
        assert_eq!(kps[0], (0.0, 0.0));
    }

    #[test]
    fn test_parse_detection_rejects_degenerate_box() {
        let row = [100.0, 100.0, 0.0, 60.0, 0.9];
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let feature = |f: usize| row[f];
        assert!(parse_detection(&feature, row.len(), &lb).is_none());
    }

    #[test]
    fn test_nms_suppresses_overlapping_and_orders_by_confidence() {
        let mut dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.5),
            det(2.0, 2.0, 102.0, 102.0, 0.9),
            det(300.0, 300.0, 350.0, 350.0, 0.7),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert_relative_eq!(kept[0].confidence, 0.9);
        assert_relative_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn test_nms_empty_input() {
        let mut dets: Vec<RawDetection> = Vec::new();
        assert!(nms(&mut dets, 0.3).is_empty());
    }

    #[test]
    fn test_bbox_iou() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert_relative_eq!(bbox_iou(&b, &b), 1.0);
        assert_eq!(bbox_iou(&b, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }
}
