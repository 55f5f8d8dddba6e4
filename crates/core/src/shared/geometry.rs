use serde::{Deserialize, Serialize};

/// Face bounding box in frame-relative coordinates: `(0, 0)` is the
/// top-left corner, `(1, 1)` the bottom-right.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFaceBbox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedFaceBbox {
    /// Builds a normalized box from pixel corners `(x1, y1, x2, y2)`.
    pub fn from_pixels(corners: (f64, f64, f64, f64), frame_w: u32, frame_h: u32) -> Self {
        let fw = (frame_w as f64).max(1.0);
        let fh = (frame_h as f64).max(1.0);
        Self {
            x: corners.0 / fw,
            y: corners.1 / fh,
            width: (corners.2 - corners.0) / fw,
            height: (corners.3 - corners.1) / fh,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Horizontal mirror, used to normalize environment-facing cameras.
    pub fn mirrored(&self) -> Self {
        Self {
            x: 1.0 - self.x - self.width,
            ..*self
        }
    }

    pub fn to_params(self) -> [f64; 4] {
        let (cx, cy) = self.center();
        [cx, cy, self.width, self.height]
    }

    pub fn from_params(params: [f64; 4]) -> Self {
        let [cx, cy, w, h] = params;
        Self {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            width: w,
            height: h,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Head rotation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FacePose {
    pub position: Vector3d,
    pub rotation: EulerAngles,
}

impl FacePose {
    pub fn mirrored(&self) -> Self {
        Self {
            position: Vector3d {
                x: -self.position.x,
                ..self.position
            },
            rotation: EulerAngles {
                yaw: -self.rotation.yaw,
                pitch: self.rotation.pitch,
                roll: -self.rotation.roll,
            },
        }
    }
}
