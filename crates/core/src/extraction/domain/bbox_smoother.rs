use crate::shared::geometry::NormalizedFaceBbox;

/// Domain interface for temporal smoothing of the tracked face box.
pub trait BboxSmoother: Send {
    fn smooth(&mut self, bbox: NormalizedFaceBbox) -> NormalizedFaceBbox;

    /// Forgets history, e.g. after the face was lost.
    fn reset(&mut self);
}

/// EMA (Exponential Moving Average) smoother over `[cx, cy, w, h]`.
///
/// Formula: `ema[t] = alpha * current + (1 - alpha) * ema[t-1]`
pub struct EmaBboxSmoother {
    alpha: f64,
    state: Option<[f64; 4]>,
}

pub const DEFAULT_ALPHA: f64 = 0.6;

impl EmaBboxSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            state: None,
        }
    }
}

impl Default for EmaBboxSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl BboxSmoother for EmaBboxSmoother {
    fn smooth(&mut self, bbox: NormalizedFaceBbox) -> NormalizedFaceBbox {
        let current = bbox.to_params();
        let smoothed = match self.state {
            None => current,
            Some(prev) => {
                let mut result = [0.0; 4];
                for i in 0..4 {
                    result[i] = self.alpha * current[i] + (1.0 - self.alpha) * prev[i];
                }
                result
            }
        };
        self.state = Some(smoothed);
        NormalizedFaceBbox::from_params(smoothed)
    }

    fn reset(&mut self) {
        self.state = None;
    }
}
