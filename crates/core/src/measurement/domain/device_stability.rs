use std::collections::VecDeque;

use crate::shared::geometry::{EulerAngles, NormalizedFaceBbox};

use super::dsp::std_dev;

#[derive(Clone, Copy, Debug)]
struct Observation {
    timestamp_sec: f64,
    center: (f64, f64),
    rotation: Option<EulerAngles>,
}

#[derive(Clone, Debug)]
pub struct DeviceStabilityMonitor {
    window_sec: f64,
    max_pose_std_deg: f64,
    max_center_std: f64,
    history: VecDeque<Observation>,
}

impl DeviceStabilityMonitor {
    pub fn new(window_sec: f64, max_pose_std_deg: f64, max_center_std: f64) -> Self {
        Self {
            window_sec,
            max_pose_std_deg,
            max_center_std,
            history: VecDeque::new(),
        }
    }

    pub fn observe(
        &mut self,
        timestamp_sec: f64,
        bbox: Option<&NormalizedFaceBbox>,
        rotation: Option<EulerAngles>,
    ) {
        if let Some(bbox) = bbox {
            self.history.push_back(Observation {
                timestamp_sec,
                center: bbox.center(),
                rotation,
            });
        }
        while self
            .history
            .front()
            .is_some_and(|o| timestamp_sec - o.timestamp_sec > self.window_sec)
        {
            self.history.pop_front();
        }
    }

    /// True when any pose angle or the box centre wanders more than allowed
    /// over the window.
    pub fn is_unstable(&self) -> bool {
        if self.history.len() < 3 {
            return false;
        }
        let series = |f: fn(&Observation) -> Option<f64>| -> Vec<f64> {
            self.history.iter().filter_map(f).collect()
        };
        let exceeds = |values: Vec<f64>, limit: f64| std_dev(&values).is_some_and(|s| s > limit);

        exceeds(series(|o| Some(o.center.0)), self.max_center_std)
            || exceeds(series(|o| Some(o.center.1)), self.max_center_std)
            || exceeds(series(|o| o.rotation.map(|r| r.yaw)), self.max_pose_std_deg)
            || exceeds(series(|o| o.rotation.map(|r| r.pitch)), self.max_pose_std_deg)
            || exceeds(series(|o| o.rotation.map(|r| r.roll)), self.max_pose_std_deg)
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
