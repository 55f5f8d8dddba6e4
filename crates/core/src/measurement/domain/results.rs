use serde::{Deserialize, Serialize};

use super::heartbeat::Heartbeat;

/// Snapshot of the vitals over one window. Fields are `None` when the
/// metric is not configured or its estimator lacked data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResults {
    pub heart_rate_bpm: Option<f64>,
    pub hrv_sdnn_ms: Option<f64>,
    pub hrv_lnrmssd_ms: Option<f64>,
    pub stress_index: Option<f64>,
    pub parasympathetic_activity: Option<f64>,
    pub breathing_rate_bpm: Option<f64>,
    pub systolic_blood_pressure_mmhg: Option<f64>,
    pub diastolic_blood_pressure_mmhg: Option<f64>,
    pub cardiac_workload_mmhg_per_sec: Option<f64>,
    pub heartbeats: Vec<Heartbeat>,
    /// Admitted over attempted frames in the window, in `[0, 1]`.
    pub average_signal_quality: f64,
}

/// One point of the short-window heart-rate history.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MomentaryHrValue {
    pub timestamp_sec: f64,
    pub hr_bpm: f64,
}
