use serde::{Deserialize, Serialize};

use crate::measurement::error::ConfigError;

/// Strictness of face gating and signal-quality hysteresis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrecisionMode {
    #[default]
    Strict,
    Relaxed,
}

/// What the engine does with incoming frames.
///
/// `SystemOverloaded` is reported by the engine, never requested by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingMode {
    Positioning,
    #[default]
    Measure,
    SystemOverloaded,
}

/// Which way the capturing camera faces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraFacing {
    #[default]
    User,
    Environment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    HeartRate,
    HrvSdnn,
    BreathingRate,
    SystolicBp,
    DiastolicBp,
    CardiacStress,
    PnsActivity,
    CardiacWorkload,
    Age,
    Bmi,
}

/// Estimator families. Several metrics can share one estimator
/// (systolic and diastolic BP, stress index and PNS activity).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimatorKind {
    HeartRate,
    Hrv,
    BreathingRate,
    BloodPressure,
    CardiacWorkload,
    CardiacStress,
}

impl Metric {
    /// Every metric the engine can compute from the pulse signal.
    pub const SUPPORTED: [Metric; 8] = [
        Metric::HeartRate,
        Metric::HrvSdnn,
        Metric::BreathingRate,
        Metric::SystolicBp,
        Metric::DiastolicBp,
        Metric::CardiacStress,
        Metric::PnsActivity,
        Metric::CardiacWorkload,
    ];

    /// `None` for metrics that need a face-appearance model.
    pub fn estimator(self) -> Option<EstimatorKind> {
        match self {
            Metric::HeartRate => Some(EstimatorKind::HeartRate),
            Metric::HrvSdnn => Some(EstimatorKind::Hrv),
            Metric::BreathingRate => Some(EstimatorKind::BreathingRate),
            Metric::SystolicBp | Metric::DiastolicBp => Some(EstimatorKind::BloodPressure),
            Metric::CardiacWorkload => Some(EstimatorKind::CardiacWorkload),
            Metric::CardiacStress | Metric::PnsActivity => Some(EstimatorKind::CardiacStress),
            Metric::Age | Metric::Bmi => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementPreset {
    #[default]
    OneMinuteHrHrvBr,
    OneMinuteBetaMetrics,
    InfiniteHr,
    InfiniteMetrics,
    FourtyFiveSecondsUnvalidated,
    ThirtySecondsUnvalidated,
    Custom,
}

/// Host overrides, only valid together with [`MeasurementPreset::Custom`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomMeasurementConfig {
    pub duration_seconds: Option<f64>,
    pub infinite_measurement: Option<bool>,
    pub instant_metrics: Option<Vec<Metric>>,
    pub summary_metrics: Option<Vec<Metric>>,
    pub realtime_hr_period_seconds: Option<f64>,
    pub realtime_hrv_period_seconds: Option<f64>,
    pub realtime_cardiac_stress_period_seconds: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionDuration {
    Fixed(f64),
    Infinite,
}

pub const DEFAULT_DURATION_SEC: f64 = 60.0;
pub const DEFAULT_REALTIME_HR_PERIOD_SEC: f64 = 10.0;
pub const DEFAULT_REALTIME_HRV_PERIOD_SEC: f64 = 60.0;
pub const DEFAULT_REALTIME_STRESS_PERIOD_SEC: f64 = 60.0;
pub const DEFAULT_REALTIME_BREATHING_PERIOD_SEC: f64 = 60.0;

/// The resolved, immutable configuration of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub duration: SessionDuration,
    pub instant_metrics: Vec<Metric>,
    pub summary_metrics: Vec<Metric>,
    pub realtime_hr_period_sec: f64,
    pub realtime_hrv_period_sec: f64,
    pub realtime_stress_period_sec: f64,
}

impl SessionConfig {
    pub fn resolve(
        preset: MeasurementPreset,
        custom: Option<&CustomMeasurementConfig>,
    ) -> Result<Self, ConfigError> {
        use Metric::*;

        let (duration, metrics) = match (preset, custom) {
            (MeasurementPreset::Custom, Some(custom)) => return Self::from_custom(custom),
            (MeasurementPreset::Custom, None) => return Err(ConfigError::MissingCustomConfig),
            (preset, Some(_)) => return Err(ConfigError::CustomConfigWithoutCustomPreset(preset)),
            (MeasurementPreset::OneMinuteHrHrvBr, None) => {
                (SessionDuration::Fixed(60.0), vec![HeartRate, HrvSdnn, BreathingRate])
            }
            (MeasurementPreset::OneMinuteBetaMetrics, None) => {
                (SessionDuration::Fixed(60.0), Metric::SUPPORTED.to_vec())
            }
            (MeasurementPreset::InfiniteHr, None) => (SessionDuration::Infinite, vec![HeartRate]),
            (MeasurementPreset::InfiniteMetrics, None) => (
                SessionDuration::Infinite,
                vec![HeartRate, HrvSdnn, BreathingRate, CardiacStress, PnsActivity],
            ),
            (MeasurementPreset::FourtyFiveSecondsUnvalidated, None) => {
                (SessionDuration::Fixed(45.0), vec![HeartRate, HrvSdnn, BreathingRate])
            }
            (MeasurementPreset::ThirtySecondsUnvalidated, None) => {
                (SessionDuration::Fixed(30.0), vec![HeartRate])
            }
        };

        Ok(Self {
            duration,
            summary_metrics: metrics.clone(),
            instant_metrics: metrics,
            realtime_hr_period_sec: DEFAULT_REALTIME_HR_PERIOD_SEC,
            realtime_hrv_period_sec: DEFAULT_REALTIME_HRV_PERIOD_SEC,
            realtime_stress_period_sec: DEFAULT_REALTIME_STRESS_PERIOD_SEC,
        })
    }

    fn from_custom(custom: &CustomMeasurementConfig) -> Result<Self, ConfigError> {
        let infinite = custom.infinite_measurement.unwrap_or(false);
        if infinite && custom.duration_seconds.is_some() {
            return Err(ConfigError::DurationAndInfinite);
        }

        let duration = if infinite {
            SessionDuration::Infinite
        } else {
            let secs = custom.duration_seconds.unwrap_or(DEFAULT_DURATION_SEC);
            SessionDuration::Fixed(positive("durationSeconds", secs)?)
        };

        let instant_metrics = custom
            .instant_metrics
            .clone()
            .unwrap_or_else(|| vec![Metric::HeartRate]);
        let summary_metrics = custom
            .summary_metrics
            .clone()
            .unwrap_or_else(|| instant_metrics.clone());
        validate_metrics("instantMetrics", &instant_metrics)?;
        validate_metrics("summaryMetrics", &summary_metrics)?;

        let period = |field: &'static str, value: Option<f64>, default: f64| {
            value.map_or(Ok(default), |v| positive(field, v))
        };

        Ok(Self {
            duration,
            instant_metrics,
            summary_metrics,
            realtime_hr_period_sec: period(
                "realtimeHrPeriodSeconds",
                custom.realtime_hr_period_seconds,
                DEFAULT_REALTIME_HR_PERIOD_SEC,
            )?,
            realtime_hrv_period_sec: period(
                "realtimeHrvPeriodSeconds",
                custom.realtime_hrv_period_seconds,
                DEFAULT_REALTIME_HRV_PERIOD_SEC,
            )?,
            realtime_stress_period_sec: period(
                "realtimeCardiacStressPeriodSeconds",
                custom.realtime_cardiac_stress_period_seconds,
                DEFAULT_REALTIME_STRESS_PERIOD_SEC,
            )?,
        })
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self.duration, SessionDuration::Infinite)
    }

    pub fn duration_sec(&self) -> Option<f64> {
        match self.duration {
            SessionDuration::Fixed(secs) => Some(secs),
            SessionDuration::Infinite => None,
        }
    }

    /// Estimators needed by the given metric list, deduplicated, in
    /// catalogue order.
    pub fn estimators_for(metrics: &[Metric]) -> Vec<EstimatorKind> {
        let mut kinds: Vec<EstimatorKind> = Vec::new();
        for kind in metrics.iter().filter_map(|m| m.estimator()) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Union of instant and summary estimators.
    pub fn active_estimators(&self) -> Vec<EstimatorKind> {
        let mut all = self.instant_metrics.clone();
        all.extend_from_slice(&self.summary_metrics);
        Self::estimators_for(&all)
    }

    /// Trailing window used for live display of an estimator, before
    /// clamping to the estimator's own minimum. `None` means the whole
    /// retained buffer.
    pub fn realtime_period(&self, kind: EstimatorKind) -> Option<f64> {
        match kind {
            EstimatorKind::HeartRate => Some(self.realtime_hr_period_sec),
            EstimatorKind::Hrv => Some(self.realtime_hrv_period_sec),
            EstimatorKind::CardiacStress => Some(self.realtime_stress_period_sec),
            EstimatorKind::BreathingRate => Some(DEFAULT_REALTIME_BREATHING_PERIOD_SEC),
            EstimatorKind::BloodPressure | EstimatorKind::CardiacWorkload => None,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue { field, value })
    }
}

fn validate_metrics(field: &'static str, metrics: &[Metric]) -> Result<(), ConfigError> {
    if metrics.is_empty() {
        return Err(ConfigError::EmptyMetricList(field));
    }
    match metrics.iter().find(|m| m.estimator().is_none()) {
        Some(&unsupported) => Err(ConfigError::UnsupportedMetric(unsupported)),
        None => Ok(()),
    }
}

/// Face-gating limits. Sizes and offsets are fractions of the frame,
/// angles are degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    pub min_face_height: f64,
    pub max_face_height: f64,
    pub max_center_offset: f64,
    pub max_yaw_deg: f64,
    pub max_pitch_deg: f64,
    pub max_roll_deg: f64,
}

impl GateThresholds {
    pub fn for_mode(mode: PrecisionMode) -> Self {
        match mode {
            PrecisionMode::Strict => Self {
                min_face_height: 0.2,
                max_face_height: 0.8,
                max_center_offset: 0.2,
                max_yaw_deg: 25.0,
                max_pitch_deg: 20.0,
                max_roll_deg: 20.0,
            },
            PrecisionMode::Relaxed => Self {
                min_face_height: 0.15,
                max_face_height: 0.9,
                max_center_offset: 0.3,
                max_yaw_deg: 35.0,
                max_pitch_deg: 30.0,
                max_roll_deg: 30.0,
            },
        }
    }
}

/// Rolling admitted-ratio hysteresis between GOOD and BAD signal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Drop to BAD when the ratio falls below this.
    pub enter_bad_below: f64,
    /// Return to GOOD once the ratio reaches this.
    pub exit_bad_at: f64,
}

impl QualityThresholds {
    pub fn for_mode(mode: PrecisionMode) -> Self {
        match mode {
            PrecisionMode::Strict => Self {
                enter_bad_below: 0.6,
                exit_bad_at: 0.8,
            },
            PrecisionMode::Relaxed => Self {
                enter_bad_below: 0.5,
                exit_bad_at: 0.7,
            },
        }
    }
}

/// Product-tuned timing and stability constants.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Continuous OK face time before the signal is collected.
    pub stabilization_sec: f64,
    /// Time allowed from start to first GOOD signal.
    pub signal_timeout_sec: f64,
    /// How long the face may be lost while running.
    pub face_lost_grace_sec: f64,
    /// Span of the rolling admitted ratio.
    pub quality_window_sec: f64,
    /// Live metrics are recomputed at most this often.
    pub tick_interval_sec: f64,
    /// Yaw/pitch/roll standard deviation that counts as device instability.
    pub pose_instability_deg: f64,
    /// Bbox-centre standard deviation (frame fractions) that counts as
    /// device instability.
    pub bbox_instability: f64,
    /// Minimum admitted fraction around a beat for it to be accepted.
    pub beat_min_quality: f64,
    /// Per-frame processing budget for the overload monitor.
    pub latency_budget_ms: f64,
    /// Consecutive frames over (or under) budget before the mode switches.
    pub overload_sustain_frames: u32,
    /// Time constant of the infinite-preset progress curve.
    pub infinite_progress_tau_sec: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stabilization_sec: 1.0,
            signal_timeout_sec: 30.0,
            face_lost_grace_sec: 5.0,
            quality_window_sec: 3.0,
            tick_interval_sec: 1.0,
            pose_instability_deg: 8.0,
            bbox_instability: 0.04,
            beat_min_quality: 0.8,
            latency_budget_ms: 50.0,
            overload_sustain_frames: 30,
            infinite_progress_tau_sec: 60.0,
        }
    }
}
