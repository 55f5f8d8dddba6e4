use thiserror::Error;

use super::domain::config::{MeasurementPreset, Metric};

/// Invalid or contradictory session configuration. Rejected at `start()`,
/// leaving the engine in `NotStarted`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("custom configuration requires the Custom preset, got {0:?}")]
    CustomConfigWithoutCustomPreset(MeasurementPreset),
    #[error("the Custom preset requires a custom configuration")]
    MissingCustomConfig,
    #[error("durationSeconds and infiniteMeasurement are mutually exclusive")]
    DurationAndInfinite,
    #[error("{field} must be a positive finite number, got {value}")]
    InvalidValue { field: &'static str, value: f64 },
    #[error("metric {0:?} is not supported")]
    UnsupportedMetric(Metric),
    #[error("{0} must not be empty")]
    EmptyMetricList(&'static str),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("a measurement session is already active")]
    SessionActive,
    #[error("cannot start a measurement in positioning mode")]
    PositioningMode,
    #[error("frame timestamp {got} is not after the previous one ({last})")]
    NonMonotonicTimestamp { last: f64, got: f64 },
    #[error("the measurement session failed; reset before starting again")]
    SessionFailed,
    #[error("the measurement session finished; reset before starting again")]
    SessionFinished,
}
