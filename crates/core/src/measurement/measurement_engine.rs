use crossbeam_channel::Receiver;

use crate::extraction::domain::bbox_smoother::EmaBboxSmoother;
use crate::extraction::domain::frame_feature_extractor::FrameSample;
use crate::shared::geometry::{FacePose, NormalizedFaceBbox};

use super::domain::config::{
    CameraFacing, CustomMeasurementConfig, EngineSettings, GateThresholds, MeasurementPreset,
    OperatingMode, PrecisionMode, QualityThresholds, SessionConfig, SessionDuration,
};
use super::domain::device_stability::DeviceStabilityMonitor;
use super::domain::estimators::default_estimator;
use super::domain::events::{EventBus, MeasurementEvent};
use super::domain::face_quality_gate::{FaceQualityGate, GateDecision};
use super::domain::face_state::FaceState;
use super::domain::heartbeat::Heartbeat;
use super::domain::latency_monitor::LatencyMonitor;
use super::domain::measurement_state::MeasurementState;
use super::domain::result_aggregator::ResultAggregator;
use super::domain::results::{MeasurementResults, MomentaryHrValue};
use super::domain::signal_buffer::{SignalBuffer, SignalEntry};
use super::domain::state_machine::{FrameObservation, MeasurementStateMachine, StateTransition};
use super::error::MeasurementError;

/// Retained signal span for a session. Fixed sessions keep everything from
/// start to finish, including BAD stretches that run past the nominal
/// duration; infinite sessions keep the widest window any active estimator
/// reads.
pub fn retention_sec(config: &SessionConfig) -> f64 {
    if let SessionDuration::Fixed(_) = config.duration {
        return f64::INFINITY;
    }
    config
        .active_estimators()
        .into_iter()
        .map(|kind| {
            let min_window = default_estimator(kind).requirements().min_window_sec;
            config
                .realtime_period(kind)
                .map_or(min_window, |period| period.max(min_window))
        })
        .fold(0.0, f64::max)
}

/// Admitted signal needed before the least demanding active estimator can
/// produce a value.
pub fn min_signal_sec(config: &SessionConfig) -> f64 {
    config
        .active_estimators()
        .into_iter()
        .map(|kind| default_estimator(kind).requirements().min_window_sec)
        .reduce(f64::min)
        .unwrap_or(0.0)
}

/// Host-facing engine for one measurement session at a time.
pub struct MeasurementEngine {
    settings: EngineSettings,
    precision: PrecisionMode,
    requested_mode: OperatingMode,
    facing: CameraFacing,
    preset: MeasurementPreset,
    custom_config: Option<CustomMeasurementConfig>,
    gate: FaceQualityGate,
    stability: DeviceStabilityMonitor,
    state_machine: MeasurementStateMachine,
    latency: LatencyMonitor,
    buffer: SignalBuffer,
    session: Option<ResultAggregator>,
    events: EventBus,
    decision: Option<GateDecision>,
    last_timestamp: Option<f64>,
}

impl MeasurementEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let precision = PrecisionMode::default();
        let facing = CameraFacing::default();
        Self {
            gate: FaceQualityGate::new(
                GateThresholds::for_mode(precision),
                facing,
                Box::new(EmaBboxSmoother::default()),
            ),
            stability: DeviceStabilityMonitor::new(
                settings.quality_window_sec,
                settings.pose_instability_deg,
                settings.bbox_instability,
            ),
            state_machine: MeasurementStateMachine::new(
                settings,
                QualityThresholds::for_mode(precision),
            ),
            latency: LatencyMonitor::new(
                settings.latency_budget_ms,
                settings.overload_sustain_frames,
            ),
            buffer: SignalBuffer::new(0.0),
            session: None,
            events: EventBus::new(),
            decision: None,
            last_timestamp: None,
            settings,
            precision,
            requested_mode: OperatingMode::default(),
            facing,
            preset: MeasurementPreset::default(),
            custom_config: None,
        }
    }

    // --- configuration ---

    pub fn set_precision_mode(&mut self, precision: PrecisionMode) {
        self.precision = precision;
        self.gate.set_thresholds(GateThresholds::for_mode(precision));
        self.state_machine
            .set_quality_thresholds(QualityThresholds::for_mode(precision));
    }

    pub fn precision_mode(&self) -> PrecisionMode {
        self.precision
    }

    /// `Positioning` discards an active session; `SystemOverloaded` is
    /// reported by the engine and cannot be requested.
    pub fn set_operating_mode(&mut self, mode: OperatingMode) {
        match mode {
            OperatingMode::SystemOverloaded => {
                log::warn!("SystemOverloaded is engine-reported and cannot be set");
            }
            OperatingMode::Positioning => {
                if self.state_machine.state().is_active() {
                    log::info!("Positioning mode requested, discarding the active session");
                    self.discard_session();
                }
                self.requested_mode = mode;
            }
            OperatingMode::Measure => self.requested_mode = mode,
        }
    }

    /// The requested mode, or `SystemOverloaded` while frame processing is
    /// persistently over budget in `Measure` mode.
    pub fn operating_mode(&self) -> OperatingMode {
        if self.requested_mode == OperatingMode::Measure && self.latency.is_overloaded() {
            OperatingMode::SystemOverloaded
        } else {
            self.requested_mode
        }
    }

    pub fn set_camera_facing(&mut self, facing: CameraFacing) {
        self.facing = facing;
        self.gate.set_facing(facing);
    }

    pub fn camera_facing(&self) -> CameraFacing {
        self.facing
    }

    /// Takes effect at the next `start()`.
    pub fn set_measurement_preset(&mut self, preset: MeasurementPreset) {
        self.preset = preset;
    }

    pub fn measurement_preset(&self) -> MeasurementPreset {
        self.preset
    }

    /// Takes effect at the next `start()`. Only valid with the `Custom` preset.
    pub fn set_custom_config(&mut self, config: Option<CustomMeasurementConfig>) {
        self.custom_config = config;
    }

    pub fn custom_config(&self) -> Option<&CustomMeasurementConfig> {
        self.custom_config.as_ref()
    }

    pub fn subscribe(&mut self) -> Receiver<MeasurementEvent> {
        self.events.subscribe()
    }

    // --- session control ---

    pub fn start(&mut self) -> Result<(), MeasurementError> {
        if self.requested_mode == OperatingMode::Positioning {
            return Err(MeasurementError::PositioningMode);
        }
        match self.state_machine.state() {
            MeasurementState::Failed => return Err(MeasurementError::SessionFailed),
            MeasurementState::Finished => return Err(MeasurementError::SessionFinished),
            state if state.is_active() => return Err(MeasurementError::SessionActive),
            _ => {}
        }
        let config = SessionConfig::resolve(self.preset, self.custom_config.as_ref())?;

        let retention = retention_sec(&config);
        let min_signal = min_signal_sec(&config);
        log::info!(
            "Starting {:?} session: {:?}, retention {retention}s, GOOD after {min_signal}s",
            self.preset,
            config.duration
        );

        self.buffer.clear();
        self.buffer.set_retention(retention);
        self.gate.reset();
        self.stability.reset();
        self.state_machine.start(config.duration, min_signal);
        self.session = Some(ResultAggregator::new(config, &self.settings));
        self.events.emit(MeasurementEvent::StartRequested);
        Ok(())
    }

    /// Safe in any state. Infinite sessions with good signal finish with a
    /// summary of what was collected; anything else active is discarded.
    pub fn stop(&mut self) {
        if !self.state_machine.state().is_active() {
            return;
        }
        self.events.emit(MeasurementEvent::StopRequested);
        match self.state_machine.stop() {
            Some(t) if t.to == MeasurementState::Finished => self.finish(),
            _ => self.discard_session(),
        }
    }

    /// Back to `NotStarted` from any state, dropping all session data.
    pub fn reset(&mut self) {
        self.state_machine.reset();
        self.discard_session();
        self.decision = None;
        self.last_timestamp = None;
        self.latency.reset();
    }

    /// Capture-layer failure: an active session goes to `Failed`.
    pub fn report_camera_error(&mut self) {
        if self.state_machine.fail().is_some() {
            log::error!("Camera failure reported, measurement failed");
        }
    }

    /// Feeds one frame. Frames must arrive with strictly increasing
    /// timestamps. Frames outside an active session only update face
    /// feedback.
    pub fn process_frame(
        &mut self,
        sample: &FrameSample,
        processing_latency_ms: Option<f64>,
    ) -> Result<MeasurementState, MeasurementError> {
        let ts = sample.timestamp_sec;
        if let Some(last) = self.last_timestamp {
            if !(ts > last) {
                return Err(MeasurementError::NonMonotonicTimestamp { last, got: ts });
            }
        }
        self.last_timestamp = Some(ts);

        if let Some(latency) = processing_latency_ms {
            self.latency.record(latency);
        }

        let decision = self.gate.evaluate(sample);
        self.stability
            .observe(ts, decision.bbox.as_ref(), decision.pose.map(|p| p.rotation));
        self.decision = Some(decision);

        let state = self.state_machine.state();
        if self.requested_mode == OperatingMode::Positioning || !state.is_active() {
            return Ok(state);
        }

        let signal_quality = if state.is_running() {
            self.buffer.push(SignalEntry {
                timestamp_sec: ts,
                ppg_value: sample.ppg_value,
                admitted: decision.admitted,
            })?;
            self.buffer.admitted_ratio(self.settings.quality_window_sec)
        } else {
            None
        };

        let transition = self.state_machine.on_frame(&FrameObservation {
            timestamp_sec: ts,
            face_state: decision.face_state,
            admitted: decision.admitted,
            signal_quality,
            device_unstable: self.stability.is_unstable(),
        });

        let good_sec = self.state_machine.good_signal_sec();
        if let Some(session) = self.session.as_mut() {
            if self.state_machine.state().is_running() {
                session.on_tick(&self.buffer, ts, good_sec);
            }
        }
        if let Some(StateTransition {
            to: MeasurementState::Finished,
            ..
        }) = transition
        {
            self.finish();
        }
        Ok(self.state_machine.state())
    }

    fn finish(&mut self) {
        let good_sec = self.state_machine.good_signal_sec();
        if let Some(session) = self.session.as_mut() {
            session.finalize(&self.buffer, good_sec);
        }
        self.events.emit(MeasurementEvent::MeasurementFinished);
    }

    fn discard_session(&mut self) {
        if self.state_machine.state() != MeasurementState::NotStarted {
            self.state_machine.reset();
        }
        self.buffer.clear();
        self.session = None;
        self.gate.reset();
        self.stability.reset();
    }

    // --- queries ---

    pub fn state(&self) -> MeasurementState {
        self.state_machine.state()
    }

    pub fn progress_percent(&self) -> f64 {
        self.state_machine.progress_percent()
    }

    pub fn session_config(&self) -> Option<&SessionConfig> {
        self.session.as_ref().map(|s| s.config())
    }

    pub fn face_state(&self) -> FaceState {
        self.decision.map_or(FaceState::Unknown, |d| d.face_state)
    }

    pub fn face_bbox(&self) -> Option<NormalizedFaceBbox> {
        self.decision.and_then(|d| d.bbox)
    }

    pub fn face_pose(&self) -> Option<FacePose> {
        self.decision.and_then(|d| d.pose)
    }

    /// Instant metrics over exactly the trailing `period_sec`.
    pub fn realtime_metrics(&self, period_sec: f64) -> Option<MeasurementResults> {
        self.session.as_ref()?.realtime_metrics(
            &self.buffer,
            period_sec,
            self.state_machine.good_signal_sec(),
        )
    }

    /// Live snapshot refreshed once per tick, each metric over its own
    /// realtime period.
    pub fn current_metrics(&self) -> Option<MeasurementResults> {
        self.session.as_ref()?.current_metrics().cloned()
    }

    /// Summary of a finished session.
    pub fn final_results(&self) -> Option<MeasurementResults> {
        if self.state() != MeasurementState::Finished {
            return None;
        }
        self.session.as_ref()?.summary().cloned()
    }

    pub fn realtime_heartbeats(&self, max_time_sec: Option<f64>) -> Vec<Heartbeat> {
        self.session
            .as_ref()
            .map(|s| s.realtime_heartbeats(&self.buffer, max_time_sec))
            .unwrap_or_default()
    }

    /// Admitted pulse values over the retained span.
    pub fn full_ppg_signal(&self) -> Vec<f64> {
        self.buffer.full_window().values
    }

    /// Admitted pulse values over the trailing `period_sec`.
    pub fn ppg_signal(&self, period_sec: f64) -> Vec<f64> {
        self.buffer.window(period_sec).values
    }

    pub fn bad_signal_sec(&self) -> f64 {
        self.buffer.bad_signal_sec()
    }

    /// Admitted frame ratio over the quality window.
    pub fn signal_quality(&self) -> Option<f64> {
        self.buffer.admitted_ratio(self.settings.quality_window_sec)
    }

    pub fn heart_rate_4s(&self) -> Option<f64> {
        self.session.as_ref()?.heart_rate_4s()
    }

    pub fn heart_rate_10s(&self) -> Option<f64> {
        self.session.as_ref()?.heart_rate_10s()
    }

    pub fn heart_rate_history_4s(&self, max_time_sec: Option<f64>) -> Vec<MomentaryHrValue> {
        self.session
            .as_ref()
            .map(|s| s.heart_rate_history_4s(max_time_sec))
            .unwrap_or_default()
    }

    pub fn heart_rate_history_10s(&self, max_time_sec: Option<f64>) -> Vec<MomentaryHrValue> {
        self.session
            .as_ref()
            .map(|s| s.heart_rate_history_10s(max_time_sec))
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn retained_span_sec(&self) -> f64 {
        match (self.buffer.entries().next(), self.buffer.last_timestamp()) {
            (Some(first), Some(last)) => last - first.timestamp_sec,
            _ => 0.0,
        }
    }
}

impl Default for MeasurementEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::domain::frame_feature_extractor::FaceObservation;
    use crate::measurement::domain::config::Metric;
    use crate::measurement::error::ConfigError;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::f64::consts::PI;

    const FPS: f64 = 30.0;

    fn face_sample(i: usize) -> FrameSample {
        let t = i as f64 / FPS;
        FrameSample {
            timestamp_sec: t,
            face: Some(FaceObservation {
                bbox: NormalizedFaceBbox::from_params([0.5, 0.5, 0.3, 0.45]),
                pose: Some(FacePose::default()),
                confidence: 0.9,
            }),
            ppg_value: Some((2.0 * PI * 1.2 * t).sin()),
        }
    }

    fn run(engine: &mut MeasurementEngine, frames: std::ops::Range<usize>) {
        for i in frames {
            engine.process_frame(&face_sample(i), None).unwrap();
        }
    }

    #[rstest]
    #[case(MeasurementPreset::InfiniteHr, 10.0)]
    #[case(MeasurementPreset::InfiniteMetrics, 60.0)]
    fn test_retention(#[case] preset: MeasurementPreset, #[case] expected: f64) {
        let config = SessionConfig::resolve(preset, None).unwrap();
        assert_relative_eq!(retention_sec(&config), expected);
    }

    #[rstest]
    #[case(MeasurementPreset::OneMinuteHrHrvBr)]
    #[case(MeasurementPreset::ThirtySecondsUnvalidated)]
    fn test_fixed_sessions_never_evict(#[case] preset: MeasurementPreset) {
        let config = SessionConfig::resolve(preset, None).unwrap();
        assert!(retention_sec(&config).is_infinite());
    }

    #[test]
    fn test_infinite_custom_bp_retains_bp_window() {
        let custom = CustomMeasurementConfig {
            infinite_measurement: Some(true),
            instant_metrics: Some(vec![Metric::SystolicBp]),
            ..Default::default()
        };
        let config = SessionConfig::resolve(MeasurementPreset::Custom, Some(&custom)).unwrap();
        assert_relative_eq!(retention_sec(&config), 40.0);
        assert_relative_eq!(min_signal_sec(&config), 40.0);
    }

    #[test]
    fn test_min_signal_follows_least_demanding_estimator() {
        let config = SessionConfig::resolve(MeasurementPreset::OneMinuteHrHrvBr, None).unwrap();
        assert_relative_eq!(min_signal_sec(&config), 4.0);
    }

    #[test]
    fn test_start_rejected_in_positioning_mode() {
        let mut engine = MeasurementEngine::default();
        engine.set_operating_mode(OperatingMode::Positioning);
        assert_eq!(engine.start(), Err(MeasurementError::PositioningMode));
        assert_eq!(engine.state(), MeasurementState::NotStarted);

        run(&mut engine, 0..5);
        assert_eq!(engine.face_state(), FaceState::Ok);
        assert!(engine.face_bbox().is_some());
        assert_eq!(engine.state(), MeasurementState::NotStarted);
    }

    #[test]
    fn test_invalid_config_keeps_not_started() {
        let mut engine = MeasurementEngine::default();
        engine.set_custom_config(Some(CustomMeasurementConfig::default()));
        assert_eq!(
            engine.start(),
            Err(MeasurementError::Config(
                ConfigError::CustomConfigWithoutCustomPreset(MeasurementPreset::OneMinuteHrHrvBr)
            ))
        );
        assert_eq!(engine.state(), MeasurementState::NotStarted);

        engine.set_measurement_preset(MeasurementPreset::Custom);
        engine.set_custom_config(Some(CustomMeasurementConfig {
            instant_metrics: Some(vec![Metric::Bmi]),
            ..Default::default()
        }));
        assert!(matches!(
            engine.start(),
            Err(MeasurementError::Config(ConfigError::UnsupportedMetric(Metric::Bmi)))
        ));
    }

    #[test]
    fn test_second_start_rejected_while_active() {
        let mut engine = MeasurementEngine::default();
        engine.start().unwrap();
        assert_eq!(engine.start(), Err(MeasurementError::SessionActive));
        assert_eq!(engine.state(), MeasurementState::WaitingForFace);
    }

    #[test]
    fn test_non_monotonic_frame_rejected() {
        let mut engine = MeasurementEngine::default();
        engine.process_frame(&face_sample(10), None).unwrap();
        assert_eq!(
            engine.process_frame(&face_sample(10), None),
            Err(MeasurementError::NonMonotonicTimestamp {
                last: 10.0 / FPS,
                got: 10.0 / FPS
            })
        );
    }

    #[test]
    fn test_events_for_start_and_discarding_stop() {
        let mut engine = MeasurementEngine::default();
        let events = engine.subscribe();
        engine.start().unwrap();
        run(&mut engine, 0..90);
        assert_eq!(engine.state(), MeasurementState::RunningSignalShort);

        engine.stop();
        assert_eq!(engine.state(), MeasurementState::NotStarted);
        assert_eq!(engine.buffer_len(), 0);
        assert!(engine.realtime_metrics(10.0).is_none());
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![MeasurementEvent::StartRequested, MeasurementEvent::StopRequested]
        );
    }

    #[test]
    fn test_stop_when_idle_is_a_no_op() {
        let mut engine = MeasurementEngine::default();
        let events = engine.subscribe();
        engine.stop();
        assert_eq!(engine.state(), MeasurementState::NotStarted);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_camera_error_fails_until_reset() {
        let mut engine = MeasurementEngine::default();
        engine.start().unwrap();
        run(&mut engine, 0..60);
        engine.report_camera_error();
        assert_eq!(engine.state(), MeasurementState::Failed);
        assert_eq!(engine.start(), Err(MeasurementError::SessionFailed));
        assert!(engine.final_results().is_none());

        run(&mut engine, 60..70);
        assert_eq!(engine.state(), MeasurementState::Failed);

        engine.reset();
        assert_eq!(engine.state(), MeasurementState::NotStarted);
        assert!(engine.start().is_ok());
    }

    #[test]
    fn test_sustained_latency_reports_overload() {
        let mut engine = MeasurementEngine::default();
        for i in 0..60 {
            engine.process_frame(&face_sample(i), Some(200.0)).unwrap();
        }
        assert_eq!(engine.operating_mode(), OperatingMode::SystemOverloaded);
        for i in 60..200 {
            engine.process_frame(&face_sample(i), Some(5.0)).unwrap();
        }
        assert_eq!(engine.operating_mode(), OperatingMode::Measure);
    }

    #[test]
    fn test_overload_cannot_be_requested() {
        let mut engine = MeasurementEngine::default();
        engine.set_operating_mode(OperatingMode::SystemOverloaded);
        assert_eq!(engine.operating_mode(), OperatingMode::Measure);
    }

    #[test]
    fn test_positioning_discards_active_session() {
        let mut engine = MeasurementEngine::default();
        engine.start().unwrap();
        run(&mut engine, 0..60);
        engine.set_operating_mode(OperatingMode::Positioning);
        assert_eq!(engine.state(), MeasurementState::NotStarted);
        assert!(engine.session_config().is_none());
    }

    #[test]
    fn test_hr_available_while_running() {
        let mut engine = MeasurementEngine::default();
        engine.start().unwrap();
        run(&mut engine, 0..(12.0 * FPS) as usize);

        assert_eq!(engine.state(), MeasurementState::RunningSignalGood);
        let snapshot = engine.realtime_metrics(10.0).unwrap();
        assert_relative_eq!(snapshot.heart_rate_bpm.unwrap(), 72.0, epsilon = 2.0);
        assert!(snapshot.hrv_sdnn_ms.is_none());
        assert_relative_eq!(engine.signal_quality().unwrap(), 1.0);
        assert!(engine.heart_rate_4s().is_some());
        assert!(engine.progress_percent() > 0.0);
    }
}
