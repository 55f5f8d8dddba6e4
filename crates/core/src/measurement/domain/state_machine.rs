use super::config::{EngineSettings, QualityThresholds, SessionDuration};
use super::face_state::FaceState;
use super::measurement_state::{allowed_transition, MeasurementState};

/// What the state machine sees of one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameObservation {
    pub timestamp_sec: f64,
    pub face_state: FaceState,
    pub admitted: bool,
    /// Rolling admitted ratio over the quality window, once running.
    pub signal_quality: Option<f64>,
    pub device_unstable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateTransition {
    pub from: MeasurementState,
    pub to: MeasurementState,
    pub timestamp_sec: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct MeasurementStateMachine {
    state: MeasurementState,
    settings: EngineSettings,
    quality: QualityThresholds,
    duration: SessionDuration,
    /// Admitted seconds needed before the signal counts as GOOD.
    min_signal_sec: f64,
    started_at: Option<f64>,
    last_ts: Option<f64>,
    ok_since: Option<f64>,
    lost_since: Option<f64>,
    admitted_sec: f64,
    progress_sec: f64,
    good_sec: f64,
    reached_good: bool,
}

impl MeasurementStateMachine {
    pub fn new(settings: EngineSettings, quality: QualityThresholds) -> Self {
        Self {
            state: MeasurementState::NotStarted,
            settings,
            quality,
            duration: SessionDuration::Infinite,
            min_signal_sec: 0.0,
            started_at: None,
            last_ts: None,
            ok_since: None,
            lost_since: None,
            admitted_sec: 0.0,
            progress_sec: 0.0,
            good_sec: 0.0,
            reached_good: false,
        }
    }

    pub fn state(&self) -> MeasurementState {
        self.state
    }

    pub fn set_quality_thresholds(&mut self, quality: QualityThresholds) {
        self.quality = quality;
    }

    /// Seconds spent in `RunningSignalGood` this session.
    pub fn good_signal_sec(&self) -> f64 {
        self.good_sec
    }

    /// Whether the session has ever collected enough signal for GOOD.
    pub fn reached_good(&self) -> bool {
        self.reached_good
    }

    /// `NotStarted -> WaitingForFace`. Callers validate the request first.
    pub fn start(
        &mut self,
        duration: SessionDuration,
        min_signal_sec: f64,
    ) -> Option<StateTransition> {
        if self.state != MeasurementState::NotStarted {
            return None;
        }
        self.clear_session();
        self.duration = duration;
        self.min_signal_sec = min_signal_sec;
        self.transition(MeasurementState::WaitingForFace, None)
    }

    /// User stop. Infinite sessions that collected GOOD signal finish,
    /// anything else is discarded. Terminal states are left alone.
    pub fn stop(&mut self) -> Option<StateTransition> {
        if !self.state.is_active() {
            return None;
        }
        let target = if self.state.is_running()
            && self.duration == SessionDuration::Infinite
            && self.reached_good
        {
            MeasurementState::Finished
        } else {
            MeasurementState::NotStarted
        };
        let transition = self.transition(target, self.last_ts);
        if target == MeasurementState::NotStarted {
            self.clear_session();
        }
        transition
    }

    pub fn reset(&mut self) -> Option<StateTransition> {
        self.clear_session();
        self.transition(MeasurementState::NotStarted, None)
    }

    /// Capture-layer failure.
    pub fn fail(&mut self) -> Option<StateTransition> {
        if !self.state.is_active() {
            return None;
        }
        self.transition(MeasurementState::Failed, self.last_ts)
    }

    /// Progress in percent, never above 100.
    pub fn progress_percent(&self) -> f64 {
        match self.state {
            MeasurementState::NotStarted => 0.0,
            MeasurementState::Finished => 100.0,
            _ => match self.duration {
                SessionDuration::Fixed(total) => (self.progress_sec / total * 100.0).min(100.0),
                SessionDuration::Infinite => {
                    let tau = self.settings.infinite_progress_tau_sec;
                    100.0 * (1.0 - (-self.progress_sec / tau).exp())
                }
            },
        }
    }

    pub fn on_frame(&mut self, obs: &FrameObservation) -> Option<StateTransition> {
        let ts = obs.timestamp_sec;
        let dt = self.last_ts.map_or(0.0, |last| (ts - last).max(0.0));
        self.last_ts = Some(ts);

        if !self.state.is_active() {
            return None;
        }
        let started_at = *self.started_at.get_or_insert(ts);

        if !self.reached_good && ts - started_at > self.settings.signal_timeout_sec {
            log::warn!("No usable signal within {}s", self.settings.signal_timeout_sec);
            return self.transition(MeasurementState::Failed, Some(ts));
        }

        if self.state == MeasurementState::WaitingForFace {
            if !obs.face_state.is_ok() {
                self.ok_since = None;
                return None;
            }
            let ok_since = *self.ok_since.get_or_insert(ts);
            if ts - ok_since >= self.settings.stabilization_sec {
                return self.transition(MeasurementState::RunningSignalShort, Some(ts));
            }
            return None;
        }

        // Running from here on.
        if matches!(
            self.state,
            MeasurementState::RunningSignalShort | MeasurementState::RunningSignalGood
        ) {
            self.progress_sec += dt;
        }
        if self.state == MeasurementState::RunningSignalGood {
            self.good_sec += dt;
        }
        if obs.admitted {
            self.admitted_sec += dt;
        }

        if obs.face_state.is_lost() {
            let lost_since = *self.lost_since.get_or_insert(ts);
            if ts - lost_since > self.settings.face_lost_grace_sec {
                log::warn!("Face lost for more than {}s", self.settings.face_lost_grace_sec);
                return self.transition(MeasurementState::Failed, Some(ts));
            }
        } else {
            self.lost_since = None;
        }

        if let SessionDuration::Fixed(total) = self.duration {
            if self.progress_sec >= total {
                return self.transition(MeasurementState::Finished, Some(ts));
            }
        }

        let quality = obs.signal_quality.unwrap_or(0.0);
        let next = match self.state {
            MeasurementState::RunningSignalShort if self.admitted_sec >= self.min_signal_sec => {
                Some(MeasurementState::RunningSignalGood)
            }
            MeasurementState::RunningSignalGood if quality < self.quality.enter_bad_below => {
                Some(MeasurementState::RunningSignalBad)
            }
            MeasurementState::RunningSignalBad | MeasurementState::RunningSignalBadDeviceUnstable
                if quality >= self.quality.exit_bad_at =>
            {
                Some(MeasurementState::RunningSignalGood)
            }
            MeasurementState::RunningSignalBad if obs.device_unstable => {
                Some(MeasurementState::RunningSignalBadDeviceUnstable)
            }
            MeasurementState::RunningSignalBadDeviceUnstable if !obs.device_unstable => {
                Some(MeasurementState::RunningSignalBad)
            }
            _ => None,
        };
        next.and_then(|to| self.transition(to, Some(ts)))
    }

    fn transition(&mut self, to: MeasurementState, ts: Option<f64>) -> Option<StateTransition> {
        let from = self.state;
        if from == to || !allowed_transition(from, to) {
            return None;
        }
        if to == MeasurementState::RunningSignalGood {
            self.reached_good = true;
        }
        self.state = to;
        log::info!("Measurement state {from:?} -> {to:?}");
        Some(StateTransition {
            from,
            to,
            timestamp_sec: ts,
        })
    }

    fn clear_session(&mut self) {
        self.started_at = None;
        self.last_ts = None;
        self.ok_since = None;
        self.lost_since = None;
        self.admitted_sec = 0.0;
        self.progress_sec = 0.0;
        self.good_sec = 0.0;
        self.reached_good = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::domain::config::PrecisionMode;
    use approx::assert_relative_eq;
    use MeasurementState::*;

    const DT: f64 = 1.0 / 30.0;

    fn machine() -> MeasurementStateMachine {
        MeasurementStateMachine::new(
            EngineSettings::default(),
            QualityThresholds::for_mode(PrecisionMode::Strict),
        )
    }

    fn obs(ts: f64, face_state: FaceState, admitted: bool, quality: f64) -> FrameObservation {
        FrameObservation {
            timestamp_sec: ts,
            face_state,
            admitted,
            signal_quality: Some(quality),
            device_unstable: false,
        }
    }

    /// Feeds `frames` good frames starting at frame index `from`.
    fn feed_good(sm: &mut MeasurementStateMachine, from: usize, frames: usize) {
        for i in from..from + frames {
            sm.on_frame(&obs(i as f64 * DT, FaceState::Ok, true, 1.0));
        }
    }

    #[test]
    fn test_waits_for_stable_face() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        assert_eq!(sm.state(), WaitingForFace);

        feed_good(&mut sm, 0, 29);
        assert_eq!(sm.state(), WaitingForFace);
        feed_good(&mut sm, 29, 3);
        assert_eq!(sm.state(), RunningSignalShort);
    }

    #[test]
    fn test_face_interruption_restarts_stabilization() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        feed_good(&mut sm, 0, 20);
        sm.on_frame(&obs(20.0 * DT, FaceState::TooFar, false, 0.0));
        feed_good(&mut sm, 21, 25);
        assert_eq!(sm.state(), WaitingForFace);
    }

    #[test]
    fn test_short_to_good_after_minimum_signal() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        feed_good(&mut sm, 0, 140);
        assert_eq!(sm.state(), RunningSignalShort);
        feed_good(&mut sm, 140, 20);
        assert_eq!(sm.state(), RunningSignalGood);
        assert!(sm.reached_good());
    }

    #[test]
    fn test_quality_hysteresis() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        feed_good(&mut sm, 0, 200);
        assert_eq!(sm.state(), RunningSignalGood);

        let mut t = 200.0 * DT;
        let mut step = |sm: &mut MeasurementStateMachine, q: f64| {
            t += DT;
            sm.on_frame(&obs(t, FaceState::Ok, q > 0.5, q));
            sm.state()
        };
        assert_eq!(step(&mut sm, 0.65), RunningSignalGood);
        assert_eq!(step(&mut sm, 0.55), RunningSignalBad);
        assert_eq!(step(&mut sm, 0.75), RunningSignalBad);
        assert_eq!(step(&mut sm, 0.8), RunningSignalGood);
    }

    #[test]
    fn test_bad_signal_from_unstable_device() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        feed_good(&mut sm, 0, 200);

        let frame = |sm: &mut MeasurementStateMachine, i: usize, q: f64, unstable: bool| {
            sm.on_frame(&FrameObservation {
                timestamp_sec: i as f64 * DT,
                face_state: FaceState::NotCentered,
                admitted: false,
                signal_quality: Some(q),
                device_unstable: unstable,
            });
            sm.state()
        };
        assert_eq!(frame(&mut sm, 200, 0.4, true), RunningSignalBad);
        assert_eq!(frame(&mut sm, 201, 0.3, true), RunningSignalBadDeviceUnstable);
        assert_eq!(frame(&mut sm, 202, 0.3, false), RunningSignalBad);
        assert_eq!(frame(&mut sm, 203, 0.3, true), RunningSignalBadDeviceUnstable);
        assert_eq!(frame(&mut sm, 204, 0.9, true), RunningSignalGood);
    }

    #[test]
    fn test_fixed_duration_finishes() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(30.0), 4.0);
        feed_good(&mut sm, 0, 30 * 30 + 30);
        assert_eq!(sm.state(), RunningSignalGood);
        feed_good(&mut sm, 930, 5);
        assert_eq!(sm.state(), Finished);
        assert_relative_eq!(sm.progress_percent(), 100.0);
    }

    #[test]
    fn test_fixed_progress_is_linear() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        feed_good(&mut sm, 0, 30 + 30 * 15 + 1);
        assert_relative_eq!(sm.progress_percent(), 25.0, epsilon = 0.5);
    }

    #[test]
    fn test_infinite_progress_saturates_below_100() {
        let mut sm = machine();
        sm.start(SessionDuration::Infinite, 4.0);
        feed_good(&mut sm, 0, 30 * 600);
        let p = sm.progress_percent();
        assert!(p > 99.0 && p < 100.0, "{p}");
        assert_eq!(sm.state(), RunningSignalGood);
    }

    #[test]
    fn test_timeout_without_face_fails() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        for i in 0..(31 * 30) {
            sm.on_frame(&obs(i as f64 * DT, FaceState::NotVisible, false, 0.0));
        }
        assert_eq!(sm.state(), Failed);
    }

    #[test]
    fn test_face_lost_while_running_fails_after_grace() {
        let mut sm = machine();
        sm.start(SessionDuration::Infinite, 4.0);
        feed_good(&mut sm, 0, 300);
        for i in 300..(300 + 4 * 30) {
            sm.on_frame(&obs(i as f64 * DT, FaceState::NotVisible, false, 0.0));
        }
        assert_ne!(sm.state(), Failed);
        for i in (300 + 4 * 30)..(300 + 6 * 30) {
            sm.on_frame(&obs(i as f64 * DT, FaceState::NotVisible, false, 0.0));
        }
        assert_eq!(sm.state(), Failed);
    }

    #[test]
    fn test_stop_infinite_with_signal_finishes() {
        let mut sm = machine();
        sm.start(SessionDuration::Infinite, 4.0);
        feed_good(&mut sm, 0, 300);
        let t = sm.stop().unwrap();
        assert_eq!((t.from, t.to), (RunningSignalGood, Finished));
    }

    #[test]
    fn test_stop_fixed_or_early_discards() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        feed_good(&mut sm, 0, 300);
        assert_eq!(sm.stop().unwrap().to, NotStarted);
        assert_relative_eq!(sm.progress_percent(), 0.0);

        sm.start(SessionDuration::Infinite, 4.0);
        feed_good(&mut sm, 0, 60);
        assert_eq!(sm.stop().unwrap().to, NotStarted);
    }

    #[test]
    fn test_terminal_states_ignore_stop_and_need_reset() {
        let mut sm = machine();
        sm.start(SessionDuration::Fixed(60.0), 4.0);
        sm.fail();
        assert_eq!(sm.state(), Failed);
        assert!(sm.stop().is_none());
        assert!(sm.start(SessionDuration::Fixed(60.0), 4.0).is_none());
        sm.reset();
        assert_eq!(sm.state(), NotStarted);
        assert!(sm.start(SessionDuration::Fixed(60.0), 4.0).is_some());
    }

    #[test]
    fn test_random_observations_follow_allowed_edges() {
        // xorshift keeps the sequence reproducible
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };
        let faces = [
            FaceState::Ok,
            FaceState::Ok,
            FaceState::Ok,
            FaceState::TooFar,
            FaceState::NotVisible,
            FaceState::NotCentered,
        ];

        for _session in 0..20 {
            let mut sm = machine();
            let duration = if next() % 2 == 0 {
                SessionDuration::Infinite
            } else {
                SessionDuration::Fixed(20.0)
            };
            sm.start(duration, 4.0);
            let mut t = 0.0;
            for _ in 0..3000 {
                t += DT;
                let r = next();
                let face_state = faces[(r % faces.len() as u64) as usize];
                let quality = (r >> 8) as f64 % 1000.0 / 1000.0;
                let before = sm.state();
                let transition = match r % 997 {
                    0 => sm.stop(),
                    1 => sm.fail(),
                    _ => sm.on_frame(&FrameObservation {
                        timestamp_sec: t,
                        face_state,
                        admitted: face_state.is_ok(),
                        signal_quality: Some(quality),
                        device_unstable: (r >> 20) % 3 == 0,
                    }),
                };
                if let Some(tr) = transition {
                    assert_eq!(tr.from, before);
                    assert!(allowed_transition(tr.from, tr.to), "{:?} -> {:?}", tr.from, tr.to);
                } else {
                    assert_eq!(sm.state(), before);
                }
                let p = sm.progress_percent();
                assert!((0.0..=100.0).contains(&p));
            }
        }
    }
}
