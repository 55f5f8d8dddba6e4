use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementState {
    #[default]
    NotStarted,
    WaitingForFace,
    RunningSignalShort,
    RunningSignalGood,
    RunningSignalBad,
    RunningSignalBadDeviceUnstable,
    Finished,
    Failed,
}

impl MeasurementState {
    pub fn is_running(self) -> bool {
        matches!(
            self,
            MeasurementState::RunningSignalShort
                | MeasurementState::RunningSignalGood
                | MeasurementState::RunningSignalBad
                | MeasurementState::RunningSignalBadDeviceUnstable
        )
    }

    /// A session is in progress and a new `start()` must be refused.
    pub fn is_active(self) -> bool {
        self == MeasurementState::WaitingForFace || self.is_running()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MeasurementState::Finished | MeasurementState::Failed)
    }
}

/// Whether the state machine may move directly from `from` to `to`.
pub fn allowed_transition(from: MeasurementState, to: MeasurementState) -> bool {
    use MeasurementState::*;
    match (from, to) {
        (_, NotStarted) => true,
        (NotStarted, WaitingForFace) => true,
        (WaitingForFace, RunningSignalShort) => true,
        (RunningSignalShort, RunningSignalGood) => true,
        (RunningSignalGood, RunningSignalBad) => true,
        (RunningSignalBad, RunningSignalGood) => true,
        (RunningSignalBad, RunningSignalBadDeviceUnstable) => true,
        (RunningSignalBadDeviceUnstable, RunningSignalBad) => true,
        (RunningSignalBadDeviceUnstable, RunningSignalGood) => true,
        (from, Finished) => from.is_running(),
        (from, Failed) => from.is_active(),
        _ => false,
    }
}
