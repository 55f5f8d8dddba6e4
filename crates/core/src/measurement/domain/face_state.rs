use serde::{Deserialize, Serialize};

/// Positioning verdict for the current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaceState {
    Ok,
    TooFar,
    TooClose,
    NotCentered,
    NotVisible,
    #[default]
    Unknown,
}

impl FaceState {
    pub fn is_ok(self) -> bool {
        self == FaceState::Ok
    }

    /// No usable face at all, as opposed to a badly positioned one.
    pub fn is_lost(self) -> bool {
        matches!(self, FaceState::NotVisible | FaceState::Unknown)
    }
}
