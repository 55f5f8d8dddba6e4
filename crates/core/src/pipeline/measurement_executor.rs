use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::extraction::domain::frame_feature_extractor::FrameFeatureExtractor;
use crate::measurement::domain::measurement_state::MeasurementState;
use crate::measurement::measurement_engine::MeasurementEngine;
use crate::video::domain::video_reader::VideoReader;

use super::measurement_logger::MeasurementLogger;

/// Where a run stands after a frame has been fed to the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementProgress {
    pub frames: usize,
    pub timestamp_sec: f64,
    pub state: MeasurementState,
    pub percent: f64,
}

/// Options for one executor run.
pub struct MeasurementRunConfig {
    /// Called after every frame; returning `false` cancels the run.
    pub on_progress: Option<Box<dyn Fn(&MeasurementProgress) -> bool + Send>>,
    pub cancelled: Arc<AtomicBool>,
}

impl Default for MeasurementRunConfig {
    fn default() -> Self {
        Self {
            on_progress: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Runs read → extract → engine until the input ends, the session reaches
/// a terminal state or the run is cancelled.
///
/// The engine is only touched from the calling thread; implementations are
/// free to decode and extract elsewhere. Session start and stop belong to
/// the caller.
pub trait MeasurementExecutor: Send {
    fn execute(
        &self,
        reader: Box<dyn VideoReader>,
        extractor: Box<dyn FrameFeatureExtractor>,
        engine: &mut MeasurementEngine,
        logger: &mut dyn MeasurementLogger,
        config: MeasurementRunConfig,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
