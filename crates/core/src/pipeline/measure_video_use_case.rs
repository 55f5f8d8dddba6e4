use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::extraction::domain::frame_feature_extractor::FrameFeatureExtractor;
use crate::measurement::domain::measurement_state::MeasurementState;
use crate::measurement::domain::results::MeasurementResults;
use crate::measurement::error::MeasurementError;
use crate::measurement::measurement_engine::MeasurementEngine;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;

use super::measurement_executor::{MeasurementExecutor, MeasurementProgress, MeasurementRunConfig};
use super::measurement_logger::MeasurementLogger;

/// Measures vitals over a recorded video or image sequence.
///
/// Starts a session on the given engine, hands the frames to a
/// `MeasurementExecutor`, and stops the session when the input runs out.
/// Single-use: `execute` consumes the reader and extractor.
pub struct MeasureVideoUseCase {
    reader: Option<Box<dyn VideoReader>>,
    extractor: Option<Box<dyn FrameFeatureExtractor>>,
    executor: Box<dyn MeasurementExecutor>,
    on_progress: Option<Box<dyn Fn(&MeasurementProgress) -> bool + Send>>,
    cancelled: Arc<AtomicBool>,
}

impl MeasureVideoUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        extractor: Box<dyn FrameFeatureExtractor>,
        executor: Box<dyn MeasurementExecutor>,
        on_progress: Option<Box<dyn Fn(&MeasurementProgress) -> bool + Send>>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            reader: Some(reader),
            extractor: Some(extractor),
            executor,
            on_progress,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    /// Runs one session to completion and returns its final results.
    ///
    /// Fails with [`MeasurementError::SessionFailed`] when the session ends
    /// in `Failed`, and with a plain error when the input ends before a
    /// fixed-duration session completes.
    pub fn execute(
        &mut self,
        engine: &mut MeasurementEngine,
        metadata: &VideoMetadata,
        logger: &mut dyn MeasurementLogger,
    ) -> Result<MeasurementResults, Box<dyn std::error::Error>> {
        let reader = self.reader.take().ok_or("Measurement already executed")?;
        let mut extractor = self.extractor.take().ok_or("Measurement already executed")?;
        extractor.reset();

        engine.start()?;
        let config = engine.session_config().cloned();
        logger.info(&format!(
            "Measuring {} frames at {:.1} fps ({})",
            metadata.total_frames,
            metadata.fps,
            match config.as_ref().and_then(|c| c.duration_sec()) {
                Some(sec) => format!("{sec:.0}s session"),
                None => "infinite session".to_string(),
            }
        ));

        let run = MeasurementRunConfig {
            on_progress: self.on_progress.take(),
            cancelled: self.cancelled.clone(),
        };
        let outcome = self.executor.execute(reader, extractor, engine, logger, run);
        if let Err(e) = outcome {
            engine.reset();
            return Err(e);
        }

        if engine.state().is_active() {
            let before = engine.state();
            engine.stop();
            logger.state_changed(before, engine.state());
        }
        logger.summary();

        match engine.state() {
            MeasurementState::Finished => engine
                .final_results()
                .ok_or_else(|| "Finished session has no results".into()),
            MeasurementState::Failed => Err(Box::new(MeasurementError::SessionFailed)),
            _ => Err("Input ended before the measurement completed".into()),
        }
    }
}
