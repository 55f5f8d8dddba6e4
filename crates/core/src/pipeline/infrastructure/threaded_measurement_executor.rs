use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::extraction::domain::frame_feature_extractor::{FrameFeatureExtractor, FrameSample};
use crate::measurement::measurement_engine::MeasurementEngine;
use crate::pipeline::measurement_executor::{
    MeasurementExecutor, MeasurementProgress, MeasurementRunConfig,
};
use crate::pipeline::measurement_logger::MeasurementLogger;
use crate::shared::frame::Frame;
use crate::video::domain::video_reader::VideoReader;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

type SendError = Box<dyn std::error::Error + Send + Sync>;

/// A sample together with the time the extractor spent on it.
struct Extracted {
    sample: FrameSample,
    extract_ms: f64,
}

/// Runs decoding and feature extraction on their own threads and feeds the
/// engine from the calling thread.
///
/// Layout: `reader → extract → main [engine]`
///
/// The extraction time of each frame is reported to the engine as its
/// processing latency, which drives the overload monitor.
pub struct ThreadedMeasurementExecutor {
    channel_capacity: usize,
}

impl ThreadedMeasurementExecutor {
    pub fn new() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            channel_capacity: capacity.max(1),
        }
    }
}

impl Default for ThreadedMeasurementExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementExecutor for ThreadedMeasurementExecutor {
    fn execute(
        &self,
        reader: Box<dyn VideoReader>,
        extractor: Box<dyn FrameFeatureExtractor>,
        engine: &mut MeasurementEngine,
        logger: &mut dyn MeasurementLogger,
        config: MeasurementRunConfig,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let cap = self.channel_capacity;
        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<Result<Frame, SendError>>(cap);
        let (sample_tx, sample_rx) =
            crossbeam_channel::bounded::<Result<Extracted, SendError>>(cap);

        let reader_handle = spawn_reader(reader, frame_tx, config.cancelled.clone());
        let extract_handle =
            spawn_extractor(extractor, frame_rx, sample_tx, config.cancelled.clone());

        let main_error = run_main_loop(sample_rx, engine, logger, &config);

        // Unblocks producers still waiting on a full channel.
        config.cancelled.store(true, Ordering::Relaxed);
        join_threads(reader_handle, extract_handle, main_error)
    }
}

fn spawn_reader(
    mut reader: Box<dyn VideoReader>,
    frame_tx: Sender<Result<Frame, SendError>>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<Box<dyn VideoReader>> {
    std::thread::spawn(move || {
        for frame_result in reader.frames() {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let mapped = frame_result.map_err(|e| -> SendError { e.to_string().into() });
            if frame_tx.send(mapped).is_err() {
                break;
            }
        }
        reader
    })
}

fn spawn_extractor(
    mut extractor: Box<dyn FrameFeatureExtractor>,
    frame_rx: Receiver<Result<Frame, SendError>>,
    sample_tx: Sender<Result<Extracted, SendError>>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<Box<dyn FrameFeatureExtractor>> {
    std::thread::spawn(move || {
        for frame_result in frame_rx {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            let result = frame_result.and_then(|frame| {
                let started = Instant::now();
                extractor
                    .extract(&frame)
                    .map(|sample| Extracted {
                        sample,
                        extract_ms: started.elapsed().as_secs_f64() * 1000.0,
                    })
                    .map_err(|e| -> SendError { e.to_string().into() })
            });
            if sample_tx.send(result).is_err() {
                break;
            }
        }
        extractor
    })
}

/// Feeds samples to the engine until the input ends, the session reaches
/// a terminal state or the run is cancelled. Owning the receiver means
/// returning early disconnects the extractor thread.
fn run_main_loop(
    sample_rx: Receiver<Result<Extracted, SendError>>,
    engine: &mut MeasurementEngine,
    logger: &mut dyn MeasurementLogger,
    config: &MeasurementRunConfig,
) -> Option<Box<dyn std::error::Error>> {
    let mut frames: usize = 0;
    let mut state = engine.state();

    for received in sample_rx {
        if config.cancelled.load(Ordering::Relaxed) {
            logger.info("Measurement cancelled");
            break;
        }
        let Extracted { sample, extract_ms } = match received {
            Ok(extracted) => extracted,
            Err(e) => return Some(e.to_string().into()),
        };
        logger.timing("extract", extract_ms);

        let started = Instant::now();
        let next = match engine.process_frame(&sample, Some(extract_ms)) {
            Ok(next) => next,
            Err(e) => return Some(Box::new(e)),
        };
        logger.timing("engine", started.elapsed().as_secs_f64() * 1000.0);
        if let Some(quality) = engine.signal_quality() {
            logger.metric("signal_quality", quality);
        }

        frames += 1;
        if next != state {
            logger.state_changed(state, next);
            state = next;
        }
        let progress = MeasurementProgress {
            frames,
            timestamp_sec: sample.timestamp_sec,
            state,
            percent: engine.progress_percent(),
        };
        logger.progress(frames, progress.percent);

        if let Some(callback) = &config.on_progress {
            if !callback(&progress) {
                logger.info("Measurement cancelled");
                break;
            }
        }
        if state.is_terminal() {
            break;
        }
    }
    None
}

/// Joins the worker threads and keeps the first error encountered.
fn join_threads(
    reader_handle: JoinHandle<Box<dyn VideoReader>>,
    extract_handle: JoinHandle<Box<dyn FrameFeatureExtractor>>,
    mut first_error: Option<Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    fn set_if_none(slot: &mut Option<Box<dyn std::error::Error>>, err: Box<dyn std::error::Error>) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    match reader_handle.join() {
        Ok(mut reader) => reader.close(),
        Err(_) => set_if_none(&mut first_error, "Reader thread panicked".into()),
    }
    if extract_handle.join().is_err() {
        set_if_none(&mut first_error, "Extract thread panicked".into());
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::domain::frame_feature_extractor::FaceObservation;
    use crate::measurement::domain::config::{EngineSettings, MeasurementPreset};
    use crate::measurement::domain::measurement_state::MeasurementState;
    use crate::pipeline::measurement_logger::{NullMeasurementLogger, StdoutMeasurementLogger};
    use crate::shared::geometry::NormalizedFaceBbox;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::video::domain::video_reader::FrameResult;
    use std::path::Path;
    use std::sync::Mutex;

    struct StubReader {
        count: usize,
        fps: f64,
        closed: Arc<Mutex<bool>>,
    }

    impl VideoReader for StubReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            Ok(VideoMetadata {
                width: 4,
                height: 4,
                fps: self.fps,
                total_frames: self.count,
                codec: String::new(),
                source_path: None,
                rotation: 0,
            })
        }

        fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
            let fps = self.fps;
            Box::new((0..self.count).map(move |i| {
                Ok(Frame::new(vec![0; 48], 4, 4, 3, i, i as f64 / fps))
            }))
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    /// Reports a centred frontal face and a pulse-like PPG value.
    struct PulseExtractor;

    impl FrameFeatureExtractor for PulseExtractor {
        fn extract(&mut self, frame: &Frame) -> Result<FrameSample, Box<dyn std::error::Error>> {
            let t = frame.timestamp_sec();
            Ok(FrameSample {
                timestamp_sec: t,
                face: Some(FaceObservation {
                    bbox: NormalizedFaceBbox {
                        x: 0.3,
                        y: 0.25,
                        width: 0.4,
                        height: 0.5,
                    },
                    pose: None,
                    confidence: 0.9,
                }),
                ppg_value: Some((2.0 * std::f64::consts::PI * 1.2 * t).sin()),
            })
        }
    }

    struct NoFaceExtractor;

    impl FrameFeatureExtractor for NoFaceExtractor {
        fn extract(&mut self, frame: &Frame) -> Result<FrameSample, Box<dyn std::error::Error>> {
            Ok(FrameSample::no_face(frame.timestamp_sec()))
        }
    }

    struct FailingExtractor;

    impl FrameFeatureExtractor for FailingExtractor {
        fn extract(&mut self, _frame: &Frame) -> Result<FrameSample, Box<dyn std::error::Error>> {
            Err("extractor error".into())
        }
    }

    fn reader(count: usize) -> (Box<dyn VideoReader>, Arc<Mutex<bool>>) {
        let closed = Arc::new(Mutex::new(false));
        let reader = StubReader {
            count,
            fps: 30.0,
            closed: closed.clone(),
        };
        (Box::new(reader), closed)
    }

    fn started_engine(preset: MeasurementPreset) -> MeasurementEngine {
        let mut engine = MeasurementEngine::new(EngineSettings::default());
        engine.set_measurement_preset(preset);
        engine.start().unwrap();
        engine
    }

    #[test]
    fn test_feeds_every_frame_and_closes_reader() {
        let (reader, closed) = reader(90);
        let mut engine = started_engine(MeasurementPreset::InfiniteHr);
        let mut logger = StdoutMeasurementLogger::new(1000);

        ThreadedMeasurementExecutor::new()
            .execute(
                reader,
                Box::new(PulseExtractor),
                &mut engine,
                &mut logger,
                MeasurementRunConfig::default(),
            )
            .unwrap();

        assert_eq!(logger.timings_for("extract").map(|t| t.len()), Some(90));
        assert_eq!(logger.timings_for("engine").map(|t| t.len()), Some(90));
        assert!(engine.state().is_running());
        assert!(logger
            .transitions()
            .iter()
            .any(|(from, _)| *from == MeasurementState::WaitingForFace));
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn test_stops_at_terminal_state() {
        // 40 s without a face fails the session at the 30 s signal timeout.
        let (reader, _) = reader(1200);
        let mut engine = started_engine(MeasurementPreset::OneMinuteHrHrvBr);
        let frames_seen = Arc::new(Mutex::new(0usize));
        let seen = frames_seen.clone();
        let config = MeasurementRunConfig {
            on_progress: Some(Box::new(move |p: &MeasurementProgress| {
                *seen.lock().unwrap() = p.frames;
                true
            })),
            ..Default::default()
        };

        ThreadedMeasurementExecutor::with_channel_capacity(2)
            .execute(
                reader,
                Box::new(NoFaceExtractor),
                &mut engine,
                &mut NullMeasurementLogger,
                config,
            )
            .unwrap();

        assert_eq!(engine.state(), MeasurementState::Failed);
        let seen = *frames_seen.lock().unwrap();
        assert!(seen < 1200, "fed {seen} frames after failing");
    }

    #[test]
    fn test_progress_callback_cancels() {
        let (reader, _) = reader(300);
        let mut engine = started_engine(MeasurementPreset::InfiniteHr);
        let cancelled = Arc::new(AtomicBool::new(false));
        let config = MeasurementRunConfig {
            on_progress: Some(Box::new(|p: &MeasurementProgress| p.frames < 10)),
            cancelled: cancelled.clone(),
        };

        ThreadedMeasurementExecutor::new()
            .execute(
                reader,
                Box::new(PulseExtractor),
                &mut engine,
                &mut NullMeasurementLogger,
                config,
            )
            .unwrap();

        assert_eq!(engine.buffer_len(), 0);
        assert!(cancelled.load(Ordering::Relaxed));
    }

    #[test]
    fn test_extractor_error_is_returned() {
        let (reader, closed) = reader(5);
        let mut engine = started_engine(MeasurementPreset::InfiniteHr);

        let result = ThreadedMeasurementExecutor::new().execute(
            reader,
            Box::new(FailingExtractor),
            &mut engine,
            &mut NullMeasurementLogger,
            MeasurementRunConfig::default(),
        );

        assert_eq!(result.unwrap_err().to_string(), "extractor error");
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn test_empty_input() {
        let (reader, _) = reader(0);
        let mut engine = started_engine(MeasurementPreset::InfiniteHr);

        ThreadedMeasurementExecutor::new()
            .execute(
                reader,
                Box::new(PulseExtractor),
                &mut engine,
                &mut NullMeasurementLogger,
                MeasurementRunConfig::default(),
            )
            .unwrap();
        assert_eq!(engine.state(), MeasurementState::WaitingForFace);
    }
}
