use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};

use facepulse_core::extraction::domain::frame_feature_extractor::FrameFeatureExtractor;
use facepulse_core::extraction::infrastructure::onnx_face_extractor::{
    OnnxFaceExtractor, DEFAULT_CONFIDENCE,
};
use facepulse_core::measurement::domain::config::{
    CameraFacing, CustomMeasurementConfig, EngineSettings, MeasurementPreset, PrecisionMode,
};
use facepulse_core::measurement::domain::results::MeasurementResults;
use facepulse_core::measurement::measurement_engine::MeasurementEngine;
use facepulse_core::pipeline::{
    infrastructure::threaded_measurement_executor::ThreadedMeasurementExecutor,
    measure_video_use_case::MeasureVideoUseCase, measurement_executor::MeasurementProgress,
    measurement_logger::StdoutMeasurementLogger,
};
use facepulse_core::risks::domain::health_risks::HealthRisks;
use facepulse_core::risks::domain::risk_engine::{
    compute_health_risks, maximal_risks, minimal_risks,
};
use facepulse_core::risks::domain::risk_factors::{Gender, Race, RisksFactors};
use facepulse_core::shared::constants::{DEFAULT_SEQUENCE_FPS, FACE_MODEL_NAME, FACE_MODEL_URL};
use facepulse_core::shared::model_resolver::{self, ModelSource};
use facepulse_core::video::domain::video_reader::VideoReader;
use facepulse_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use facepulse_core::video::infrastructure::image_sequence_reader::ImageSequenceReader;

/// Vital signs from face video and cardiovascular risk scores.
#[derive(Parser)]
#[command(name = "facepulse", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure vitals from a video file or a directory of frames.
    Measure(MeasureArgs),
    /// Score cardiovascular risk from known factors.
    Risks(RisksArgs),
}

#[derive(Args)]
struct MeasureArgs {
    /// Input video file, or a directory of images read as a sequence.
    input: PathBuf,

    /// Measurement preset.
    #[arg(long, value_enum, default_value = "one-minute")]
    preset: PresetArg,

    /// JSON file with a custom configuration (implies the custom preset).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Face gating strictness.
    #[arg(long, value_enum, default_value = "strict")]
    precision: PrecisionArg,

    /// Footage comes from a rear (environment-facing) camera.
    #[arg(long)]
    rear_camera: bool,

    /// Frame rate assumed for image sequences.
    #[arg(long, default_value_t = DEFAULT_SEQUENCE_FPS)]
    fps: f64,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f64,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    OneMinute,
    OneMinuteBeta,
    InfiniteHr,
    InfiniteMetrics,
    FortyFiveSeconds,
    ThirtySeconds,
}

impl From<PresetArg> for MeasurementPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::OneMinute => MeasurementPreset::OneMinuteHrHrvBr,
            PresetArg::OneMinuteBeta => MeasurementPreset::OneMinuteBetaMetrics,
            PresetArg::InfiniteHr => MeasurementPreset::InfiniteHr,
            PresetArg::InfiniteMetrics => MeasurementPreset::InfiniteMetrics,
            PresetArg::FortyFiveSeconds => MeasurementPreset::FourtyFiveSecondsUnvalidated,
            PresetArg::ThirtySeconds => MeasurementPreset::ThirtySecondsUnvalidated,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PrecisionArg {
    Strict,
    Relaxed,
}

impl From<PrecisionArg> for PrecisionMode {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Strict => PrecisionMode::Strict,
            PrecisionArg::Relaxed => PrecisionMode::Relaxed,
        }
    }
}

#[derive(Args)]
struct RisksArgs {
    /// JSON file with risk factors; flags override its values.
    #[arg(long)]
    factors: Option<PathBuf>,

    /// Age in years.
    #[arg(long)]
    age: Option<f64>,

    /// Total cholesterol in mg/dL.
    #[arg(long)]
    cholesterol: Option<f64>,

    /// HDL cholesterol in mg/dL.
    #[arg(long)]
    hdl: Option<f64>,

    /// Systolic blood pressure in mmHg.
    #[arg(long)]
    sbp: Option<f64>,

    #[arg(long)]
    smoker: Option<bool>,

    #[arg(long)]
    hypertension_treatment: Option<bool>,

    #[arg(long)]
    diabetes: Option<bool>,

    /// Height in cm.
    #[arg(long)]
    height: Option<f64>,

    /// Weight in kg.
    #[arg(long)]
    weight: Option<f64>,

    #[arg(long, value_enum)]
    gender: Option<GenderArg>,

    /// ISO 3166-1 alpha-2 country code.
    #[arg(long)]
    country: Option<String>,

    #[arg(long, value_enum)]
    race: Option<RaceArg>,

    /// Also print the minimal and maximal risks over unknown factors.
    #[arg(long)]
    bounds: bool,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum GenderArg {
    Male,
    Female,
    Other,
}

#[derive(Clone, Copy, ValueEnum)]
enum RaceArg {
    White,
    AfricanAmerican,
    Other,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Measure(args) => run_measure(&args),
        Command::Risks(args) => run_risks(&args),
    }
}

fn run_measure(args: &MeasureArgs) -> Result<(), Box<dyn std::error::Error>> {
    validate_measure(args)?;

    let mut engine = MeasurementEngine::new(EngineSettings::default());
    engine.set_precision_mode(args.precision.into());
    if args.rear_camera {
        engine.set_camera_facing(CameraFacing::Environment);
    }
    match &args.config {
        Some(path) => {
            let custom: CustomMeasurementConfig =
                serde_json::from_str(&std::fs::read_to_string(path)?)?;
            engine.set_measurement_preset(MeasurementPreset::Custom);
            engine.set_custom_config(Some(custom));
        }
        None => engine.set_measurement_preset(args.preset.into()),
    }

    let mut reader = open_reader(&args.input, args.fps);
    let metadata = reader.open(&args.input)?;
    let extractor = build_extractor(args.confidence)?;

    let progress: Box<dyn Fn(&MeasurementProgress) -> bool + Send> =
        Box::new(|p: &MeasurementProgress| {
            eprint!(
                "\r{:>6.1}s  {:<34}  {:>3.0}%",
                p.timestamp_sec,
                format!("{:?}", p.state),
                p.percent
            );
            true
        });

    let mut use_case = MeasureVideoUseCase::new(
        reader,
        extractor,
        Box::new(ThreadedMeasurementExecutor::new()),
        Some(progress),
        None,
    );
    let mut logger = StdoutMeasurementLogger::default();
    let outcome = use_case.execute(&mut engine, &metadata, &mut logger);
    eprintln!();
    let results = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }
    Ok(())
}

fn run_risks(args: &RisksArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = match &args.factors {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => RisksFactors::default(),
    };
    let overrides = RisksFactors {
        age: args.age,
        cholesterol: args.cholesterol,
        cholesterol_hdl: args.hdl,
        sbp: args.sbp,
        is_smoker: args.smoker,
        hypertension_treatment: args.hypertension_treatment,
        has_diabetes: args.diabetes,
        body_height: args.height,
        body_weight: args.weight,
        gender: args.gender.map(|g| match g {
            GenderArg::Male => Gender::Male,
            GenderArg::Female => Gender::Female,
            GenderArg::Other => Gender::Other,
        }),
        country: args.country.clone(),
        race: args.race.map(|r| match r {
            RaceArg::White => Race::White,
            RaceArg::AfricanAmerican => Race::AfricanAmerican,
            RaceArg::Other => Race::Other,
        }),
    };
    let factors = overrides.filled_from(&base);

    let risks = compute_health_risks(&factors);
    let bounds = args
        .bounds
        .then(|| (minimal_risks(&factors), maximal_risks(&factors)));

    if args.json {
        let value = match bounds {
            Some((min, max)) => serde_json::json!({
                "risks": risks,
                "minimal": min,
                "maximal": max,
            }),
            None => serde_json::to_value(risks)?,
        };
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_risks("Risks", &risks);
        if let Some((min, max)) = bounds {
            print_risks("Minimal risks", &min);
            print_risks("Maximal risks", &max);
        }
    }
    Ok(())
}

fn build_extractor(
    confidence: f64,
) -> Result<Box<dyn FrameFeatureExtractor>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {FACE_MODEL_NAME}");
    let source = ModelSource {
        name: FACE_MODEL_NAME,
        url: FACE_MODEL_URL,
    };
    let model_path = model_resolver::resolve(&source, None, Some(Box::new(download_progress)))?;
    Ok(Box::new(OnnxFaceExtractor::new(&model_path, confidence)?))
}

fn validate_measure(args: &MeasureArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.input.exists() {
        return Err(format!("Input not found: {}", args.input.display()).into());
    }
    if !(0.0..=1.0).contains(&args.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            args.confidence
        )
        .into());
    }
    if !(args.fps.is_finite() && args.fps > 0.0) {
        return Err(format!("Frame rate must be positive, got {}", args.fps).into());
    }
    Ok(())
}

fn open_reader(input: &Path, fps: f64) -> Box<dyn VideoReader> {
    if input.is_dir() {
        Box::new(ImageSequenceReader::new(fps))
    } else {
        Box::new(FfmpegReader::new())
    }
}

fn print_results(results: &MeasurementResults) {
    let rows = [
        ("Heart rate", results.heart_rate_bpm, "bpm"),
        ("HRV SDNN", results.hrv_sdnn_ms, "ms"),
        ("HRV lnRMSSD", results.hrv_lnrmssd_ms, ""),
        ("Stress index", results.stress_index, ""),
        ("PNS activity", results.parasympathetic_activity, ""),
        ("Breathing rate", results.breathing_rate_bpm, "/min"),
        ("Systolic BP", results.systolic_blood_pressure_mmhg, "mmHg"),
        ("Diastolic BP", results.diastolic_blood_pressure_mmhg, "mmHg"),
        ("Cardiac workload", results.cardiac_workload_mmhg_per_sec, "mmHg/s"),
    ];
    for (label, value, unit) in rows {
        if let Some(value) = value {
            println!("{label:18} {value:8.1} {unit}");
        }
    }
    println!("{:18} {:8}", "Heartbeats", results.heartbeats.len());
    println!(
        "{:18} {:8.0} %",
        "Signal quality",
        results.average_signal_quality * 100.0
    );
}

fn print_risks(title: &str, risks: &HealthRisks) {
    let h = &risks.hard_and_fatal_events;
    let c = &risks.cv_diseases;
    let rows = [
        ("Overall CVD", c.overall_risk, "%"),
        ("Coronary heart disease", c.coronary_heart_disease_risk, "%"),
        ("Stroke", c.stroke_risk, "%"),
        ("Heart failure", c.heart_failure_risk, "%"),
        ("Peripheral vascular", c.peripheral_vascular_disease_risk, "%"),
        ("Hard CV event", h.hard_cv_event_risk, "%"),
        ("Coronary death", h.coronary_death_event_risk, "%"),
        ("Fatal stroke", h.fatal_stroke_event_risk, "%"),
        ("Total CV mortality", h.total_cv_mortality_risk, "%"),
        ("Vascular age", risks.vascular_age, "years"),
        ("Framingham points", risks.scores.total, ""),
    ];
    println!("{title}:");
    for (label, value, unit) in rows {
        match value {
            Some(value) => println!("  {label:24} {value:7.1} {unit}"),
            None => println!("  {label:24} {:>7}", "-"),
        }
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face model... {pct}%");
    } else {
        eprint!("\rDownloading face model... {downloaded} bytes");
    }
}
