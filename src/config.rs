//! Command-line and environment configuration.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::{
    error::{Result, ThereminError},
    mapping::PitchPolicy,
    metrics::DEFAULT_METRICS_EVERY,
    pipeline::recognizer::DetectorConfig,
};

pub const MAX_HANDS_LIMIT: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "theremin")]
#[command(about = "Play a square-wave theremin with your hands", long_about = None)]
pub struct Cli {
    /// Local camera index
    #[arg(long, value_name = "INDEX", default_value_t = 0)]
    pub camera: u32,

    /// Network stream to read instead of the camera (RTMP, RTSP, HTTP)
    #[arg(long, value_name = "URL", env = "RTMP_URL")]
    pub stream_url: Option<String>,

    /// Directory holding (or receiving) the ONNX models
    #[arg(long, value_name = "DIR", default_value = "models")]
    pub models_dir: PathBuf,

    /// Maximum number of hands to track
    #[arg(long, default_value_t = 2)]
    pub max_hands: usize,

    /// Minimum palm detection score
    #[arg(long, default_value_t = 0.5)]
    pub detection_confidence: f32,

    /// Minimum hand landmark confidence
    #[arg(long, default_value_t = 0.5)]
    pub tracking_confidence: f32,

    /// Run detection on every Nth frame and reuse the result in between
    #[arg(long, value_name = "N", default_value_t = 2)]
    pub detect_every: u32,

    /// Pitch while the left hand is not pinching
    #[arg(long, value_enum, default_value_t = PitchPolicy::Reset)]
    pub pitch_policy: PitchPolicy,

    /// Target loop rate
    #[arg(long, default_value_t = 20)]
    pub fps: u32,

    /// Log a diagnostics record every N iterations
    #[arg(long, value_name = "N", default_value_t = DEFAULT_METRICS_EVERY)]
    pub metrics_every: u32,

    /// Run without opening an audio device
    #[arg(long)]
    pub no_audio: bool,

    /// Keep frames unmirrored
    #[arg(long)]
    pub no_mirror: bool,

    /// Periodically write the annotated frame to this PNG
    #[arg(long, value_name = "PNG")]
    pub snapshot: Option<PathBuf>,

    /// Print the available cameras and exit
    #[arg(long)]
    pub list_cameras: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SourceConfig {
    Camera(u32),
    Stream(String),
}

#[derive(Clone, Debug)]
pub struct ThereminConfig {
    pub source: SourceConfig,
    pub detector: DetectorConfig,
    pub detect_every: u32,
    pub pitch_policy: PitchPolicy,
    pub fps: u32,
    pub metrics_every: u32,
    pub audio: bool,
    pub mirror: bool,
    pub snapshot: Option<PathBuf>,
}

impl ThereminConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        if cli.fps == 0 {
            return Err(ThereminError::InvalidConfig("--fps must be at least 1".into()));
        }
        if cli.detect_every == 0 {
            return Err(ThereminError::InvalidConfig(
                "--detect-every must be at least 1".into(),
            ));
        }
        if !(1..=MAX_HANDS_LIMIT).contains(&cli.max_hands) {
            return Err(ThereminError::InvalidConfig(format!(
                "--max-hands must be between 1 and {MAX_HANDS_LIMIT}, got {}",
                cli.max_hands
            )));
        }
        check_confidence("--detection-confidence", cli.detection_confidence)?;
        check_confidence("--tracking-confidence", cli.tracking_confidence)?;

        let source = match cli.stream_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => SourceConfig::Stream(url.to_string()),
            _ => SourceConfig::Camera(cli.camera),
        };

        Ok(Self {
            source,
            detector: DetectorConfig {
                models_dir: cli.models_dir.clone(),
                max_num_hands: cli.max_hands,
                min_detection_confidence: cli.detection_confidence,
                min_tracking_confidence: cli.tracking_confidence,
            },
            detect_every: cli.detect_every,
            pitch_policy: cli.pitch_policy,
            fps: cli.fps,
            metrics_every: cli.metrics_every.max(1),
            audio: !cli.no_audio,
            mirror: !cli.no_mirror,
            snapshot: cli.snapshot.clone(),
        })
    }

    /// Iteration budget at the configured rate.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

fn check_confidence(flag: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ThereminError::InvalidConfig(format!(
            "{flag} must be within [0, 1], got {value}"
        )))
    }
}
