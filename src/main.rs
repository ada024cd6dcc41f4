use anyhow::{Context, Result};
use clap::Parser;
use invisible_theremin::{
    config::{Cli, SourceConfig, ThereminConfig},
    controls::{self, HELP},
    display::ConsoleDisplay,
    gesture::{GestureExtractor, HandTracker},
    mapping::ParameterMapper,
    metrics::MetricsRecorder,
    orchestrator::{Orchestrator, Pacer},
    pipeline::{CAPTURE_HEIGHT, CAPTURE_WIDTH, FrameSource, NetworkSource, OrtHandDetector},
    synth::{AudioConfig, AudioOutput, SharedParameters},
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.list_cameras {
        return list_cameras();
    }
    let config = ThereminConfig::from_cli(&cli)?;

    let source = build_source(&config)?;
    let detector = OrtHandDetector::new(&config.detector)
        .context("failed to initialise the hand landmark detector")?;
    let tracker = HandTracker::new(detector, GestureExtractor::default(), config.detect_every);

    let shared = SharedParameters::default();
    let audio = if config.audio {
        match AudioOutput::start(AudioConfig::default(), shared.clone()) {
            Ok(output) => Some(output),
            Err(err) => {
                log::error!("{err}; continuing without sound");
                None
            }
        }
    } else {
        log::info!("audio disabled");
        None
    };

    let display = ConsoleDisplay::new(config.snapshot.clone(), config.fps);
    let controls = controls::spawn_stdin_controls();
    println!("{HELP}");

    let mut orchestrator = Orchestrator::new(
        source,
        tracker,
        ParameterMapper::new(config.pitch_policy),
        display,
        controls,
    )
    .with_audio(shared, audio)
    .with_metrics(MetricsRecorder::new(config.metrics_every, true))
    .with_pacer(Pacer::new(config.period()));

    orchestrator.run();
    Ok(())
}

fn build_source(config: &ThereminConfig) -> Result<Box<dyn FrameSource>> {
    match &config.source {
        SourceConfig::Stream(url) => Ok(Box::new(NetworkSource::new(
            url.clone(),
            CAPTURE_WIDTH,
            CAPTURE_HEIGHT,
            config.mirror,
        ))),
        #[cfg(feature = "camera-nokhwa")]
        SourceConfig::Camera(index) => Ok(Box::new(invisible_theremin::pipeline::CameraSource::new(
            *index,
            config.mirror,
        ))),
        #[cfg(not(feature = "camera-nokhwa"))]
        SourceConfig::Camera(_) => Err(invisible_theremin::error::ThereminError::InvalidConfig(
            "built without camera support; pass --stream-url".into(),
        )
        .into()),
    }
}

#[cfg(feature = "camera-nokhwa")]
fn list_cameras() -> Result<()> {
    let cameras = invisible_theremin::pipeline::available_cameras()
        .context("failed to enumerate cameras")?;
    if cameras.is_empty() {
        println!("no cameras found");
    }
    for camera in cameras {
        println!("{}: {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn list_cameras() -> Result<()> {
    println!("built without camera support");
    Ok(())
}
