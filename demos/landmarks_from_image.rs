use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use invisible_theremin::{
    gesture::{GestureExtractor, pinch_distance, wrist_height},
    mapping::ParameterMapper,
    pipeline::{
        DetectorConfig, LandmarkDetector, OrtHandDetector, skeleton::draw_hands,
    },
    types::{Frame, SynthParameters},
};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let input_image = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("demo/hands.png"));
    let output_image = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("demo/hands_with_landmarks.png"));

    let image = image::open(&input_image)
        .with_context(|| format!("failed to open image {}", input_image.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let frame = Frame::new(image.into_raw(), width, height);

    let mut detector = OrtHandDetector::new(&DetectorConfig::default())?;
    let hands = detector.detect(&frame).context("inference failed")?;
    println!("found {} hand(s) in {}", hands.len(), input_image.display());
    for hand in &hands {
        println!(
            "  {} hand: confidence {:.3}, pinch distance {:.3}, wrist height {:.3}",
            hand.handedness.label(),
            hand.confidence,
            pinch_distance(hand),
            wrist_height(hand)
        );
    }

    let gesture = GestureExtractor::default().extract(&hands);
    let params = ParameterMapper::default().map(&gesture, &SynthParameters::default());
    println!(
        "theremin would play {:.1} Hz (pitch x{:.1})",
        params.output_frequency(),
        params.pitch
    );

    let mut rgba = frame.rgba;
    draw_hands(&mut rgba, width, height, &hands, gesture.left_pinch);
    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("annotated buffer does not match image size"))?
        .save(&output_image)
        .with_context(|| format!("failed to save {}", output_image.display()))?;

    println!("Wrote {}", output_image.display());
    Ok(())
}
