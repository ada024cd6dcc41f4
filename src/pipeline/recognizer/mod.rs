pub mod common;
pub mod palm;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use crate::{
    model_download::{ModelKind, ensure_model_ready, model_path},
    types::{Frame, HandObservation, Handedness},
};
use palm::{PalmDetector, PalmDetectorConfig, crop_from_palm, select_regions};

/// Finds hands in a frame. Implementations return one observation per hand
/// with landmarks normalized to the frame.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>> {
        (**self).detect(frame)
    }
}

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub models_dir: PathBuf,
    pub max_num_hands: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            max_num_hands: 2,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

/// Two-stage MediaPipe hand pipeline on ONNX Runtime: palm detection, then
/// a landmark pass on a rotated crop around every kept palm.
pub struct OrtHandDetector {
    handpose: Session,
    palm_detector: PalmDetector,
    max_num_hands: usize,
    min_tracking_confidence: f32,
}

impl OrtHandDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let palm_path = prepare_model(&config.models_dir, ModelKind::PalmDetector)?;
        let handpose_path = prepare_model(&config.models_dir, ModelKind::HandLandmarks)?;

        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&handpose_path)
            .with_context(|| {
                format!("failed to load ORT session from {}", handpose_path.display())
            })?;

        let palm_detector = PalmDetector::new(
            &palm_path,
            PalmDetectorConfig {
                score_threshold: config.min_detection_confidence,
                ..PalmDetectorConfig::default()
            },
        )?;

        log::info!(
            "hand landmark backend ready using {} and palm detector {}",
            handpose_path.display(),
            palm_path.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
            max_num_hands: config.max_num_hands.max(1),
            min_tracking_confidence: config.min_tracking_confidence,
        })
    }

    fn landmarks_for_crop(
        &mut self,
        frame: &Frame,
        center: (f32, f32),
        side: f32,
        angle: f32,
    ) -> Result<Option<HandObservation>> {
        let (input, transform) =
            common::prepare_rotated_crop(frame, center, side, angle, common::INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened)?;

        let first_scalar = |idx: usize| -> f32 {
            if outputs.len() > idx {
                outputs[idx]
                    .try_extract_array::<f32>()
                    .ok()
                    .and_then(|arr| arr.iter().next().copied())
                    .unwrap_or(0.0)
            } else {
                0.0
            }
        };
        let presence = first_scalar(1);
        let handedness = first_scalar(2);

        if presence < self.min_tracking_confidence {
            return Ok(None);
        }

        Ok(Some(HandObservation {
            handedness: Handedness::from_score(handedness),
            landmarks: transform.normalize(&landmarks),
            confidence: presence,
        }))
    }
}

impl LandmarkDetector for OrtHandDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>> {
        let palm_regions = self.palm_detector.detect(frame)?;
        if palm_regions.is_empty() {
            return Ok(Vec::new());
        }

        let crops: Vec<_> = select_regions(&palm_regions, self.max_num_hands)
            .into_iter()
            .map(|region| (crop_from_palm(region), region.score))
            .collect();

        let mut hands = Vec::with_capacity(crops.len());
        for ((center, side, angle), palm_score) in crops {
            match self.landmarks_for_crop(frame, center, side, angle)? {
                Some(mut hand) => {
                    hand.confidence = (hand.confidence * palm_score).clamp(0.0, 1.0);
                    hands.push(hand);
                }
                None => log::debug!("dropped hand below tracking confidence"),
            }
        }
        Ok(hands)
    }
}

fn prepare_model(models_dir: &Path, model: ModelKind) -> Result<PathBuf> {
    let path = model_path(models_dir, model);
    ensure_model_ready(model, &path, |_evt| {}).with_context(|| {
        format!(
            "failed to prepare {} model at {}",
            model.label(),
            path.display()
        )
    })?;
    Ok(path)
}
