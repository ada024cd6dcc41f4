//! Turns hand landmarks into the two control signals the theremin listens to:
//! a pinch on the left hand and the height of the right wrist.

use crate::{
    error::ThereminError,
    pipeline::recognizer::LandmarkDetector,
    types::{
        Frame, GestureState, HandObservation, Handedness, INDEX_FINGER_TIP, THUMB_TIP, WRIST,
    },
};

/// Thumb-tip to index-tip distance, in normalized image units, below which
/// the left hand counts as pinching. Dimensionless and tunable.
pub const PINCH_THRESHOLD: f32 = 0.07;

#[derive(Clone, Copy, Debug)]
pub struct GestureExtractor {
    pinch_threshold: f32,
}

impl Default for GestureExtractor {
    fn default() -> Self {
        Self::new(PINCH_THRESHOLD)
    }
}

impl GestureExtractor {
    pub fn new(pinch_threshold: f32) -> Self {
        Self { pinch_threshold }
    }

    /// Derives the gesture state from one frame's observations only.
    ///
    /// When several hands share a label the most confident one is used.
    pub fn extract(&self, hands: &[HandObservation]) -> GestureState {
        let left_pinch = primary_hand(hands, Handedness::Left)
            .map(|hand| self.is_pinch(pinch_distance(hand)))
            .unwrap_or(false);
        let right_height = primary_hand(hands, Handedness::Right).map(wrist_height);

        GestureState {
            left_pinch,
            right_height,
        }
    }

    pub fn is_pinch(&self, distance: f32) -> bool {
        distance < self.pinch_threshold
    }
}

/// Planar distance between thumb tip and index fingertip.
pub fn pinch_distance(hand: &HandObservation) -> f32 {
    let [tx, ty, _] = hand.landmark(THUMB_TIP);
    let [ix, iy, _] = hand.landmark(INDEX_FINGER_TIP);
    ((tx - ix).powi(2) + (ty - iy).powi(2)).sqrt()
}

/// Inverted wrist y, so a hand near the top of the frame reads close to 1.0.
pub fn wrist_height(hand: &HandObservation) -> f32 {
    1.0 - hand.landmark(WRIST)[1]
}

fn primary_hand(hands: &[HandObservation], handedness: Handedness) -> Option<&HandObservation> {
    hands
        .iter()
        .filter(|hand| hand.handedness == handedness)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackedHands {
    pub hands: Vec<HandObservation>,
    pub gesture: GestureState,
}

/// Owns the detector together with the frame counter and the cached result
/// used to skip inference on throttled frames.
pub struct HandTracker<D> {
    detector: D,
    extractor: GestureExtractor,
    detect_every: u32,
    frame_index: u64,
    last: TrackedHands,
}

impl<D: LandmarkDetector> HandTracker<D> {
    pub fn new(detector: D, extractor: GestureExtractor, detect_every: u32) -> Self {
        Self {
            detector,
            extractor,
            detect_every: detect_every.max(1),
            frame_index: 0,
            last: TrackedHands::default(),
        }
    }

    /// Runs detection on frames whose index is a multiple of `detect_every`
    /// and hands back the cached result verbatim on the others.
    pub fn process(&mut self, frame: &Frame) -> &TrackedHands {
        let index = self.frame_index;
        self.frame_index += 1;

        if index % u64::from(self.detect_every) != 0 {
            return &self.last;
        }

        let hands = match self.detector.detect(frame) {
            Ok(hands) => hands,
            Err(err) => {
                let fault = ThereminError::DetectorFault(format!("{err:#}"));
                log::warn!("{fault}; treating frame as empty");
                Vec::new()
            }
        };
        let gesture = self.extractor.extract(&hands);
        self.last = TrackedHands { hands, gesture };
        &self.last
    }

    /// Forgets the cached result and restarts the frame count.
    pub fn reset(&mut self) {
        self.frame_index = 0;
        self.last = TrackedHands::default();
    }

    pub fn last(&self) -> &TrackedHands {
        &self.last
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::NUM_LANDMARKS;

    pub(crate) fn hand(handedness: Handedness) -> HandObservation {
        HandObservation {
            handedness,
            landmarks: [[0.5, 0.5, 0.0]; NUM_LANDMARKS],
            confidence: 0.9,
        }
    }

    pub(crate) fn left_hand_with_gap(gap: f32) -> HandObservation {
        let mut hand = hand(Handedness::Left);
        hand.landmarks[THUMB_TIP] = [0.40, 0.50, 0.0];
        hand.landmarks[INDEX_FINGER_TIP] = [0.40 + gap, 0.50, 0.0];
        hand
    }

    pub(crate) fn right_hand_at(wrist_y: f32) -> HandObservation {
        let mut hand = hand(Handedness::Right);
        hand.landmarks[WRIST] = [0.7, wrist_y, 0.0];
        hand
    }

    /// Replays scripted detections and counts invocations.
    pub(crate) struct ScriptedDetector {
        pub script: VecDeque<anyhow::Result<Vec<HandObservation>>>,
        pub calls: usize,
    }

    impl ScriptedDetector {
        pub(crate) fn new(script: Vec<anyhow::Result<Vec<HandObservation>>>) -> Self {
            Self {
                script: script.into(),
                calls: 0,
            }
        }
    }

    impl LandmarkDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<HandObservation>> {
            self.calls += 1;
            self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn blank_frame() -> Frame {
        Frame::new(vec![0; 4 * 4 * 4], 4, 4)
    }

    #[test]
    fn pinch_is_strictly_below_threshold() {
        let extractor = GestureExtractor::default();
        assert!(extractor.is_pinch(0.0));
        assert!(extractor.is_pinch(0.069));
        assert!(!extractor.is_pinch(0.07));
        assert!(!extractor.is_pinch(0.2));
    }

    #[test]
    fn pinch_distance_ignores_depth() {
        let mut hand = left_hand_with_gap(0.03);
        hand.landmarks[THUMB_TIP][2] = -0.5;
        hand.landmarks[INDEX_FINGER_TIP][2] = 0.5;
        assert!((pinch_distance(&hand) - 0.03).abs() < 1e-6);
    }

    #[test]
    fn height_inverts_wrist_y() {
        assert_eq!(wrist_height(&right_hand_at(0.0)), 1.0);
        assert_eq!(wrist_height(&right_hand_at(1.0)), 0.0);
        assert!((wrist_height(&right_hand_at(0.2)) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn missing_hands_produce_neutral_state() {
        let state = GestureExtractor::default().extract(&[]);
        assert_eq!(state, GestureState::default());
        assert!(!state.left_pinch);
        assert_eq!(state.right_height, None);
    }

    #[test]
    fn labels_route_signals_to_the_right_fields() {
        let state = GestureExtractor::default()
            .extract(&[left_hand_with_gap(0.03), right_hand_at(0.25)]);
        assert!(state.left_pinch);
        assert!((state.right_height.unwrap() - 0.75).abs() < 1e-6);

        // A right hand pinching does not count, a left wrist does not set height.
        let mut right_pinching = left_hand_with_gap(0.01);
        right_pinching.handedness = Handedness::Right;
        right_pinching.landmarks[WRIST] = [0.5, 0.6, 0.0];
        let state = GestureExtractor::default().extract(&[right_pinching]);
        assert!(!state.left_pinch);
        assert!(state.right_height.is_some());
    }

    #[test]
    fn most_confident_hand_wins_for_duplicate_labels() {
        let mut weak = right_hand_at(0.9);
        weak.confidence = 0.3;
        let strong = right_hand_at(0.1);
        let state = GestureExtractor::default().extract(&[weak, strong]);
        assert!((state.right_height.unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn tracker_reuses_result_on_skipped_frames() {
        let detector = ScriptedDetector::new(vec![
            Ok(vec![right_hand_at(0.2)]),
            Ok(Vec::new()),
        ]);
        let mut tracker = HandTracker::new(detector, GestureExtractor::default(), 2);
        let frame = blank_frame();

        let first = tracker.process(&frame).clone();
        assert!(first.gesture.right_height.is_some());

        let second = tracker.process(&frame).clone();
        assert_eq!(second, first);

        let third = tracker.process(&frame).clone();
        assert_eq!(third.gesture, GestureState::default());
        assert_eq!(tracker.detector.calls, 2);
    }

    #[test]
    fn tracker_substitutes_empty_set_on_detector_fault() {
        let detector = ScriptedDetector::new(vec![
            Ok(vec![left_hand_with_gap(0.01)]),
            Err(anyhow!("session exploded")),
        ]);
        let mut tracker = HandTracker::new(detector, GestureExtractor::default(), 1);
        let frame = blank_frame();

        assert!(tracker.process(&frame).gesture.left_pinch);
        let after_fault = tracker.process(&frame);
        assert!(after_fault.hands.is_empty());
        assert!(!after_fault.gesture.left_pinch);
    }

    #[test]
    fn reset_clears_cache_and_counter() {
        let detector = ScriptedDetector::new(vec![
            Ok(vec![right_hand_at(0.5)]),
            Ok(vec![right_hand_at(0.1)]),
        ]);
        let mut tracker = HandTracker::new(detector, GestureExtractor::default(), 2);
        let frame = blank_frame();

        tracker.process(&frame);
        tracker.reset();
        assert_eq!(tracker.last(), &TrackedHands::default());

        // Counter restarted, so the next frame is analysed again.
        let after = tracker.process(&frame).gesture;
        assert!((after.right_height.unwrap() - 0.9).abs() < 1e-6);
        assert_eq!(tracker.detector.calls, 2);
    }
}
