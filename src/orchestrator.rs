//! The paced capture → detect → map → publish loop and its connection
//! state machine.

use std::{
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;

use crate::{
    controls::ControlEvent,
    display::{DisplaySink, FrameView},
    error::ThereminError,
    gesture::HandTracker,
    mapping::ParameterMapper,
    metrics::{self, MetricsRecorder},
    pipeline::{capture::FrameSource, recognizer::LandmarkDetector},
    synth::{AudioOutput, SharedParameters},
    types::{Frame, SynthParameters},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Connecting,
    Streaming,
    FailedFallback,
    Stopped,
}

/// Fixed-period schedule: every iteration gets `period` measured from its
/// own start, and never sleeps a negative amount.
#[derive(Clone, Copy, Debug)]
pub struct Pacer {
    period: Duration,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn deadline(&self, iteration_start: Instant) -> Instant {
        iteration_start + self.period
    }

    pub fn sleep_duration(&self, iteration_start: Instant, now: Instant) -> Duration {
        self.deadline(iteration_start).saturating_duration_since(now)
    }

    pub fn pace(&self, iteration_start: Instant) {
        let wait = self.sleep_duration(iteration_start, Instant::now());
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

// Fields drop in declaration order, so capture is released before audio.
pub struct Orchestrator<S, D, V> {
    source: S,
    tracker: HandTracker<D>,
    mapper: ParameterMapper,
    shared: SharedParameters,
    audio: Option<AudioOutput>,
    display: V,
    controls: Receiver<ControlEvent>,
    metrics: MetricsRecorder,
    pacer: Pacer,
    state: LoopState,
    params: SynthParameters,
    fallback_reason: String,
}

impl<S, D, V> Orchestrator<S, D, V>
where
    S: FrameSource,
    D: LandmarkDetector,
    V: DisplaySink,
{
    pub fn new(
        source: S,
        tracker: HandTracker<D>,
        mapper: ParameterMapper,
        display: V,
        controls: Receiver<ControlEvent>,
    ) -> Self {
        let shared = SharedParameters::default();
        let params = shared.snapshot();
        Self {
            source,
            tracker,
            mapper,
            shared,
            audio: None,
            display,
            controls,
            metrics: MetricsRecorder::new(metrics::DEFAULT_METRICS_EVERY, false),
            pacer: Pacer::new(Duration::from_millis(50)),
            state: LoopState::Connecting,
            params,
            fallback_reason: String::new(),
        }
    }

    /// Parameters shared with the oscillator, plus the running stream if any.
    pub fn with_audio(mut self, shared: SharedParameters, audio: Option<AudioOutput>) -> Self {
        self.params = shared.publish(self.params);
        self.shared = shared;
        self.audio = audio;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn parameters(&self) -> SynthParameters {
        self.params
    }

    /// Runs until a quit request, then releases capture and audio.
    pub fn run(&mut self) {
        log::info!("theremin loop starting on {}", self.source.describe());
        while self.step() != LoopState::Stopped {}
        self.shutdown();
        log::info!("theremin loop stopped");
    }

    /// One paced iteration of the state machine.
    pub fn step(&mut self) -> LoopState {
        let iteration_start = Instant::now();

        while let Ok(event) = self.controls.try_recv() {
            self.handle_control(event);
        }

        match self.state {
            LoopState::Stopped => return LoopState::Stopped,
            LoopState::Connecting => self.connect(),
            LoopState::Streaming => match self.source.read_frame() {
                Ok(frame) => {
                    self.process_frame(&frame);
                    if let Some(record) = self.metrics.record(iteration_start) {
                        metrics::log_record(&record);
                    }
                }
                Err(err) => self.enter_fallback(err),
            },
            LoopState::FailedFallback => self.display.present_fallback(&self.fallback_reason),
        }

        self.pacer.pace(iteration_start);
        self.state
    }

    pub fn handle_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Quit => {
                log::info!("quit requested");
                self.shutdown();
            }
            ControlEvent::Retry => {
                if self.state == LoopState::FailedFallback {
                    log::info!("retrying {}", self.source.describe());
                    self.state = LoopState::Connecting;
                } else {
                    log::debug!("retry ignored in state {:?}", self.state);
                }
            }
            ControlEvent::SetPitch(pitch) => {
                if self.state == LoopState::Stopped {
                    return;
                }
                self.params = self.shared.publish(SynthParameters {
                    pitch,
                    ..self.params
                });
                log::info!("pitch slider set to {:.2}", self.params.pitch);
            }
        }
    }

    /// Releases the capture source, then the audio stream. Safe to repeat.
    pub fn shutdown(&mut self) {
        self.source.release();
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
        }
        self.state = LoopState::Stopped;
    }

    fn connect(&mut self) {
        log::info!("connecting to {}", self.source.describe());
        match self.source.open() {
            Ok(()) => {
                self.tracker.reset();
                self.metrics.restart();
                self.state = LoopState::Streaming;
            }
            Err(err) => self.enter_fallback(err),
        }
    }

    fn enter_fallback(&mut self, err: ThereminError) {
        log::warn!("{err}");
        self.source.release();
        self.fallback_reason = err.to_string();
        self.state = LoopState::FailedFallback;
        self.display.present_fallback(&self.fallback_reason);
    }

    fn process_frame(&mut self, frame: &Frame) {
        let tracked = self.tracker.process(frame);
        let next = self.mapper.map(&tracked.gesture, &self.params);
        self.params = self.shared.publish(next);
        self.display.present(&FrameView {
            frame,
            hands: &tracked.hands,
            gesture: &tracked.gesture,
            params: &self.params,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use crossbeam_channel::{Sender, unbounded};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        gesture::{
            GestureExtractor,
            tests::{ScriptedDetector, left_hand_with_gap, right_hand_at},
        },
        mapping::PitchPolicy,
        types::{GestureState, HandObservation},
    };

    #[derive(Default)]
    struct FakeSource {
        opens: VecDeque<Result<(), ThereminError>>,
        reads: VecDeque<Result<(), ThereminError>>,
        open_calls: usize,
        releases: usize,
    }

    impl FrameSource for FakeSource {
        fn describe(&self) -> String {
            "fake".into()
        }

        fn open(&mut self) -> crate::error::Result<()> {
            self.open_calls += 1;
            self.opens.pop_front().unwrap_or(Ok(()))
        }

        fn read_frame(&mut self) -> crate::error::Result<Frame> {
            self.reads.pop_front().unwrap_or(Ok(()))?;
            Ok(Frame::new(vec![0; 2 * 2 * 4], 2, 2))
        }

        fn release(&mut self) {
            self.releases += 1;
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        presented: Vec<(SynthParameters, GestureState, usize)>,
        fallbacks: Vec<String>,
    }

    impl DisplaySink for RecordingDisplay {
        fn present(&mut self, view: &FrameView<'_>) {
            self.presented
                .push((*view.params, *view.gesture, view.hands.len()));
        }

        fn present_fallback(&mut self, message: &str) {
            self.fallbacks.push(message.to_string());
        }
    }

    type TestLoop = Orchestrator<FakeSource, ScriptedDetector, RecordingDisplay>;

    fn build(
        source: FakeSource,
        detections: Vec<anyhow::Result<Vec<HandObservation>>>,
        policy: PitchPolicy,
        detect_every: u32,
    ) -> (TestLoop, Sender<ControlEvent>) {
        let (tx, rx) = unbounded();
        let tracker = HandTracker::new(
            ScriptedDetector::new(detections),
            GestureExtractor::default(),
            detect_every,
        );
        let orchestrator = Orchestrator::new(
            source,
            tracker,
            ParameterMapper::new(policy),
            RecordingDisplay::default(),
            rx,
        )
        .with_pacer(Pacer::new(Duration::ZERO));
        (orchestrator, tx)
    }

    fn unavailable() -> ThereminError {
        ThereminError::source_unavailable("fake", "no device")
    }

    fn assert_params(actual: SynthParameters, frequency: f32, pitch: f32) {
        assert!(
            (actual.frequency - frequency).abs() < 1e-3 && (actual.pitch - pitch).abs() < 1e-6,
            "got {actual:?}, expected {frequency} Hz x {pitch}"
        );
    }

    #[test]
    fn pacer_sleeps_the_remaining_budget_only() {
        let pacer = Pacer::new(Duration::from_millis(50));
        let start = Instant::now();
        assert_eq!(
            pacer.sleep_duration(start, start + Duration::from_millis(20)),
            Duration::from_millis(30)
        );
        assert_eq!(
            pacer.sleep_duration(start, start + Duration::from_millis(80)),
            Duration::ZERO
        );
        assert_eq!(pacer.deadline(start), start + Duration::from_millis(50));
    }

    #[test]
    fn open_failure_falls_back_and_retry_reconnects() {
        let source = FakeSource {
            opens: VecDeque::from([Err(unavailable())]),
            ..FakeSource::default()
        };
        let (mut orchestrator, controls) = build(source, Vec::new(), PitchPolicy::Reset, 2);

        assert_eq!(orchestrator.step(), LoopState::FailedFallback);
        assert_eq!(orchestrator.display.fallbacks.len(), 1);
        assert!(orchestrator.display.fallbacks[0].contains("no device"));

        assert_eq!(orchestrator.step(), LoopState::FailedFallback);

        controls.send(ControlEvent::Retry).unwrap();
        assert_eq!(orchestrator.step(), LoopState::Streaming);
        assert_eq!(orchestrator.source.open_calls, 2);
    }

    #[test]
    fn read_failure_releases_source_and_falls_back() {
        let source = FakeSource {
            reads: VecDeque::from([Ok(()), Err(ThereminError::frame_read("fake", "eof"))]),
            ..FakeSource::default()
        };
        let (mut orchestrator, _controls) = build(source, Vec::new(), PitchPolicy::Reset, 1);

        assert_eq!(orchestrator.step(), LoopState::Streaming);
        assert_eq!(orchestrator.step(), LoopState::Streaming);
        assert_eq!(orchestrator.step(), LoopState::FailedFallback);
        assert_eq!(orchestrator.source.releases, 1);
        assert_eq!(orchestrator.display.presented.len(), 1);
    }

    #[test]
    fn quit_stops_from_any_state_and_shutdown_is_idempotent() {
        let (mut orchestrator, controls) =
            build(FakeSource::default(), Vec::new(), PitchPolicy::Reset, 1);
        assert_eq!(orchestrator.step(), LoopState::Streaming);

        controls.send(ControlEvent::Quit).unwrap();
        assert_eq!(orchestrator.step(), LoopState::Stopped);
        assert_eq!(orchestrator.source.releases, 1);

        orchestrator.shutdown();
        assert_eq!(orchestrator.step(), LoopState::Stopped);
        assert_eq!(orchestrator.state(), LoopState::Stopped);

        controls.send(ControlEvent::Retry).unwrap();
        assert_eq!(orchestrator.step(), LoopState::Stopped);
    }

    #[test]
    fn raised_right_hand_sets_frequency() {
        let (mut orchestrator, _controls) = build(
            FakeSource::default(),
            vec![Ok(vec![right_hand_at(0.2)])],
            PitchPolicy::Reset,
            2,
        );
        let shared = SharedParameters::default();
        orchestrator = orchestrator.with_audio(shared.clone(), None);

        orchestrator.step();
        orchestrator.step();

        assert_params(orchestrator.parameters(), 1640.0, 1.0);
        assert_params(shared.snapshot(), 1640.0, 1.0);
        let (_, gesture, hands) = orchestrator.display.presented[0];
        assert_eq!(hands, 1);
        assert!(!gesture.left_pinch);
    }

    #[test]
    fn left_pinch_without_right_hand_doubles_default_pitch() {
        let (mut orchestrator, _controls) = build(
            FakeSource::default(),
            vec![Ok(vec![left_hand_with_gap(0.03)])],
            PitchPolicy::Reset,
            2,
        );
        orchestrator.step();
        orchestrator.step();

        assert_params(orchestrator.parameters(), 440.0, 2.0);
        assert!(orchestrator.display.presented[0].1.left_pinch);
    }

    #[test]
    fn skipped_frames_reuse_the_previous_gesture() {
        let (mut orchestrator, _controls) = build(
            FakeSource::default(),
            vec![Ok(vec![right_hand_at(0.2)]), Ok(Vec::new())],
            PitchPolicy::Reset,
            2,
        );
        orchestrator.step();
        for _ in 0..2 {
            orchestrator.step();
        }

        let presented = &orchestrator.display.presented;
        assert_eq!(presented.len(), 2);
        assert_eq!(presented[0].1, presented[1].1);
        assert_eq!(presented[1].1.right_height.map(|h| (h * 10.0).round()), Some(8.0));
        assert_eq!(orchestrator.tracker.detector().calls, 1);
    }

    #[test]
    fn detector_fault_yields_empty_frame_not_fallback() {
        let (mut orchestrator, _controls) = build(
            FakeSource::default(),
            vec![Err(anyhow::anyhow!("session crashed"))],
            PitchPolicy::Reset,
            1,
        );
        orchestrator.step();
        assert_eq!(orchestrator.step(), LoopState::Streaming);
        assert_params(orchestrator.parameters(), 440.0, 1.0);
        assert_eq!(orchestrator.display.presented[0].1, GestureState::default());
    }

    #[test]
    fn slider_pitch_persists_only_under_hold() {
        let (mut hold, _c1) = build(FakeSource::default(), Vec::new(), PitchPolicy::Hold, 1);
        hold.step();
        hold.handle_control(ControlEvent::SetPitch(1.5));
        assert_params(hold.parameters(), 440.0, 1.5);
        hold.step();
        assert_params(hold.parameters(), 440.0, 1.5);

        let (mut reset, _c2) = build(FakeSource::default(), Vec::new(), PitchPolicy::Reset, 1);
        reset.step();
        reset.handle_control(ControlEvent::SetPitch(9.0));
        assert_params(reset.parameters(), 440.0, 2.0);
        reset.step();
        assert_params(reset.parameters(), 440.0, 1.0);
    }
}
