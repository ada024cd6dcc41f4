use clap::ValueEnum;

use crate::types::{
    DEFAULT_FREQUENCY, DEFAULT_PITCH, GestureState, MAX_FREQUENCY, MAX_PITCH, MIN_FREQUENCY,
    SynthParameters,
};

pub const PINCH_PITCH: f32 = MAX_PITCH;

/// What happens to the pitch multiplier while the left hand is not pinching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PitchPolicy {
    /// Fall back to 1.0 as soon as the pinch opens.
    #[default]
    Reset,
    /// Keep whatever pitch was last published (pinch or slider).
    Hold,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ParameterMapper {
    policy: PitchPolicy,
}

impl ParameterMapper {
    pub fn new(policy: PitchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PitchPolicy {
        self.policy
    }

    /// Maps a gesture onto synth parameters. `previous` is only consulted by
    /// [`PitchPolicy::Hold`]; the result is always clamped.
    pub fn map(&self, gesture: &GestureState, previous: &SynthParameters) -> SynthParameters {
        let frequency = gesture
            .right_height
            .map(height_to_frequency)
            .unwrap_or(DEFAULT_FREQUENCY);

        let pitch = match (gesture.left_pinch, self.policy) {
            (true, _) => PINCH_PITCH,
            (false, PitchPolicy::Reset) => DEFAULT_PITCH,
            (false, PitchPolicy::Hold) => previous.pitch,
        };

        SynthParameters::new(frequency, pitch)
    }
}

pub fn height_to_frequency(height: f32) -> f32 {
    MIN_FREQUENCY + (MAX_FREQUENCY - MIN_FREQUENCY) * height.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn height_maps_linearly_onto_audible_range() {
        assert_eq!(height_to_frequency(0.0), 200.0);
        assert_eq!(height_to_frequency(1.0), 2000.0);
        assert_eq!(height_to_frequency(0.5), 1100.0);
        assert_eq!(height_to_frequency(-3.0), 200.0);
        assert_eq!(height_to_frequency(7.0), 2000.0);
    }

    #[test]
    fn absent_right_hand_uses_neutral_frequency() {
        let mapper = ParameterMapper::default();
        let previous = SynthParameters::new(1900.0, 2.0);
        let params = mapper.map(&GestureState::default(), &previous);
        assert_eq!(params.frequency, 440.0);
        assert_eq!(params.pitch, 1.0);
    }

    #[test]
    fn raised_right_hand_without_left() {
        let gesture = GestureState {
            left_pinch: false,
            right_height: Some(1.0 - 0.2),
        };
        let params = ParameterMapper::default().map(&gesture, &SynthParameters::default());
        assert!(close(params.frequency, 1640.0));
        assert_eq!(params.pitch, 1.0);
    }

    #[test]
    fn pinch_without_right_hand_doubles_pitch() {
        let gesture = GestureState {
            left_pinch: true,
            right_height: None,
        };
        let params = ParameterMapper::default().map(&gesture, &SynthParameters::default());
        assert_eq!(params.frequency, 440.0);
        assert_eq!(params.pitch, 2.0);
    }

    #[test]
    fn hold_policy_keeps_previous_pitch() {
        let mapper = ParameterMapper::new(PitchPolicy::Hold);
        let previous = SynthParameters::new(440.0, 1.35);
        let params = mapper.map(&GestureState::default(), &previous);
        assert_eq!(params.pitch, 1.35);

        let reset = ParameterMapper::new(PitchPolicy::Reset).map(&GestureState::default(), &previous);
        assert_eq!(reset.pitch, 1.0);
    }

    #[test]
    fn mapping_is_pure() {
        let mapper = ParameterMapper::new(PitchPolicy::Hold);
        let gesture = GestureState {
            left_pinch: false,
            right_height: Some(0.33),
        };
        let previous = SynthParameters::new(800.0, 0.75);
        assert_eq!(mapper.map(&gesture, &previous), mapper.map(&gesture, &previous));
    }

    #[test]
    fn out_of_range_height_is_clamped() {
        let gesture = GestureState {
            left_pinch: false,
            right_height: Some(1.4),
        };
        let params = ParameterMapper::default().map(&gesture, &SynthParameters::default());
        assert_eq!(params.frequency, 2000.0);
    }
}
