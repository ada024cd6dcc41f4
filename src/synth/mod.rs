mod output;

use std::sync::{Arc, Mutex, PoisonError};

pub use output::{AudioConfig, AudioOutput};

use crate::types::SynthParameters;

/// The one piece of state shared with the audio callback. Both sides hold the
/// lock only long enough to copy two floats.
#[derive(Clone, Debug, Default)]
pub struct SharedParameters {
    inner: Arc<Mutex<SynthParameters>>,
}

impl SharedParameters {
    pub fn new(initial: SynthParameters) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial.clamped())),
        }
    }

    /// Clamps and stores `params`, returning what was actually published.
    pub fn publish(&self, params: SynthParameters) -> SynthParameters {
        let params = params.clamped();
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = params;
        params
    }

    pub fn snapshot(&self) -> SynthParameters {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub const DEFAULT_AMPLITUDE: f32 = 0.25;

/// Naive square wave with a normalized phase accumulator, so the waveform
/// stays continuous when the frequency changes between buffers.
#[derive(Clone, Debug)]
pub struct SquareOscillator {
    sample_rate: f32,
    amplitude: f32,
    phase: f32,
}

impl SquareOscillator {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1) as f32,
            amplitude: DEFAULT_AMPLITUDE,
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    /// Fills an interleaved buffer, writing the same sample to every channel.
    pub fn render(&mut self, out: &mut [f32], channels: usize, frequency: f32) {
        let channels = channels.max(1);
        let step = (frequency / self.sample_rate).max(0.0);
        for frame in out.chunks_mut(channels) {
            let value = if self.phase < 0.5 {
                self.amplitude
            } else {
                -self.amplitude
            };
            frame.fill(value);
            self.phase = (self.phase + step).fract();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn sign_changes(samples: &[f32]) -> usize {
        samples
            .windows(2)
            .filter(|pair| pair[0].signum() != pair[1].signum())
            .count()
    }

    #[test]
    fn publish_clamps_before_sharing() {
        let shared = SharedParameters::default();
        let published = shared.publish(SynthParameters {
            frequency: 9_000.0,
            pitch: 0.0,
        });
        assert_eq!(published, SynthParameters::new(2000.0, 0.5));
        assert_eq!(shared.snapshot(), published);
    }

    #[test]
    fn clones_observe_the_same_parameters() {
        let shared = SharedParameters::default();
        let reader = shared.clone();
        let writer = thread::spawn(move || {
            shared.publish(SynthParameters::new(1234.0, 1.5));
        });
        writer.join().unwrap();
        assert_eq!(reader.snapshot(), SynthParameters::new(1234.0, 1.5));
    }

    #[test]
    fn square_wave_has_expected_period() {
        let mut osc = SquareOscillator::new(44_100);
        let mut buf = vec![0.0; 44_100];
        osc.render(&mut buf, 1, 441.0);
        let changes = sign_changes(&buf);
        assert!((880..=884).contains(&changes), "got {changes} sign changes");
        assert!(buf.iter().all(|s| s.abs() == DEFAULT_AMPLITUDE));
    }

    #[test]
    fn phase_carries_across_buffers() {
        let mut whole = SquareOscillator::new(44_100);
        let mut expected = vec![0.0; 1024];
        whole.render(&mut expected, 1, 700.0);

        let mut split = SquareOscillator::new(44_100);
        let mut actual = vec![0.0; 1024];
        let (head, tail) = actual.split_at_mut(512);
        split.render(head, 1, 700.0);
        split.render(tail, 1, 700.0);

        assert_eq!(expected, actual);
    }

    #[test]
    fn every_channel_gets_the_same_sample() {
        let mut osc = SquareOscillator::new(8_000).with_amplitude(0.5);
        let mut buf = vec![0.0; 64];
        osc.render(&mut buf, 2, 1_000.0);
        for frame in buf.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert_eq!(buf[0], 0.5);
    }
}
