use std::time::Instant;

pub const NUM_LANDMARKS: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_FINGER_TIP: usize = 8;

pub const MIN_FREQUENCY: f32 = 200.0;
pub const MAX_FREQUENCY: f32 = 2000.0;
pub const DEFAULT_FREQUENCY: f32 = 440.0;
pub const MIN_PITCH: f32 = 0.5;
pub const MAX_PITCH: f32 = 2.0;
pub const DEFAULT_PITCH: f32 = 1.0;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Mirrors the frame left to right in place, giving a selfie view.
    pub fn mirror_horizontal(&mut self) {
        let stride = self.width as usize * 4;
        if stride == 0 {
            return;
        }
        for row in self.rgba.chunks_exact_mut(stride) {
            let width = row.len() / 4;
            for x in 0..width / 2 {
                let (left, right) = (x * 4, (width - 1 - x) * 4);
                for c in 0..4 {
                    row.swap(left + c, right + c);
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
        }
    }

    pub fn from_score(score: f32) -> Self {
        if score >= 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }
}

/// One detected hand. Coordinates are normalized to the frame: x by width,
/// y by height (0 at the top), z as a relative depth proxy.
#[derive(Clone, Debug, PartialEq)]
pub struct HandObservation {
    pub handedness: Handedness,
    pub landmarks: [[f32; 3]; NUM_LANDMARKS],
    pub confidence: f32,
}

impl HandObservation {
    pub fn landmark(&self, index: usize) -> [f32; 3] {
        self.landmarks[index]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GestureState {
    pub left_pinch: bool,
    pub right_height: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthParameters {
    pub frequency: f32,
    pub pitch: f32,
}

impl SynthParameters {
    pub fn new(frequency: f32, pitch: f32) -> Self {
        Self { frequency, pitch }.clamped()
    }

    pub fn clamped(self) -> Self {
        Self {
            frequency: clamp_or(self.frequency, MIN_FREQUENCY, MAX_FREQUENCY, DEFAULT_FREQUENCY),
            pitch: clamp_or(self.pitch, MIN_PITCH, MAX_PITCH, DEFAULT_PITCH),
        }
    }

    /// Frequency actually rendered by the oscillator.
    pub fn output_frequency(&self) -> f32 {
        self.frequency * self.pitch
    }
}

impl Default for SynthParameters {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            pitch: DEFAULT_PITCH,
        }
    }
}

// NaN would survive f32::clamp, so it falls back to the neutral value.
fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}
