use cpal::{
    BufferSize, SampleRate, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

use super::{SharedParameters, SquareOscillator};
use crate::error::{Result, ThereminError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_size: 512,
            channels: 1,
        }
    }
}

impl AudioConfig {
    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: BufferSize::Fixed(self.buffer_size),
        }
    }
}

/// Output stream rendering the theremin tone. Stopping is idempotent and also
/// happens on drop.
pub struct AudioOutput {
    stream: Option<cpal::Stream>,
    config: StreamConfig,
}

impl AudioOutput {
    pub fn start(config: AudioConfig, params: SharedParameters) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| ThereminError::AudioDeviceFault("no audio output device found".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let requested = config.stream_config();
        let (stream, stream_config) = match build_stream(&device, &requested, params.clone()) {
            Ok(stream) => (stream, requested),
            Err(err) => {
                log::warn!(
                    "audio device {device_name} rejected {} Hz / {} ch / {} frames ({err}), using its default config",
                    config.sample_rate,
                    config.channels,
                    config.buffer_size
                );
                let fallback: StreamConfig = device
                    .default_output_config()
                    .map_err(|err| ThereminError::AudioDeviceFault(err.to_string()))?
                    .into();
                let stream = build_stream(&device, &fallback, params)?;
                (stream, fallback)
            }
        };

        stream
            .play()
            .map_err(|err| ThereminError::AudioDeviceFault(format!("failed to start stream: {err}")))?;

        log::info!(
            "audio: {device_name} @ {} Hz, {} channel(s)",
            stream_config.sample_rate.0,
            stream_config.channels
        );

        Ok(Self {
            stream: Some(stream),
            config: stream_config,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::warn!("failed to pause audio stream: {err}");
            }
            log::info!("audio stream stopped");
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    params: SharedParameters,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    let mut oscillator = SquareOscillator::new(config.sample_rate.0);

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frequency = params.snapshot().output_frequency();
                oscillator.render(data, channels, frequency);
            },
            |err| log::error!("audio stream error: {err}"),
            None,
        )
        .map_err(|err| ThereminError::AudioDeviceFault(format!("failed to build stream: {err}")))
}
