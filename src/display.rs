use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use image::RgbaImage;

use crate::{
    pipeline::skeleton,
    types::{Frame, GestureState, HandObservation, SynthParameters},
};

pub const FALLBACK_WIDTH: u32 = 480;
pub const FALLBACK_HEIGHT: u32 = 320;

/// Everything the display needs for one streaming iteration.
pub struct FrameView<'a> {
    pub frame: &'a Frame,
    pub hands: &'a [HandObservation],
    pub gesture: &'a GestureState,
    pub params: &'a SynthParameters,
}

pub trait DisplaySink {
    fn present(&mut self, view: &FrameView<'_>);

    /// Called on every iteration spent in the fallback state.
    fn present_fallback(&mut self, message: &str);
}

/// Headless display: frequency readout in the log, optional PNG snapshots.
pub struct ConsoleDisplay {
    snapshot: Option<PathBuf>,
    snapshot_every: u64,
    presented: u64,
    last_readout: Option<SynthParameters>,
    in_fallback: bool,
}

impl ConsoleDisplay {
    pub fn new(snapshot: Option<PathBuf>, snapshot_every: u32) -> Self {
        Self {
            snapshot,
            snapshot_every: u64::from(snapshot_every.max(1)),
            presented: 0,
            last_readout: None,
            in_fallback: false,
        }
    }

    fn readout_changed(&self, params: &SynthParameters) -> bool {
        match self.last_readout {
            None => true,
            Some(last) => {
                (last.output_frequency() - params.output_frequency()).abs() >= 1.0
                    || last.pitch != params.pitch
            }
        }
    }

    fn write_snapshot(&self, rgba: Vec<u8>, width: u32, height: u32) -> Result<()> {
        let Some(path) = self.snapshot.as_ref() else {
            return Ok(());
        };
        let image = RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| anyhow!("snapshot buffer does not match {width}x{height}"))?;
        image
            .save(path)
            .with_context(|| format!("failed to save snapshot {}", path.display()))
    }
}

impl DisplaySink for ConsoleDisplay {
    fn present(&mut self, view: &FrameView<'_>) {
        if self.in_fallback {
            log::info!("video back, streaming");
            self.in_fallback = false;
        }

        if self.readout_changed(view.params) {
            log::info!(
                "frequency {:.1} Hz (base {:.1} Hz x pitch {:.2}){}",
                view.params.output_frequency(),
                view.params.frequency,
                view.params.pitch,
                if view.gesture.left_pinch { ", pinch" } else { "" }
            );
            self.last_readout = Some(*view.params);
        }

        let due = self.presented % self.snapshot_every == 0;
        self.presented += 1;
        if self.snapshot.is_some() && due {
            let mut rgba = view.frame.rgba.clone();
            skeleton::draw_hands(
                &mut rgba,
                view.frame.width,
                view.frame.height,
                view.hands,
                view.gesture.left_pinch,
            );
            if let Err(err) = self.write_snapshot(rgba, view.frame.width, view.frame.height) {
                log::warn!("{err:#}");
            }
        }
    }

    fn present_fallback(&mut self, message: &str) {
        if self.in_fallback {
            return;
        }
        self.in_fallback = true;
        self.last_readout = None;
        log::warn!("no video: {message}");
        println!("[no video connection] {message}  (r = retry, q = quit)");

        let card = skeleton::fallback_card(FALLBACK_WIDTH, FALLBACK_HEIGHT);
        if let Err(err) = self.write_snapshot(card, FALLBACK_WIDTH, FALLBACK_HEIGHT) {
            log::warn!("{err:#}");
        }
    }
}
