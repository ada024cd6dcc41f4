//! Network video (RTMP, RTSP, HTTP, files) decoded by an `ffmpeg` child
//! process that writes raw RGB frames to its stdout.

use std::{
    io::{BufReader, Read},
    process::{Child, ChildStdout, Command, Stdio},
};

use anyhow::{Context, Result};

use super::{
    capture::{self, CaptureWorker, FrameGrabber, FrameSource},
    rgba_converter,
};
use crate::{error::ThereminError, types::Frame};

pub const DEFAULT_FFMPEG: &str = "ffmpeg";

pub struct NetworkSource {
    url: String,
    ffmpeg: String,
    width: u32,
    height: u32,
    mirror: bool,
    child: Option<Child>,
    worker: Option<CaptureWorker>,
}

impl NetworkSource {
    pub fn new(url: impl Into<String>, width: u32, height: u32, mirror: bool) -> Self {
        Self {
            url: url.into(),
            ffmpeg: DEFAULT_FFMPEG.to_string(),
            width,
            height,
            mirror,
            child: None,
            worker: None,
        }
    }

    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    fn ffmpeg_args(&self) -> Vec<String> {
        let scale = format!("scale={}:{}", self.width, self.height);
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            self.url.as_str(),
            "-an",
            "-vf",
            scale.as_str(),
            "-pix_fmt",
            "rgb24",
            "-f",
            "rawvideo",
            "-",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }

    fn spawn_decoder(&self) -> Result<Child> {
        Command::new(&self.ffmpeg)
            .args(self.ffmpeg_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to launch {}", self.ffmpeg))
    }

    fn kill_decoder(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

struct PipeGrabber {
    reader: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    mirror: bool,
    rgb: Vec<u8>,
}

impl FrameGrabber for PipeGrabber {
    fn grab(&mut self) -> Result<Frame> {
        self.reader
            .read_exact(&mut self.rgb)
            .context("video stream ended")?;
        let rgba = rgba_converter::packed_rgb_to_rgba(&self.rgb, self.width, self.height, false)?;
        let mut frame = Frame::new(rgba, self.width, self.height);
        if self.mirror {
            frame.mirror_horizontal();
        }
        Ok(frame)
    }
}

impl FrameSource for NetworkSource {
    fn describe(&self) -> String {
        format!("stream {}", self.url)
    }

    fn open(&mut self) -> crate::error::Result<()> {
        self.release();

        let mut child = self
            .spawn_decoder()
            .map_err(|err| ThereminError::source_unavailable(self.describe(), format!("{err:#}")))?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(ThereminError::source_unavailable(
                self.describe(),
                "decoder has no stdout",
            ));
        };
        self.child = Some(child);

        let (width, height, mirror) = (self.width, self.height, self.mirror);
        let spawned = CaptureWorker::spawn("stream", move || {
            Ok(PipeGrabber {
                reader: BufReader::new(stdout),
                width,
                height,
                mirror,
                rgb: vec![0u8; width as usize * height as usize * 3],
            })
        });

        match spawned {
            Ok(worker) => {
                log::info!("connected to {}", self.describe());
                self.worker = Some(worker);
                Ok(())
            }
            Err(err) => {
                self.kill_decoder();
                Err(ThereminError::source_unavailable(self.describe(), format!("{err:#}")))
            }
        }
    }

    fn read_frame(&mut self) -> crate::error::Result<Frame> {
        capture::read_from_worker(self.worker.as_ref(), &self.describe())
    }

    fn release(&mut self) {
        // Killing the decoder first unblocks the worker's pending read.
        let was_open = self.child.is_some() || self.worker.is_some();
        self.kill_decoder();
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
        if was_open {
            log::info!("released {}", self.describe());
        }
    }
}

impl Drop for NetworkSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_arguments_request_raw_rgb_at_capture_size() {
        let source = NetworkSource::new("rtmp://localhost/live/cam", 640, 480, false);
        let args = source.ffmpeg_args();
        let joined = args.join(" ");
        assert!(joined.contains("-i rtmp://localhost/live/cam"));
        assert!(joined.contains("scale=640:480"));
        assert!(joined.contains("-pix_fmt rgb24"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn missing_decoder_binary_is_source_unavailable() {
        let mut source = NetworkSource::new("rtmp://localhost/live/cam", 64, 48, false)
            .with_ffmpeg("/nonexistent/ffmpeg-for-theremin-tests");
        let err = source.open().unwrap_err();
        assert!(matches!(err, ThereminError::SourceUnavailable { .. }));
        source.release();
        source.release();
    }

    #[test]
    fn reading_before_open_fails_cleanly() {
        let mut source = NetworkSource::new("rtmp://localhost/live/cam", 64, 48, false);
        assert!(matches!(
            source.read_frame(),
            Err(ThereminError::FrameReadFailure { .. })
        ));
    }
}
