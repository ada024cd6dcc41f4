use anyhow::{Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution,
    },
};

use super::{
    capture::{
        self, CAPTURE_FPS, CAPTURE_HEIGHT, CAPTURE_WIDTH, CaptureWorker, FrameGrabber,
        FrameSource,
    },
    rgba_converter,
};
use crate::{error::ThereminError, types::Frame};

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    let target = CameraFormat::new(
        Resolution::new(CAPTURE_WIDTH, CAPTURE_HEIGHT),
        FrameFormat::MJPEG,
        CAPTURE_FPS,
    );
    [
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(target)),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Fall back to any format Nokhwa can decode, but prefer higher FPS to
        // avoid very low default rates that some drivers reject.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .filter_map(|info| {
            let index = info.index().as_index().ok()?;
            Some(CameraDevice {
                index,
                label: format_camera_label(&info),
            })
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    info.human_name()
}

fn build_camera(index: u32) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(CameraIndex::Index(index), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

struct CameraGrabber {
    camera: Camera,
    mirror: bool,
}

impl FrameGrabber for CameraGrabber {
    fn grab(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame()?;
        let mut frame = rgba_converter::camera_buffer_to_frame(&buffer)?;
        if self.mirror {
            frame.mirror_horizontal();
        }
        Ok(frame)
    }
}

impl Drop for CameraGrabber {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    }
}

/// Local capture device, opened at 640x480 @ 20 fps when the driver allows.
pub struct CameraSource {
    index: u32,
    mirror: bool,
    worker: Option<CaptureWorker>,
}

impl CameraSource {
    pub fn new(index: u32, mirror: bool) -> Self {
        Self {
            index,
            mirror,
            worker: None,
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        format!("camera {}", self.index)
    }

    fn open(&mut self) -> crate::error::Result<()> {
        self.release();
        let (index, mirror) = (self.index, self.mirror);
        let worker = CaptureWorker::spawn(&format!("camera{index}"), move || {
            let camera = build_camera(index)?;
            let format = camera.camera_format();
            log::info!(
                "camera {index} streaming {}x{} {:?} @ {} fps",
                format.resolution().width_x,
                format.resolution().height_y,
                format.format(),
                format.frame_rate()
            );
            Ok(CameraGrabber { camera, mirror })
        })
        .map_err(|err| ThereminError::source_unavailable(self.describe(), format!("{err:#}")))?;
        self.worker = Some(worker);
        Ok(())
    }

    fn read_frame(&mut self) -> crate::error::Result<Frame> {
        capture::read_from_worker(self.worker.as_ref(), &self.describe())
    }

    fn release(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            log::info!("released {}", self.describe());
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}
