use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, TrySendError, bounded};

use crate::{error::ThereminError, types::Frame};

pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;
pub const CAPTURE_FPS: u32 = 20;

/// How long a source may take to produce its first frame.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a read waits before the source is declared dead.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

/// A capture device or stream the theremin loop pulls frames from.
///
/// `release` must be safe to call any number of times, including on a
/// source that never opened.
pub trait FrameSource {
    fn describe(&self) -> String;
    fn open(&mut self) -> crate::error::Result<()>;
    fn read_frame(&mut self) -> crate::error::Result<Frame>;
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn open(&mut self) -> crate::error::Result<()> {
        (**self).open()
    }

    fn read_frame(&mut self) -> crate::error::Result<Frame> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Blocking frame producer driven by a [`CaptureWorker`] thread.
pub(crate) trait FrameGrabber {
    fn grab(&mut self) -> Result<Frame>;
}

#[derive(Debug)]
pub(crate) struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    frame_rx: Receiver<Frame>,
}

impl CaptureWorker {
    /// Opens the grabber on a dedicated thread and waits until it delivered
    /// its first frame. Devices that are not `Send` are built on that thread.
    pub(crate) fn spawn<G, F>(name: &str, open: F) -> Result<Self>
    where
        G: FrameGrabber,
        F: FnOnce() -> Result<G> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name(format!("capture-{name}"))
            .spawn(move || {
                let mut grabber = match open().and_then(|mut grabber| {
                    let first = grabber.grab()?;
                    let _ = frame_tx.try_send(first);
                    Ok(grabber)
                }) {
                    Ok(grabber) => {
                        let _ = ready_tx.send(Ok(()));
                        grabber
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("{err:#}")));
                        return;
                    }
                };

                let mut failures = 0;
                while !stop_flag.load(Ordering::Relaxed) {
                    match grabber.grab() {
                        Ok(frame) => {
                            failures = 0;
                            // Drop the frame if the consumer has not caught up.
                            if let Err(TrySendError::Disconnected(_)) = frame_tx.try_send(frame) {
                                break;
                            }
                        }
                        Err(err) => {
                            failures += 1;
                            log::warn!("frame grab failed ({failures} in a row): {err:#}");
                            if failures >= MAX_CONSECUTIVE_FAILURES {
                                log::error!("giving up on capture after {failures} failures");
                                break;
                            }
                        }
                    }
                }
            })?;

        let mut worker = Self {
            stop,
            handle: Some(handle),
            frame_rx,
        };

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => Ok(worker),
            Ok(Err(reason)) => {
                worker.stop();
                Err(anyhow!(reason))
            }
            Err(_) => {
                // The thread may be stuck inside the device; let it go.
                worker.stop.store(true, Ordering::SeqCst);
                worker.handle.take();
                Err(anyhow!("no frame within {OPEN_TIMEOUT:?}"))
            }
        }
    }

    /// Waits for a frame and skips ahead to the newest one available.
    pub(crate) fn next_frame(&self, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
        let mut frame = self.frame_rx.recv_timeout(timeout)?;
        while let Ok(newer) = self.frame_rx.try_recv() {
            frame = newer;
        }
        Ok(frame)
    }

    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) fn read_from_worker(
    worker: Option<&CaptureWorker>,
    source_name: &str,
) -> crate::error::Result<Frame> {
    let Some(worker) = worker else {
        return Err(ThereminError::frame_read(source_name, "source is not open"));
    };
    worker.next_frame(FRAME_TIMEOUT).map_err(|err| match err {
        RecvTimeoutError::Timeout => {
            ThereminError::frame_read(source_name, format!("no frame within {FRAME_TIMEOUT:?}"))
        }
        RecvTimeoutError::Disconnected => {
            ThereminError::frame_read(source_name, "capture thread stopped")
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct CountingGrabber {
        grabbed: Arc<AtomicUsize>,
        fail_after: usize,
    }

    impl FrameGrabber for CountingGrabber {
        fn grab(&mut self) -> Result<Frame> {
            let n = self.grabbed.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                return Err(anyhow!("unplugged"));
            }
            thread::sleep(Duration::from_millis(1));
            Ok(Frame::new(vec![n as u8; 4], 1, 1))
        }
    }

    #[test]
    fn worker_delivers_frames_until_stopped() {
        let grabbed = Arc::new(AtomicUsize::new(0));
        let counter = grabbed.clone();
        let mut worker = CaptureWorker::spawn("test", move || {
            Ok(CountingGrabber {
                grabbed: counter,
                fail_after: usize::MAX,
            })
        })
        .unwrap();

        assert!(worker.next_frame(Duration::from_secs(1)).is_ok());
        worker.stop();
        worker.stop();
        assert!(grabbed.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn failing_open_is_reported() {
        let err = CaptureWorker::spawn::<CountingGrabber, _>("test", || Err(anyhow!("no device")))
            .unwrap_err();
        assert!(err.to_string().contains("no device"));
    }

    #[test]
    fn failing_first_grab_fails_the_open() {
        let err = CaptureWorker::spawn("test", || {
            Ok(CountingGrabber {
                grabbed: Arc::new(AtomicUsize::new(0)),
                fail_after: 0,
            })
        })
        .unwrap_err();
        assert!(err.to_string().contains("unplugged"));
    }

    #[test]
    fn repeated_failures_disconnect_the_reader() {
        let worker = CaptureWorker::spawn("test", || {
            Ok(CountingGrabber {
                grabbed: Arc::new(AtomicUsize::new(0)),
                fail_after: 3,
            })
        })
        .unwrap();

        let err = loop {
            match read_from_worker(Some(&worker), "flaky") {
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert!(matches!(err, ThereminError::FrameReadFailure { .. }));
    }

    #[test]
    fn reading_a_closed_source_is_a_read_failure() {
        let err = read_from_worker(None, "nothing").unwrap_err();
        assert!(matches!(err, ThereminError::FrameReadFailure { .. }));
    }
}
