#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod capture;
pub mod recognizer;
pub mod rgba_converter;
pub mod skeleton;
pub mod stream;

// Re-exports for convenience
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, CameraSource, available_cameras};
pub use capture::{CAPTURE_HEIGHT, CAPTURE_WIDTH, FrameSource};
pub use recognizer::{DetectorConfig, LandmarkDetector, OrtHandDetector};
pub use stream::NetworkSource;
