mod webcam;

pub use webcam::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Camera frame provider. Frames come out at the pipeline's working
/// resolution, one per call.
pub trait CaptureSource {
    fn capture_frame(&mut self) -> Result<RgbImage>;

    fn resolution(&self) -> (u32, u32);
}
