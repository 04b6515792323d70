mod loopback;

pub use loopback::V4L2Output;

use anyhow::Result;
use image::RgbImage;

/// Output destination for composited frames.
pub trait OutputSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    fn resolution(&self) -> (u32, u32);
}
