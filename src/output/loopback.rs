use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

use super::OutputSink;

/// v4l2loopback sink: negotiates a YUYV format on the device, then streams
/// converted frames into it.
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    // Reused between frames; the hot path allocates nothing.
    yuyv: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path).with_context(|| {
            format!("Failed to open v4l2loopback device at {}", path.display())
        })?;
        let format = Format::new(width, height, FourCC::new(b"YUYV"));
        Output::set_format(&device, &format)
            .context("Failed to set YUYV output format on loopback device")?;
        drop(device);

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;

        tracing::info!("v4l2loopback device ready");

        Ok(Self {
            file,
            width,
            height,
            yuyv: Vec::with_capacity((width * height * 2) as usize),
        })
    }
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            anyhow::bail!(
                "frame is {}x{}, sink expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            );
        }

        rgb_to_yuyv(frame, &mut self.yuyv);
        self.file
            .write_all(&self.yuyv)
            .context("Failed to write frame to v4l2loopback device")?;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Pack an RGB image into YUYV (4:2:2). U and V are averaged over each pixel
/// pair; an odd trailing pixel is doubled.
fn rgb_to_yuyv(frame: &RgbImage, out: &mut Vec<u8>) {
    out.clear();
    let row_bytes = (frame.width() * 3) as usize;
    for row in frame.as_raw().chunks_exact(row_bytes) {
        for pair in row.chunks(6) {
            let (r0, g0, b0) = (pair[0], pair[1], pair[2]);
            let (r1, g1, b1) = if pair.len() == 6 {
                (pair[3], pair[4], pair[5])
            } else {
                (r0, g0, b0)
            };

            let (y0, u0, v0) = rgb_to_yuv(r0, g0, b0);
            let (y1, u1, v1) = rgb_to_yuv(r1, g1, b1);

            out.push(y0);
            out.push(((u16::from(u0) + u16::from(u1)) / 2) as u8);
            out.push(y1);
            out.push(((u16::from(v0) + u16::from(v1)) / 2) as u8);
        }
    }
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_is_two_bytes_per_pixel() {
        let frame = RgbImage::new(4, 2);
        let mut out = Vec::new();
        rgb_to_yuyv(&frame, &mut out);
        assert_eq!(out.len(), 4 * 2 * 2);
    }

    #[test]
    fn odd_width_doubles_the_trailing_pixel() {
        let frame = RgbImage::new(3, 1);
        let mut out = Vec::new();
        rgb_to_yuyv(&frame, &mut out);
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn mid_gray_maps_to_neutral_chroma() {
        let frame = RgbImage::from_pixel(2, 1, image::Rgb([128, 128, 128]));
        let mut out = Vec::new();
        rgb_to_yuyv(&frame, &mut out);

        assert_eq!(out[0], 128);
        assert_eq!(out[2], 128);
        for chroma in [out[1], out[3]] {
            assert!((127..=129).contains(&chroma), "chroma was {chroma}");
        }
    }

    #[test]
    fn buffer_is_reused_across_frames() {
        let frame = RgbImage::new(4, 4);
        let mut out = Vec::new();
        rgb_to_yuyv(&frame, &mut out);
        let first_len = out.len();
        rgb_to_yuyv(&frame, &mut out);
        assert_eq!(out.len(), first_len);
    }
}
