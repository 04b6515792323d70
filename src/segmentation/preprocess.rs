use image::{imageops, RgbImage};
use ndarray::Array4;

use super::types::Mask;
use crate::error::{SegmentationError, SegmentationResult};

/// Converts RGB frames to model input tensors and confidence planes back to
/// frame-sized masks.
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Resize to the model resolution, normalize to [0, 1], transpose HWC to
    /// NCHW. Returns shape [1, 3, height, width].
    pub fn to_tensor(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() == (self.target_width, self.target_height) {
            image
        } else {
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        };

        let (width, height) = (self.target_width as usize, self.target_height as usize);
        let mut tensor = Array4::<f32>::zeros((1, 3, height, width));
        for (x, y, pixel) in source.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
            }
        }
        tensor
    }

    /// Turn a flat confidence plane (row-major, values in [0, 1]) into a mask
    /// upsampled to the frame resolution.
    pub fn plane_to_mask(
        plane: &[f32],
        plane_width: u32,
        plane_height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> SegmentationResult<Mask> {
        let _span = tracing::debug_span!("postprocess").entered();

        let expected = (plane_width * plane_height) as usize;
        if plane.len() != expected {
            return Err(SegmentationError::bad_output(format!(
                "confidence plane has {} samples, expected {}",
                plane.len(),
                expected
            )));
        }

        let gray = image::GrayImage::from_fn(plane_width, plane_height, |x, y| {
            let v = plane[(y * plane_width + x) as usize];
            image::Luma([(v.clamp(0.0, 1.0) * 255.0) as u8])
        });

        let resized = if (plane_width, plane_height) == (frame_width, frame_height) {
            gray
        } else {
            imageops::resize(
                &gray,
                frame_width,
                frame_height,
                imageops::FilterType::Triangle,
            )
        };

        Ok(Mask::new(frame_width, frame_height, resized.into_raw()))
    }

    /// Grayscale visualization of a mask, for debug output.
    pub fn mask_to_rgb(mask: &Mask) -> RgbImage {
        RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
            let v = mask.get(x, y);
            image::Rgb([v, v, v])
        })
    }
}
