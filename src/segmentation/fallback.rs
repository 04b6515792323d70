use image::{imageops, RgbImage};

use super::types::Mask;
use crate::config::PipelineConfig;

/// Which model-free heuristic to estimate the subject with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Centered rectangle, no pixel inspection at all. The floor.
    Geometric,
    /// Downsampled color statistics: luminance band-pass, green rejection,
    /// skin-tone ratio test.
    Color,
}

/// Fraction of the frame the geometric rectangle covers.
const GEOMETRIC_WIDTH_FRACTION: f32 = 0.6;
const GEOMETRIC_HEIGHT_FRACTION: f32 = 0.7;

/// Luminance outside this band is rejected outright (near-black shadows,
/// blown-out highlights).
const LUMA_MIN: f32 = 30.0;
const LUMA_MAX: f32 = 240.0;

/// Deterministic, model-free mask estimation.
///
/// Output values are strictly 0 or 255 so downstream blending treats a
/// heuristic mask exactly like a confident graded one.
pub struct FallbackSegmenter {
    strategy: FallbackStrategy,
    analysis_width: u32,
    analysis_height: u32,
    skin_red_margin: f32,
    skin_red_blue_delta: i16,
}

impl FallbackSegmenter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_strategy(config, config.fallback_strategy)
    }

    pub fn with_strategy(config: &PipelineConfig, strategy: FallbackStrategy) -> Self {
        Self {
            strategy,
            analysis_width: config.fallback_analysis_width,
            analysis_height: config.fallback_analysis_height,
            skin_red_margin: config.skin_red_margin,
            skin_red_blue_delta: config.skin_red_blue_delta,
        }
    }

    pub fn estimate(&self, frame: &RgbImage) -> Mask {
        match self.strategy {
            FallbackStrategy::Geometric => self.geometric_mask(frame),
            FallbackStrategy::Color => self.color_mask(frame),
        }
    }

    fn geometric_mask(&self, frame: &RgbImage) -> Mask {
        let (width, height) = frame.dimensions();
        let rect_w = (width as f32 * GEOMETRIC_WIDTH_FRACTION) as u32;
        let rect_h = (height as f32 * GEOMETRIC_HEIGHT_FRACTION) as u32;
        let x0 = (width - rect_w) / 2;
        let y0 = (height - rect_h) / 2;

        let mut mask = Mask::filled(width, height, 0);
        for y in y0..y0 + rect_h {
            let row = (y * width) as usize;
            for x in x0..x0 + rect_w {
                mask.data_mut()[row + x as usize] = 255;
            }
        }
        mask
    }

    fn color_mask(&self, frame: &RgbImage) -> Mask {
        let small = imageops::resize(
            frame,
            self.analysis_width,
            self.analysis_height,
            imageops::FilterType::Triangle,
        );

        let binary = image::GrayImage::from_fn(self.analysis_width, self.analysis_height, |x, y| {
            let p = small.get_pixel(x, y);
            let v = if self.is_subject_pixel(p[0], p[1], p[2]) {
                255
            } else {
                0
            };
            image::Luma([v])
        });

        let (frame_width, frame_height) = frame.dimensions();
        let upsampled = imageops::resize(
            &binary,
            frame_width,
            frame_height,
            imageops::FilterType::Nearest,
        );
        Mask::new(frame_width, frame_height, upsampled.into_raw())
    }

    fn is_subject_pixel(&self, r: u8, g: u8, b: u8) -> bool {
        let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));

        let luma = 0.299 * rf + 0.587 * gf + 0.114 * bf;
        if !(LUMA_MIN..=LUMA_MAX).contains(&luma) {
            return false;
        }
        // Chroma-key style rejection of green-dominant pixels.
        if gf > rf && gf > bf {
            return false;
        }
        // Skin-tone ratio test.
        rf > gf * self.skin_red_margin
            && rf > bf * self.skin_red_margin
            && i16::from(r) - i16::from(b) > self.skin_red_blue_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter(strategy: FallbackStrategy) -> FallbackSegmenter {
        FallbackSegmenter::with_strategy(&PipelineConfig::default(), strategy)
    }

    #[test]
    fn geometric_mask_is_centered_binary_rectangle() {
        let frame = RgbImage::new(100, 100);
        let mask = segmenter(FallbackStrategy::Geometric).estimate(&frame);

        assert_eq!(mask.get(50, 50), 255);
        assert_eq!(mask.get(0, 0), 0);
        assert_eq!(mask.get(99, 99), 0);
        assert!(mask.data().iter().all(|&v| v == 0 || v == 255));

        let fg = mask.data().iter().filter(|&&v| v == 255).count();
        assert_eq!(fg, 60 * 70);
    }

    #[test]
    fn color_mask_accepts_skin_tones() {
        let frame = RgbImage::from_pixel(64, 48, image::Rgb([200, 150, 120]));
        let mask = segmenter(FallbackStrategy::Color).estimate(&frame);
        assert!(mask.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn color_mask_rejects_green_and_extremes() {
        for color in [
            [0, 255, 0],    // green screen
            [5, 5, 5],      // near black
            [250, 250, 250] // near white
        ] {
            let frame = RgbImage::from_pixel(64, 48, image::Rgb(color));
            let mask = segmenter(FallbackStrategy::Color).estimate(&frame);
            assert!(
                mask.data().iter().all(|&v| v == 0),
                "expected rejection of {color:?}"
            );
        }
    }

    #[test]
    fn color_mask_is_frame_sized_and_binary() {
        let frame = RgbImage::from_pixel(640, 480, image::Rgb([200, 150, 120]));
        let mask = segmenter(FallbackStrategy::Color).estimate(&frame);
        assert_eq!((mask.width(), mask.height()), (640, 480));
        assert!(mask.data().iter().all(|&v| v == 0 || v == 255));
    }
}
