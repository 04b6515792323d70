use image::RgbImage;

use crate::config::PipelineConfig;
use crate::segmentation::Mask;

/// Pixel population of the last blend, for the diagnostics overlay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlendStats {
    pub foreground_pixels: u64,
    pub background_pixels: u64,
}

/// Per-pixel blend of camera frame, mask, and background into the output
/// buffer. Pure function of its inputs; the counters are a side channel.
pub struct Compositor {
    high: u8,
    low: u8,
}

impl Compositor {
    pub fn new(config: &PipelineConfig) -> Self {
        debug_assert!(config.blend_low < config.blend_high);
        Self {
            high: config.blend_high,
            low: config.blend_low,
        }
    }

    /// Writes one complete output frame, whatever the mask's age. With no
    /// mask at all (startup, post-stop) the camera frame passes through.
    pub fn blend(
        &self,
        frame: &RgbImage,
        mask: Option<&Mask>,
        background: &RgbImage,
        out: &mut RgbImage,
    ) -> BlendStats {
        debug_assert_eq!(frame.dimensions(), background.dimensions());
        debug_assert_eq!(frame.dimensions(), out.dimensions());

        let Some(mask) = mask else {
            out.copy_from_slice(frame.as_raw());
            return BlendStats {
                foreground_pixels: u64::from(frame.width()) * u64::from(frame.height()),
                background_pixels: 0,
            };
        };
        debug_assert_eq!(frame.dimensions(), (mask.width(), mask.height()));

        let mut stats = BlendStats::default();
        let src = frame.as_raw();
        let bg = background.as_raw();
        let dst: &mut [u8] = out;

        for (i, &m) in mask.data().iter().enumerate() {
            let o = i * 3;
            if m > self.high {
                dst[o..o + 3].copy_from_slice(&src[o..o + 3]);
                stats.foreground_pixels += 1;
            } else if m > self.low {
                // Soft edge: linear blend weighted by the mask value.
                let t = u16::from(m);
                let inv = 255 - t;
                for c in 0..3 {
                    dst[o + c] =
                        ((u16::from(src[o + c]) * t + u16::from(bg[o + c]) * inv + 127) / 255)
                            as u8;
                }
                stats.foreground_pixels += 1;
            } else {
                dst[o..o + 3].copy_from_slice(&bg[o..o + 3]);
                stats.background_pixels += 1;
            }
        }
        stats
    }
}
