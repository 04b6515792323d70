use std::time::Duration;

use crate::overlay::OverlayRegion;
use crate::segmentation::FallbackStrategy;

/// All pipeline tunables in one place.
///
/// The threshold constants deliberately live here instead of inside the mask
/// or blend code so they can be retuned without touching the hot loops.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Display pacing target.
    pub target_fps: u32,
    /// How often the segmentation mask is refreshed. Decoupled from the
    /// display rate because segmentation is the expensive step.
    pub segmentation_interval: Duration,
    /// Static background modes coalesce redraws within this interval.
    pub background_coalesce_interval: Duration,

    /// Box blur radius applied to raw masks, in pixels.
    pub mask_blur_radius: u32,
    /// Blurred mask values above this become confident foreground (255).
    pub mask_fg_cutoff: u8,
    /// Blurred mask values below this become confident background (0).
    /// Between the cutoffs the value is ramped linearly.
    pub mask_bg_cutoff: u8,

    /// Mask values above this take the camera pixel unmodified.
    pub blend_high: u8,
    /// Mask values at or below this take the background pixel unmodified.
    pub blend_low: u8,

    /// Heuristic used when the segmentation model is unavailable or errors.
    pub fallback_strategy: FallbackStrategy,
    /// Resolution the color-heuristic fallback analyzes at.
    pub fallback_analysis_width: u32,
    pub fallback_analysis_height: u32,
    /// Red channel must exceed green and blue by this factor to read as skin.
    pub skin_red_margin: f32,
    /// Minimum red-minus-blue difference for the skin test.
    pub skin_red_blue_delta: i16,

    /// Consecutive not-ready polls before a background asset is given up on.
    pub readiness_retry_budget: u32,
    /// Flat color rendered whenever a background asset is unavailable.
    pub placeholder_color: [u8; 3],

    /// Where the informational overlay is drawn on the output frame.
    pub overlay_region: OverlayRegion,
}

impl PipelineConfig {
    /// Minimum spacing between produced frames, from `target_fps`.
    pub fn target_frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.target_fps.max(1)))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            segmentation_interval: Duration::from_millis(33),
            background_coalesce_interval: Duration::from_millis(8),
            mask_blur_radius: 2,
            mask_fg_cutoff: 210,
            mask_bg_cutoff: 120,
            blend_high: 200,
            blend_low: 100,
            fallback_strategy: FallbackStrategy::Color,
            fallback_analysis_width: 320,
            fallback_analysis_height: 240,
            skin_red_margin: 1.1,
            skin_red_blue_delta: 20,
            readiness_retry_budget: 120,
            placeholder_color: [34, 40, 49],
            overlay_region: OverlayRegion {
                x: 10,
                y: 10,
                width: 300,
                height: 200,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_interval_follows_fps() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.target_frame_interval(), Duration::from_millis(16));
        config.target_fps = 30;
        assert_eq!(config.target_frame_interval(), Duration::from_millis(33));
    }

    #[test]
    fn default_bands_are_ordered() {
        let config = PipelineConfig::default();
        assert!(config.mask_bg_cutoff < config.mask_fg_cutoff);
        assert!(config.blend_low < config.blend_high);
    }
}
