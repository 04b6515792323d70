use std::path::Path;

use image::{imageops, RgbImage};

use super::{BackgroundMode, VideoSource};
use crate::config::PipelineConfig;

/// Renders the active background mode into one persistent buffer.
///
/// The buffer is sized once and redrawn in place; switching modes never
/// leaves pixels from the previous mode behind because every render writes
/// the whole buffer. Missing or not-yet-ready assets degrade to a flat
/// placeholder color, never an error.
pub struct BackgroundCompositor {
    buffer: RgbImage,
    mode: BackgroundMode,
    video: Option<Box<dyn VideoSource>>,
    cached_still: Option<RgbImage>,
    placeholder_color: [u8; 3],
    readiness_polls: u32,
    readiness_retry_budget: u32,
}

impl BackgroundCompositor {
    pub fn new(width: u32, height: u32, config: &PipelineConfig) -> Self {
        Self {
            buffer: RgbImage::new(width, height),
            mode: BackgroundMode::Solid {
                color: [0, 255, 0],
            },
            video: None,
            cached_still: None,
            placeholder_color: config.placeholder_color,
            readiness_polls: 0,
            readiness_retry_budget: config.readiness_retry_budget,
        }
    }

    pub fn set_video_source(&mut self, source: Box<dyn VideoSource>) {
        self.video = Some(source);
    }

    pub fn mode(&self) -> &BackgroundMode {
        &self.mode
    }

    pub fn buffer(&self) -> &RgbImage {
        &self.buffer
    }

    pub fn needs_per_tick_refresh(&self) -> bool {
        self.mode.is_motion_bearing()
    }

    /// Switch modes. The scheduler applies queued switches at tick start, so
    /// this never runs concurrently with a blend.
    pub fn set_mode(&mut self, mode: BackgroundMode) {
        if self.mode == mode {
            return;
        }
        if matches!(self.mode, BackgroundMode::Video)
            && !matches!(mode, BackgroundMode::Video)
        {
            if let Some(video) = &mut self.video {
                video.pause_and_rewind();
            }
        }

        self.cached_still = None;
        match &mode {
            BackgroundMode::Image { path } => {
                let (width, height) = self.buffer.dimensions();
                self.cached_still =
                    load_still(path).map(|img| letterbox_cover(&img, width, height));
            }
            BackgroundMode::Video => {
                self.readiness_polls = 0;
                if let Some(video) = &mut self.video {
                    video.play();
                }
            }
            _ => {}
        }

        tracing::info!("background mode set to {:?}", mode);
        self.mode = mode;
    }

    /// Redraw the buffer for the current mode. `frame` is the live camera
    /// frame, needed by the blurred self-view.
    pub fn render(&mut self, frame: &RgbImage) -> &RgbImage {
        match self.mode {
            BackgroundMode::Solid { color } => self.fill(color),
            BackgroundMode::BlurredSelf => self.render_blurred_self(frame),
            BackgroundMode::Image { .. } => self.render_still(),
            BackgroundMode::Video => self.render_video(),
        }
        &self.buffer
    }

    /// Stop-time teardown: pause and rewind any attached video source.
    pub fn pause(&mut self) {
        if let Some(video) = &mut self.video {
            video.pause_and_rewind();
        }
    }

    fn fill(&mut self, color: [u8; 3]) {
        for px in self.buffer.pixels_mut() {
            px.0 = color;
        }
    }

    fn render_blurred_self(&mut self, frame: &RgbImage) {
        let (width, height) = self.buffer.dimensions();
        // Blur at quarter resolution; the upsample contributes most of the
        // softness and keeps this per-tick path cheap.
        let small = imageops::resize(
            frame,
            (width / 4).max(1),
            (height / 4).max(1),
            imageops::FilterType::Triangle,
        );
        let blurred = imageops::blur(&small, 2.5);
        let full = imageops::resize(&blurred, width, height, imageops::FilterType::Triangle);
        self.buffer.copy_from_slice(full.as_raw());
    }

    fn render_still(&mut self) {
        if let Some(still) = &self.cached_still {
            self.buffer.copy_from_slice(still.as_raw());
        } else {
            self.fill(self.placeholder_color);
        }
    }

    fn render_video(&mut self) {
        let (width, height) = self.buffer.dimensions();
        let placeholder = self.placeholder_color;

        let Some(video) = self.video.as_mut() else {
            self.fill(placeholder);
            return;
        };
        if self.readiness_polls >= self.readiness_retry_budget {
            self.fill(placeholder);
            return;
        }
        if !video.is_ready() {
            self.readiness_polls += 1;
            if self.readiness_polls == self.readiness_retry_budget {
                tracing::warn!("background video never became ready, holding placeholder");
            }
            self.fill(placeholder);
            return;
        }
        self.readiness_polls = 0;

        let Some(vframe) = video.current_frame() else {
            self.fill(placeholder);
            return;
        };
        let fitted = letterbox_cover(vframe, width, height);
        self.buffer.copy_from_slice(fitted.as_raw());
    }
}

fn load_still(path: &Path) -> Option<RgbImage> {
    match image::open(path) {
        Ok(img) => Some(img.to_rgb8()),
        Err(err) => {
            tracing::warn!(
                "could not load background image {}: {err}",
                path.display()
            );
            None
        }
    }
}

/// Scale to fill the target while preserving aspect ratio, center-cropping
/// the excess.
fn letterbox_cover(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (sw, sh) = src.dimensions();
    if (sw, sh) == (width, height) {
        return src.clone();
    }
    let src_ratio = f64::from(sw) / f64::from(sh);
    let dst_ratio = f64::from(width) / f64::from(height);
    let (scale_w, scale_h) = if src_ratio > dst_ratio {
        ((f64::from(height) * src_ratio).round() as u32, height)
    } else {
        (width, (f64::from(width) / src_ratio).round() as u32)
    };
    let scale_w = scale_w.max(width);
    let scale_h = scale_h.max(height);
    let scaled = imageops::resize(src, scale_w, scale_h, imageops::FilterType::Triangle);
    let x0 = (scale_w - width) / 2;
    let y0 = (scale_h - height) / 2;
    imageops::crop_imm(&scaled, x0, y0, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    const RED: [u8; 3] = [255, 0, 0];
    const BLUE: [u8; 3] = [0, 0, 255];

    fn compositor(width: u32, height: u32) -> BackgroundCompositor {
        BackgroundCompositor::new(width, height, &PipelineConfig::default())
    }

    /// Always-ready source that serves one solid frame and records calls.
    struct StubVideo {
        frame: RgbImage,
        playing: Rc<Cell<bool>>,
        rewinds: Rc<Cell<u32>>,
    }

    impl VideoSource for StubVideo {
        fn is_ready(&self) -> bool {
            true
        }
        fn current_frame(&mut self) -> Option<&RgbImage> {
            self.playing.get().then_some(&self.frame)
        }
        fn play(&mut self) {
            self.playing.set(true);
        }
        fn pause_and_rewind(&mut self) {
            self.playing.set(false);
            self.rewinds.set(self.rewinds.get() + 1);
        }
    }

    struct NeverReady {
        polls: Rc<Cell<u32>>,
    }

    impl VideoSource for NeverReady {
        fn is_ready(&self) -> bool {
            self.polls.set(self.polls.get() + 1);
            false
        }
        fn current_frame(&mut self) -> Option<&RgbImage> {
            None
        }
        fn play(&mut self) {}
        fn pause_and_rewind(&mut self) {}
    }

    #[test]
    fn solid_mode_fills_buffer() {
        let mut bg = compositor(8, 8);
        bg.set_mode(BackgroundMode::Solid { color: BLUE });
        let frame = RgbImage::new(8, 8);
        let out = bg.render(&frame);
        assert!(out.pixels().all(|p| p.0 == BLUE));
    }

    #[test]
    fn video_to_solid_and_back_leaves_no_stale_frame() {
        let playing = Rc::new(Cell::new(false));
        let rewinds = Rc::new(Cell::new(0));
        let mut bg = compositor(8, 8);
        bg.set_video_source(Box::new(StubVideo {
            frame: RgbImage::from_pixel(8, 8, image::Rgb(RED)),
            playing: Rc::clone(&playing),
            rewinds: Rc::clone(&rewinds),
        }));
        let frame = RgbImage::new(8, 8);

        bg.set_mode(BackgroundMode::Video);
        assert!(bg.render(&frame).pixels().all(|p| p.0 == RED));

        bg.set_mode(BackgroundMode::Solid { color: BLUE });
        assert_eq!(rewinds.get(), 1);
        assert!(!playing.get());
        // Every pixel of the solid interval is solid; nothing red survives.
        assert!(bg.render(&frame).pixels().all(|p| p.0 == BLUE));

        bg.set_mode(BackgroundMode::Video);
        assert!(bg.render(&frame).pixels().all(|p| p.0 == RED));
    }

    #[test]
    fn never_ready_video_polls_within_budget_then_holds_placeholder() {
        let polls = Rc::new(Cell::new(0));
        let config = PipelineConfig {
            readiness_retry_budget: 3,
            ..PipelineConfig::default()
        };
        let mut bg = BackgroundCompositor::new(8, 8, &config);
        bg.set_video_source(Box::new(NeverReady {
            polls: Rc::clone(&polls),
        }));
        bg.set_mode(BackgroundMode::Video);

        let frame = RgbImage::new(8, 8);
        for _ in 0..10 {
            let out = bg.render(&frame);
            assert!(out.pixels().all(|p| p.0 == config.placeholder_color));
        }
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn missing_image_renders_placeholder() {
        let mut bg = compositor(8, 8);
        bg.set_mode(BackgroundMode::Image {
            path: "/nonexistent/backdrop.png".into(),
        });
        let frame = RgbImage::new(8, 8);
        let out = bg.render(&frame);
        let placeholder = PipelineConfig::default().placeholder_color;
        assert!(out.pixels().all(|p| p.0 == placeholder));
    }

    #[test]
    fn image_mode_letterboxes_and_copies_into_buffer() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("backdrop-test-still-{}.png", std::process::id()));
        RgbImage::from_pixel(16, 8, image::Rgb(BLUE))
            .save(&path)
            .unwrap();

        let mut bg = compositor(8, 8);
        bg.set_mode(BackgroundMode::Image { path: path.clone() });
        let frame = RgbImage::new(8, 8);
        let out = bg.render(&frame);
        assert!(out.pixels().all(|p| p.0 == BLUE));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn blurred_self_view_tracks_camera_frame() {
        let mut bg = compositor(16, 16);
        bg.set_mode(BackgroundMode::BlurredSelf);
        let frame = RgbImage::from_pixel(16, 16, image::Rgb([120, 60, 200]));
        let out = bg.render(&frame);
        // A uniform input stays near-uniform through blur and resampling.
        for p in out.pixels() {
            assert!((i16::from(p.0[0]) - 120).abs() <= 4);
            assert!((i16::from(p.0[1]) - 60).abs() <= 4);
            assert!((i16::from(p.0[2]) - 200).abs() <= 4);
        }
    }

    #[test]
    fn letterbox_cover_crops_centered_excess() {
        // Left half red, right half blue, twice as wide as the target.
        let mut wide = RgbImage::new(40, 20);
        for (x, _, px) in wide.enumerate_pixels_mut() {
            px.0 = if x < 20 { RED } else { BLUE };
        }
        let out = letterbox_cover(&wide, 20, 20);
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get_pixel(1, 10).0, RED);
        assert_eq!(out.get_pixel(18, 10).0, BLUE);

        // Taller than the target: top/bottom are cropped instead.
        let mut tall = RgbImage::new(20, 40);
        for (_, y, px) in tall.enumerate_pixels_mut() {
            px.0 = if y < 20 { RED } else { BLUE };
        }
        let out = letterbox_cover(&tall, 20, 20);
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.get_pixel(10, 1).0, RED);
        assert_eq!(out.get_pixel(10, 18).0, BLUE);
    }
}
