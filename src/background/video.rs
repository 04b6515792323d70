use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::RgbImage;

use super::VideoSource;

/// Looping background video decoded ahead of time into RGB frames.
///
/// Reference implementation of the `VideoSource` boundary: readiness,
/// playback position, and pause/rewind behave like a real decoder's, while
/// the frames come from a directory of stills.
pub struct FrameLoopSource {
    frames: Vec<RgbImage>,
    frame_interval: Duration,
    started: Option<Instant>,
}

impl FrameLoopSource {
    pub fn from_frames(frames: Vec<RgbImage>, fps: u32) -> Self {
        Self {
            frames,
            frame_interval: Duration::from_millis(1000 / u64::from(fps.max(1))),
            started: None,
        }
    }

    /// Load every image in `dir` (sorted by file name) as one loop.
    pub fn from_dir<P: AsRef<Path>>(dir: P, fps: u32) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read background frames from {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("png" | "jpg" | "jpeg" | "bmp")
                )
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            let img = image::open(path)
                .with_context(|| format!("failed to decode background frame {}", path.display()))?;
            frames.push(img.to_rgb8());
        }
        if frames.is_empty() {
            anyhow::bail!("no background frames found in {}", dir.display());
        }
        tracing::info!(
            "loaded {} background frames from {}",
            frames.len(),
            dir.display()
        );
        Ok(Self::from_frames(frames, fps))
    }
}

impl VideoSource for FrameLoopSource {
    fn is_ready(&self) -> bool {
        !self.frames.is_empty()
    }

    fn current_frame(&mut self) -> Option<&RgbImage> {
        let started = self.started?;
        if self.frames.is_empty() {
            return None;
        }
        let elapsed = started.elapsed();
        let idx = (elapsed.as_micros() / self.frame_interval.as_micros().max(1)) as usize
            % self.frames.len();
        self.frames.get(idx)
    }

    fn play(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn pause_and_rewind(&mut self) {
        self.started = None;
    }
}
