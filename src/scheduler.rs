use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::background::{BackgroundCompositor, BackgroundMode};
use crate::compositor::Compositor;
use crate::config::PipelineConfig;
use crate::overlay::{OverlayRegion, OverlayRenderer};
use crate::perf::PerformanceMonitor;
use crate::segmentation::{Mask, SegmentationSource};

/// Requests a background switch from outside the tick loop (a UI event, a
/// hotkey). Single slot, latest wins; the scheduler applies it atomically at
/// the start of the next tick, so a switch never races a blend in progress.
#[derive(Clone)]
pub struct ModeSwitchHandle {
    slot: Arc<Mutex<Option<BackgroundMode>>>,
}

impl ModeSwitchHandle {
    pub fn request(&self, mode: BackgroundMode) {
        *lock(&self.slot) = Some(mode);
    }
}

/// The control loop. `tick` is invoked on every display-refresh opportunity;
/// pacing makes over-eager invocation a no-op, and once a tick is accepted
/// exactly one output frame is produced from whatever buffers are current.
///
/// Segmentation and background refresh run on their own cadences, both
/// decoupled from the display rate: segmentation because it is the expensive
/// step, static backgrounds because redrawing them every tick is waste.
pub struct FrameScheduler {
    target_frame_interval: Duration,
    segmentation_interval: Duration,
    background_coalesce_interval: Duration,
    overlay_region: OverlayRegion,

    last_frame_time: Option<Instant>,
    last_mask_refresh: Option<Instant>,
    last_background_refresh: Option<Instant>,
    force_refresh: bool,
    stopped: bool,

    mode_requests: Arc<Mutex<Option<BackgroundMode>>>,

    segmentation: SegmentationSource,
    background: BackgroundCompositor,
    compositor: Compositor,
    overlay: Box<dyn OverlayRenderer>,
    monitor: PerformanceMonitor,
    output: RgbImage,
}

impl FrameScheduler {
    pub fn new(
        width: u32,
        height: u32,
        config: &PipelineConfig,
        segmentation: SegmentationSource,
        background: BackgroundCompositor,
        overlay: Box<dyn OverlayRenderer>,
    ) -> Self {
        Self {
            target_frame_interval: config.target_frame_interval(),
            segmentation_interval: config.segmentation_interval,
            background_coalesce_interval: config.background_coalesce_interval,
            overlay_region: config.overlay_region,
            last_frame_time: None,
            last_mask_refresh: None,
            last_background_refresh: None,
            force_refresh: false,
            stopped: false,
            mode_requests: Arc::new(Mutex::new(None)),
            segmentation,
            background,
            compositor: Compositor::new(config),
            overlay,
            monitor: PerformanceMonitor::new(),
            output: RgbImage::new(width, height),
        }
    }

    pub fn mode_switch_handle(&self) -> ModeSwitchHandle {
        ModeSwitchHandle {
            slot: Arc::clone(&self.mode_requests),
        }
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn background_mode(&self) -> &BackgroundMode {
        self.background.mode()
    }

    /// Last composited frame. Valid after any accepted tick.
    pub fn output_frame(&self) -> &RgbImage {
        &self.output
    }

    /// Current blend-ready mask, for diagnostics views.
    pub fn current_mask(&self) -> Option<&Mask> {
        self.segmentation.current_mask()
    }

    /// Guarantee the next tick does fresh work regardless of interval timers.
    pub fn force_refresh(&mut self) {
        self.force_refresh = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Halt the pipeline. No partial tick runs afterwards, the cached mask is
    /// dropped so a later session starts cold, in-flight segmentation results
    /// are ignored on arrival, and any video source is paused and rewound.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.force_refresh = false;
        self.segmentation.discard_cache();
        self.background.pause();
        tracing::info!("pipeline stopped");
    }

    /// Produce a frame if pacing allows. `None` means the tick was deferred
    /// (or the pipeline is stopped); the caller decides how long to wait.
    pub fn tick(&mut self, frame: &RgbImage) -> Option<&RgbImage> {
        self.tick_at(Instant::now(), frame)
    }

    pub fn tick_at(&mut self, now: Instant, frame: &RgbImage) -> Option<&RgbImage> {
        if self.stopped {
            return None;
        }

        if let Some(mode) = lock(&self.mode_requests).take() {
            self.background.set_mode(mode);
            self.force_refresh = true;
        }

        if let Some(last) = self.last_frame_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.target_frame_interval && !self.force_refresh {
                return None;
            }
        }
        let work_started = Instant::now();
        self.last_frame_time = Some(now);

        let needs_segmentation = self.force_refresh
            || match self.last_mask_refresh {
                None => true,
                Some(t) => now.saturating_duration_since(t) >= self.segmentation_interval,
            };
        let needs_background = self.force_refresh
            || self.background.needs_per_tick_refresh()
            || match self.last_background_refresh {
                None => true,
                Some(t) => {
                    now.saturating_duration_since(t) >= self.background_coalesce_interval
                }
            };

        if needs_segmentation {
            // Freshness is stamped at issuance, not completion: a slow model
            // must not turn the interval into a retry storm.
            self.segmentation.refresh(frame);
            self.last_mask_refresh = Some(now);
            self.force_refresh = false;
        }
        if needs_background {
            self.background.render(frame);
            self.last_background_refresh = Some(now);
        }

        // The blend runs even when both refreshes were skipped: one frame per
        // accepted tick, from whatever buffers are current.
        let stats = self.compositor.blend(
            frame,
            self.segmentation.current_mask(),
            self.background.buffer(),
            &mut self.output,
        );
        self.overlay.draw(&mut self.output, self.overlay_region);
        self.monitor.record(now, work_started.elapsed(), stats);
        Some(&self.output)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
