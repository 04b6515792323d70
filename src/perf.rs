use std::time::{Duration, Instant};

use crate::compositor::BlendStats;

/// How much wall time a frame-rate window spans before the displayed value
/// is recomputed. Longer than a single frame so the readout does not jitter.
const FPS_WINDOW: Duration = Duration::from_millis(500);

/// Achieved frame rate and last processing latency, for diagnostics.
///
/// Written only by the scheduler after each completed tick; everyone else
/// reads.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    window_start: Option<Instant>,
    frames_in_window: u32,
    fps: f32,
    last_latency: Duration,
    last_blend: BlendStats,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, now: Instant, latency: Duration, blend: BlendStats) {
        self.last_latency = latency;
        self.last_blend = blend;

        match self.window_start {
            // The first frame only opens the window; counting it would
            // overstate the rate by one fencepost.
            None => self.window_start = Some(now),
            Some(start) => {
                self.frames_in_window += 1;
                let elapsed = now.saturating_duration_since(start);
                if elapsed >= FPS_WINDOW {
                    self.fps = self.frames_in_window as f32 / elapsed.as_secs_f32();
                    self.frames_in_window = 0;
                    self.window_start = Some(now);
                }
            }
        }
    }

    /// Frames per second over the last completed window; 0 until one closes.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn last_latency_ms(&self) -> f32 {
        self.last_latency.as_secs_f32() * 1000.0
    }

    pub fn last_blend(&self) -> BlendStats {
        self.last_blend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_uses_elapsed_time_not_frame_count() {
        let mut monitor = PerformanceMonitor::new();
        let t0 = Instant::now();

        // 30 frames over exactly one second: 30 fps even though the window
        // nominally closes at 500 ms.
        for i in 0..=30u32 {
            monitor.record(
                t0 + Duration::from_millis(u64::from(i) * 33),
                Duration::from_millis(5),
                BlendStats::default(),
            );
        }
        let fps = monitor.fps();
        assert!((28.0..=32.0).contains(&fps), "fps was {fps}");
    }

    #[test]
    fn fps_is_zero_before_first_window_closes() {
        let mut monitor = PerformanceMonitor::new();
        let t0 = Instant::now();
        monitor.record(t0, Duration::from_millis(2), BlendStats::default());
        monitor.record(
            t0 + Duration::from_millis(16),
            Duration::from_millis(2),
            BlendStats::default(),
        );
        assert_eq!(monitor.fps(), 0.0);
    }

    #[test]
    fn latency_and_blend_reflect_last_tick() {
        let mut monitor = PerformanceMonitor::new();
        let stats = BlendStats {
            foreground_pixels: 7,
            background_pixels: 3,
        };
        monitor.record(Instant::now(), Duration::from_millis(12), stats);
        assert!((monitor.last_latency_ms() - 12.0).abs() < 0.5);
        assert_eq!(monitor.last_blend(), stats);
    }
}
