mod background;
mod capture;
mod compositor;
mod config;
mod error;
mod mask;
mod output;
mod overlay;
mod perf;
mod scheduler;
mod segmentation;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use background::{BackgroundCompositor, BackgroundMode, FrameLoopSource};
use capture::{CaptureSource, WebcamCapture};
use config::PipelineConfig;
use output::{OutputSink, V4L2Output};
use overlay::{InfoCard, NoOverlay, OverlayRenderer};
use scheduler::FrameScheduler;
use segmentation::{
    FallbackStrategy, PortraitMatting, Preprocessor, SegmentationModel, SegmentationSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Working resolution width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Working resolution height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Path to the segmentation model (ONNX file).
    /// Without it the heuristic fallback serves the whole session.
    #[arg(long)]
    model: Option<String>,

    /// Background mode at startup
    #[arg(long, value_enum, default_value_t = BackgroundArg::Solid)]
    background: BackgroundArg,

    /// Solid background color as R,G,B
    #[arg(long, default_value = "0,255,0")]
    color: String,

    /// Still image for --background image
    #[arg(long)]
    image: Option<PathBuf>,

    /// Directory of pre-decoded frames for --background video
    #[arg(long)]
    video_frames: Option<PathBuf>,

    /// Playback rate of the background video loop
    #[arg(long, default_value_t = 25)]
    video_fps: u32,

    /// Draw the info-card overlay with this accent color (R,G,B)
    #[arg(long)]
    overlay_accent: Option<String>,

    /// Heuristic used when the segmentation model is unavailable
    #[arg(long, value_enum, default_value_t = FallbackArg::Color)]
    fallback: FallbackArg,

    /// Write the mask visualization (grayscale silhouette) instead of the
    /// composited frame
    #[arg(long)]
    show_mask: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackgroundArg {
    Solid,
    Blur,
    Image,
    Video,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FallbackArg {
    Geometric,
    Color,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Backdrop starting");
    tracing::info!("Working resolution: {}x{}", args.width, args.height);
    tracing::info!("Target FPS: {}", args.fps);

    let mut capture = WebcamCapture::new(args.input_device, args.width, args.height)
        .context("Failed to initialize webcam capture")?;

    let mut output = V4L2Output::new(&args.output_device, args.width, args.height)
        .context("Failed to initialize v4l2loopback output")?;

    let config = PipelineConfig {
        target_fps: args.fps,
        fallback_strategy: match args.fallback {
            FallbackArg::Geometric => FallbackStrategy::Geometric,
            FallbackArg::Color => FallbackStrategy::Color,
        },
        ..PipelineConfig::default()
    };

    // A model that is missing or refuses to load is not fatal: the session
    // runs on the heuristic fallback instead.
    let model: Option<Box<dyn SegmentationModel>> = match &args.model {
        Some(path) => match PortraitMatting::new(path) {
            Ok(model) => Some(Box::new(model)),
            Err(err) => {
                tracing::warn!("segmentation model unusable ({err})");
                None
            }
        },
        None => {
            tracing::info!("No segmentation model given, running on the heuristic fallback");
            None
        }
    };
    let segmentation = SegmentationSource::new(model, &config);

    let mut background = BackgroundCompositor::new(args.width, args.height, &config);
    if let Some(dir) = &args.video_frames {
        let source = FrameLoopSource::from_dir(dir, args.video_fps)
            .context("Failed to load background video frames")?;
        background.set_video_source(Box::new(source));
    }
    background.set_mode(initial_mode(&args)?);

    let overlay: Box<dyn OverlayRenderer> = match &args.overlay_accent {
        Some(accent) => Box::new(InfoCard::new(parse_rgb(accent)?)),
        None => Box::new(NoOverlay),
    };

    let mut scheduler = FrameScheduler::new(
        args.width,
        args.height,
        &config,
        segmentation,
        background,
        overlay,
    );

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("Failed to install shutdown handler")?;
    tracing::info!("Press Ctrl+C to stop");

    run_loop(
        &mut capture,
        &mut output,
        &mut scheduler,
        &running,
        args.show_mask,
    )
}

fn initial_mode(args: &Args) -> Result<BackgroundMode> {
    Ok(match args.background {
        BackgroundArg::Solid => BackgroundMode::Solid {
            color: parse_rgb(&args.color)?,
        },
        BackgroundArg::Blur => BackgroundMode::BlurredSelf,
        BackgroundArg::Image => BackgroundMode::Image {
            path: args
                .image
                .clone()
                .context("--background image requires --image")?,
        },
        BackgroundArg::Video => BackgroundMode::Video,
    })
}

fn parse_rgb(s: &str) -> Result<[u8; 3]> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        anyhow::bail!("expected R,G,B, got {s:?}");
    }
    let mut rgb = [0u8; 3];
    for (slot, part) in rgb.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .with_context(|| format!("bad channel value {part:?}"))?;
    }
    Ok(rgb)
}

fn run_loop<C, O>(
    capture: &mut C,
    output: &mut O,
    scheduler: &mut FrameScheduler,
    running: &AtomicBool,
    show_mask: bool,
) -> Result<()>
where
    C: CaptureSource,
    O: OutputSink,
{
    let mut frame_count = 0u64;
    tracing::info!("Starting main pipeline loop");

    while running.load(Ordering::SeqCst) {
        let frame = capture.capture_frame().context("Failed to capture frame")?;

        if scheduler.tick(&frame).is_none() {
            // Deferred by pacing; yield briefly and try again.
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }
        frame_count += 1;

        let mask_viz = if show_mask {
            scheduler.current_mask().map(Preprocessor::mask_to_rgb)
        } else {
            None
        };
        match &mask_viz {
            Some(viz) => output.write_frame(viz),
            None => output.write_frame(scheduler.output_frame()),
        }
        .context("Failed to write frame")?;

        if frame_count % 120 == 0 {
            let monitor = scheduler.monitor();
            let blend = monitor.last_blend();
            tracing::info!(
                "Frame {}: fps={:.1}, latency={:.1}ms, fg={} bg={}",
                frame_count,
                monitor.fps(),
                monitor.last_latency_ms(),
                blend.foreground_pixels,
                blend.background_pixels,
            );
        }
    }

    scheduler.stop();
    tracing::info!("Shutting down after {} frames", frame_count);
    Ok(())
}
