use std::path::Path;

use image::RgbImage;
use ort::{GraphOptimizationLevel, Session};

use super::preprocess::Preprocessor;
use super::types::{Mask, SegmentationModel};
use crate::error::{SegmentationError, SegmentationResult};

/// Canonical working resolution of the portrait model.
const MODEL_WIDTH: u32 = 256;
const MODEL_HEIGHT: u32 = 256;

/// ONNX portrait segmentation: single normalized NCHW input, single
/// confidence plane output. Stateless between frames.
pub struct PortraitMatting {
    session: Session,
    preprocessor: Preprocessor,
}

impl PortraitMatting {
    pub fn new<P: AsRef<Path>>(model_path: P) -> SegmentationResult<Self> {
        let path = model_path.as_ref();
        tracing::info!("Loading portrait segmentation model from {}", path.display());

        let session = build_session(path)
            .map_err(|e| SegmentationError::model_init(format!("{}: {e}", path.display())))?;

        tracing::info!(
            "Portrait segmentation model loaded, input {}x{}",
            MODEL_WIDTH,
            MODEL_HEIGHT
        );

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(MODEL_WIDTH, MODEL_HEIGHT),
        })
    }
}

fn build_session(path: &Path) -> ort::Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(path)
}

impl SegmentationModel for PortraitMatting {
    fn segment(&mut self, frame: &RgbImage) -> SegmentationResult<Mask> {
        let _span = tracing::debug_span!("portrait_segment").entered();

        let input = self.preprocessor.to_tensor(frame);

        let inputs = ort::inputs![input.view()]
            .map_err(|e| SegmentationError::inference(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| SegmentationError::inference(e.to_string()))?;

        let confidence = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmentationError::bad_output(e.to_string()))?
            .view()
            .to_owned();

        let plane: Vec<f32> = confidence.iter().copied().collect();
        let (frame_width, frame_height) = frame.dimensions();
        Preprocessor::plane_to_mask(
            &plane,
            MODEL_WIDTH,
            MODEL_HEIGHT,
            frame_width,
            frame_height,
        )
    }
}
