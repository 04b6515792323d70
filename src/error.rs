pub type SegmentationResult<T> = Result<T, SegmentationError>;

/// Errors at the segmentation model boundary.
///
/// The pipeline itself never surfaces these to the user: a `ModelInit` at
/// startup switches the session to the heuristic fallback, and per-frame
/// `Inference`/`BadOutput` failures are substituted frame-by-frame.
#[derive(thiserror::Error, Debug)]
pub enum SegmentationError {
    #[error("model init error: {0}")]
    ModelInit(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("bad model output: {0}")]
    BadOutput(String),
}

impl SegmentationError {
    pub fn model_init(msg: impl Into<String>) -> Self {
        Self::ModelInit(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn bad_output(msg: impl Into<String>) -> Self {
        Self::BadOutput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            SegmentationError::model_init("x")
                .to_string()
                .contains("model init error:")
        );
        assert!(
            SegmentationError::inference("x")
                .to_string()
                .contains("inference error:")
        );
        assert!(
            SegmentationError::bad_output("x")
                .to_string()
                .contains("bad model output:")
        );
    }
}
