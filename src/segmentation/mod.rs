mod fallback;
mod model;
mod preprocess;
mod source;
pub mod types;

pub use fallback::{FallbackSegmenter, FallbackStrategy};
pub use model::PortraitMatting;
pub use preprocess::Preprocessor;
pub use source::SegmentationSource;
pub use types::{Mask, SegmentationModel};
