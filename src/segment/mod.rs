//! Person instance segmentation: mask normalisation, derived boxes and
//! point-in-mask hit testing.

mod mask;
mod segmenter;

pub use mask::{
    hit_test_instances, AlphaMask, MaskHit, RawMask, SegmentationInstance, MASK_ALPHA_THRESHOLD,
};
pub use segmenter::SegmenterService;
