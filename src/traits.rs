use crate::errors::Result;
use image::{DynamicImage, RgbaImage};

/// Neural-network segmentation pass producing a background-removed image.
///
/// The production implementation wraps a fixed ONNX session loaded once at
/// startup; taking the model as an explicit dependency instead of ambient
/// global state lets tests substitute deterministic backends.
pub trait SegmentationModel: Send + Sync {
    /// Segments the foreground subject and returns the input with the
    /// predicted binary mask attached as its alpha channel.
    fn segment(&self, image: &DynamicImage) -> Result<RgbaImage>;
}

/// Opaque pre-packaged background-removal routine.
///
/// The pipeline treats this as a black box returning an RGBA image; failures
/// surface as `BgArbiterError::ExternalRemoval`.
pub trait BackgroundRemover: Send + Sync {
    fn remove(&self, image: &DynamicImage) -> Result<RgbaImage>;
}
