use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the background-removal arbiter.
///
/// # Why structured errors
///
/// Every stage of the pipeline has a distinct failure domain (decoding,
/// inference, saliency estimation, metric computation, filesystem), and the
/// directory driver needs to report which stage killed an image without
/// parsing error strings. The thiserror crate generates the Display
/// implementations from the format strings below, so each variant only
/// carries the context specific to its domain.
#[derive(Error, Debug)]
pub enum BgArbiterError {
    /// The input file could not be decoded as an image.
    #[error("Failed to decode image: {path}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// The segmentation network returned a tensor that is not the expected
    /// single-channel square mask.
    #[error("Inference output shape mismatch: expected {expected:?}, got {actual:?}")]
    InferenceShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The external background-removal routine failed; the underlying error
    /// is carried opaquely, matching the opacity of the routine itself.
    #[error("External background removal failed")]
    ExternalRemoval {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The saliency estimator could not produce a map for this image.
    #[error("Saliency estimation failed: {reason}")]
    Saliency { reason: String },

    /// The two candidate outputs (or a candidate and the original) do not
    /// share dimensions and cannot be compared pairwise.
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A similarity metric could not be computed. Surfaced rather than
    /// defaulted: substituting an arbitrary score would silently bias the
    /// decision.
    #[error("Failed to compute {metric} metric: {reason}")]
    MetricComputation {
        metric: &'static str,
        reason: String,
    },

    /// The output image could not be encoded or written.
    #[error("Failed to encode image: {path}")]
    Encode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BgArbiterError>;

/// Convert I/O errors to filesystem errors.
///
/// # Why default values for context
///
/// Some I/O errors occur without specific path/operation context. Rather than
/// requiring all callsites to wrap errors manually, this conversion provides
/// a fallback. Code that has context should construct
/// `BgArbiterError::FileSystem` directly with the specific path and operation.
impl From<std::io::Error> for BgArbiterError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to decode errors.
impl From<image::ImageError> for BgArbiterError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode {
            path: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for BgArbiterError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to model errors.
///
/// # Why model error category
///
/// Shape errors occur during tensor operations which are part of model
/// inference, so they're categorized as model errors rather than a separate
/// tensor error type. This keeps the error hierarchy flat and focused on
/// user-facing error domains.
impl From<ndarray::ShapeError> for BgArbiterError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
