use geowarp_raster::RasterError;

use crate::parallel::ParallelError;

/// An error raised by a [`crate::transformer::Transformer`].
///
/// Failure of individual points is reported through the success flags of a
/// batch and never through this type.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TransformError {
    /// The transformer failed for the whole batch.
    #[error("Transformer failed: {0}")]
    Failed(String),

    /// The coordinate and success buffers of a batch have different lengths.
    #[error("Coordinate buffers have mismatched lengths ({0} x, {1} y, {2} z, {3} flags)")]
    LengthMismatch(usize, usize, usize, usize),

    /// An affine matrix could not be inverted.
    #[error("Affine matrix is not invertible (determinant {0})")]
    SingularMatrix(f64),

    /// Too few probe points transformed to derive a source window.
    #[error("Too many points failed to transform ({succeeded} of {total} succeeded)")]
    TooFewPoints {
        /// Number of probe points that transformed.
        succeeded: usize,
        /// Number of probe points.
        total: usize,
    },
}

/// An error type for warp kernels and operations.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum WarpError {
    /// The warp options or kernel setup are invalid.
    #[error("Invalid warp configuration: {0}")]
    Configuration(String),

    /// The transformer reported a batch failure.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Reading or writing raster data failed.
    #[error(transparent)]
    Io(#[from] RasterError),

    /// The progress callback asked to stop.
    #[error("Warp cancelled by the progress callback")]
    UserCancelled,
}

impl From<ParallelError> for WarpError {
    fn from(err: ParallelError) -> Self {
        WarpError::Configuration(err.to_string())
    }
}
