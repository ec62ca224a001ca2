use crate::dtype::WorkingType;
use crate::window::{RasterSize, Window};

/// An error type for the raster module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RasterError {
    /// Error when the data length does not match the buffer geometry.
    #[error("Data length ({0}) does not match the buffer size ({1})")]
    InvalidDataLength(usize, usize),

    /// Error when a typed sample vector cannot back the requested working type.
    #[error("Sample type {sample} cannot back working type {working_type:?}")]
    TypeMismatch {
        /// Name of the Rust sample type that was provided.
        sample: &'static str,
        /// Working type that was requested.
        working_type: WorkingType,
    },

    /// Error when a band index is out of range.
    #[error("Band index {0} is out of range for {1} bands")]
    BandOutOfRange(usize, usize),

    /// Error when a window does not fit into a raster.
    #[error("Window {window} does not fit into a raster of {size}")]
    WindowOutOfBounds {
        /// The offending window.
        window: Window,
        /// The size of the raster.
        size: RasterSize,
    },

    /// Error raised by a raster reader or writer.
    #[error("Raster I/O failed: {0}")]
    Io(String),
}
