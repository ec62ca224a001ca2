#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// masked pixel access on source and destination chunks.
pub mod accessor;

/// chunk descriptors and source windows.
pub mod chunk;

/// Error types for the warp module.
pub mod error;

/// resampling kernels.
pub mod interpolation;

/// the per-chunk warp kernel.
pub mod kernel;

/// validity and density mask generators.
pub mod masks;

/// the chunked warp operation.
pub mod operation;

/// warp options.
pub mod options;

/// utilities for parallel chunk execution.
pub mod parallel;

/// progress reporting and cancellation.
pub mod progress;

/// raster reader and writer contracts.
pub mod raster_io;

/// coordinate transformers.
pub mod transformer;

pub use crate::error::{TransformError, WarpError};
pub use crate::interpolation::ResampleAlg;
pub use crate::kernel::WarpKernel;
pub use crate::operation::WarpOperation;
pub use crate::options::{InitDest, NoData, WarpOptions};
