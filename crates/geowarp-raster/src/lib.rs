#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `geowarp-raster` holds the in-memory representation every warp chunk works on:
//!
//! - [`WorkingType`]: the uniform numeric type of all bands during one kernel run
//! - [`RasterBuffer`]: a band-major flat buffer of samples in a working type
//! - [`ValidityMask`]: a packed one-bit-per-pixel validity bitmap
//! - [`DensityMask`]: one coverage/opacity float per pixel
//! - [`RasterSize`] and [`Window`]: raster extents and rectangular regions
//!
//! # Example
//!
//! ```
//! use geowarp_raster::{RasterBuffer, RasterSize, WorkingType};
//!
//! let size = RasterSize { width: 2, height: 2 };
//! let mut buffer = RasterBuffer::new(WorkingType::Byte, size, 1);
//! buffer.set(0, 3, 300.0, 0.0);
//!
//! // integer working types clamp on write
//! assert_eq!(buffer.get(0, 3), (255.0, 0.0));
//! ```

/// band-major sample buffers.
pub mod buffer;

/// working numeric types and the sample trait.
pub mod dtype;

/// Error types for the raster module.
pub mod error;

/// validity bitmaps and density arrays.
pub mod mask;

/// raster sizes and windows.
pub mod window;

pub use crate::buffer::{BandStorage, RasterBuffer};
pub use crate::dtype::{Sample, WorkingType};
pub use crate::error::RasterError;
pub use crate::mask::{DensityMask, ValidityMask};
pub use crate::window::{RasterSize, Window};
