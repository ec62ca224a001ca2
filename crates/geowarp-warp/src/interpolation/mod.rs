//! Resampling kernels for the warp kernel.
//!
//! Every kernel takes fractional source coordinates relative to the top left
//! corner of a [`SourceChunk`] (pixel centers at `i + 0.5`) and returns the
//! interpolated [`PixelValue`], or `None` when no valid source pixel contributed.
//!
//! # Kernels
//!
//! - **Nearest**: reads the pixel containing the coordinate.
//! - **Bilinear**: weighted mean of the 2x2 neighborhood, normalized by the weights used.
//! - **Cubic**: separable cubic convolution over a 4x4 neighborhood.
//! - **CubicSpline**: cubic B-spline over a 4x4 neighborhood.
//!
//! The 4x4 kernels fall back to bilinear wherever their support window is not
//! fully inside the chunk or contains an invalid pixel.

mod bicubic;
mod bilinear;
mod bspline;
mod nearest;

pub(crate) use nearest::nearest_pixel;

use crate::accessor::{PixelValue, SourceChunk};

/// Resampling algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleAlg {
    /// Nearest neighbour
    #[default]
    Nearest,
    /// Bilinear interpolation over 2x2 pixels
    Bilinear,
    /// Cubic convolution over 4x4 pixels
    Cubic,
    /// Cubic B-spline over 4x4 pixels
    CubicSpline,
}

impl ResampleAlg {
    /// Every supported algorithm.
    pub const ALL: [ResampleAlg; 4] = [
        ResampleAlg::Nearest,
        ResampleAlg::Bilinear,
        ResampleAlg::Cubic,
        ResampleAlg::CubicSpline,
    ];

    /// Number of source pixels beyond the nominal footprint the kernel reads.
    pub fn radius(&self) -> usize {
        match self {
            ResampleAlg::Nearest => 0,
            ResampleAlg::Bilinear => 1,
            ResampleAlg::Cubic | ResampleAlg::CubicSpline => 2,
        }
    }
}

/// Resample `band` of `src` at the chunk-relative coordinate `(x, y)`.
///
/// # Arguments
///
/// * `src` - The source chunk.
/// * `alg` - The resampling algorithm.
/// * `band` - The band index inside the chunk.
/// * `x` - The x coordinate relative to the chunk.
/// * `y` - The y coordinate relative to the chunk.
///
/// # Returns
///
/// The interpolated value, or `None` if no valid pixel contributed.
pub fn resample(src: &SourceChunk, alg: ResampleAlg, band: usize, x: f64, y: f64) -> Option<PixelValue> {
    match alg {
        ResampleAlg::Nearest => nearest::nearest(src, band, x, y),
        ResampleAlg::Bilinear => bilinear::bilinear(src, band, x, y),
        ResampleAlg::Cubic => bicubic::cubic(src, band, x, y),
        ResampleAlg::CubicSpline => bspline::cubic_spline(src, band, x, y),
    }
}

/// Reads the 4x4 neighborhood around `(ix, iy)` (from `-1` to `+2` on each axis).
///
/// Returns `None` when the window leaves the chunk or any pixel is invalid.
pub(crate) fn read_window_4x4(
    src: &SourceChunk,
    band: usize,
    ix: i64,
    iy: i64,
) -> Option<[[PixelValue; 4]; 4]> {
    let (width, height) = (src.width() as i64, src.height() as i64);
    if ix - 1 < 0 || ix + 2 >= width || iy - 1 < 0 || iy + 2 >= height {
        return None;
    }
    let mut window = [[PixelValue::default(); 4]; 4];
    for (j, row) in window.iter_mut().enumerate() {
        let row_offset = ((iy - 1 + j as i64) * width + ix - 1) as usize;
        for (i, px) in row.iter_mut().enumerate() {
            let value = src.read(band, row_offset + i)?;
            if value.density < 1e-9 {
                return None;
            }
            *px = value;
        }
    }
    Some(window)
}

#[cfg(test)]
pub(crate) mod test_utils {
    use geowarp_raster::{RasterBuffer, RasterSize, WorkingType};

    use crate::accessor::SourceChunk;

    /// Single band Float64 chunk from row-major values.
    pub fn chunk(values: &[f64], width: usize) -> SourceChunk {
        let size = RasterSize {
            width,
            height: values.len() / width,
        };
        let buffer = RasterBuffer::from_vec(WorkingType::Float64, size, 1, values.to_vec())
            .unwrap_or_else(|_| RasterBuffer::new(WorkingType::Float64, size, 1));
        SourceChunk::new(buffer, 0, 0)
    }
}
