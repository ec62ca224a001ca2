use super::bilinear::bilinear;
use super::read_window_4x4;
use crate::accessor::{PixelValue, SourceChunk};

/// Cubic convolution of four equally spaced samples at offset `t` in `[0, 1)` past `f1`.
#[inline]
pub(crate) fn cubic_convolution(t: f64, f0: f64, f1: f64, f2: f64, f3: f64) -> f64 {
    (-f0 + f1 - f2 + f3) * t * t * t + (2.0 * (f0 - f1) + f2 - f3) * t * t + (-f0 + f2) * t + f1
}

/// Kernel for cubic convolution resampling
///
/// Interpolates along each of the four rows of the 4x4 neighborhood, then down
/// the resulting column. Density, real and imaginary parts are interpolated
/// independently. Falls back to [`bilinear`] when the neighborhood is not
/// entirely inside the chunk or holds an invalid pixel.
///
/// # Arguments
///
/// * `src` - The source chunk.
/// * `band` - The band to read.
/// * `x` - The x coordinate relative to the chunk.
/// * `y` - The y coordinate relative to the chunk.
pub(crate) fn cubic(src: &SourceChunk, band: usize, x: f64, y: f64) -> Option<PixelValue> {
    let ix = (x - 0.5).floor() as i64;
    let iy = (y - 0.5).floor() as i64;
    let dx = x - 0.5 - ix as f64;
    let dy = y - 0.5 - iy as f64;

    let Some(window) = read_window_4x4(src, band, ix, iy) else {
        return bilinear(src, band, x, y);
    };

    let mut column = [PixelValue::default(); 4];
    for (row, out) in window.iter().zip(column.iter_mut()) {
        out.density = cubic_convolution(dx, row[0].density, row[1].density, row[2].density, row[3].density);
        out.real = cubic_convolution(dx, row[0].real, row[1].real, row[2].real, row[3].real);
        out.imag = cubic_convolution(dx, row[0].imag, row[1].imag, row[2].imag, row[3].imag);
    }

    Some(PixelValue {
        density: cubic_convolution(dy, column[0].density, column[1].density, column[2].density, column[3].density),
        real: cubic_convolution(dy, column[0].real, column[1].real, column[2].real, column[3].real),
        imag: cubic_convolution(dy, column[0].imag, column[1].imag, column[2].imag, column[3].imag),
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geowarp_raster::ValidityMask;

    use super::{cubic, cubic_convolution};
    use crate::interpolation::bilinear::bilinear;
    use crate::interpolation::test_utils::chunk;

    #[test]
    fn convolution_interpolates_endpoints() {
        assert_relative_eq!(cubic_convolution(0.0, 1.0, 2.0, 5.0, 3.0), 2.0);
        assert_relative_eq!(cubic_convolution(1.0, 1.0, 2.0, 5.0, 3.0), 5.0);
        // 2t^3 - 3t^2 + 2t + 1
        assert_relative_eq!(cubic_convolution(0.25, 0.0, 1.0, 2.0, 3.0), 1.34375);
    }

    #[test]
    fn horizontal_ramp() {
        let values: Vec<f64> = (0..36).map(|i| (i % 6) as f64 * 10.0).collect();
        let src = chunk(&values, 6);
        let v = cubic(&src, 0, 2.75, 3.1).unwrap_or_default();
        // rows are 10, 20, 30, 40 around x with dx = 0.25; columns are constant
        assert_relative_eq!(v.real, 10.0 + 10.0 * 1.34375, epsilon = 1e-9);
        assert_relative_eq!(v.density, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn invalid_pixel_in_window_uses_bilinear() {
        let values: Vec<f64> = (0..36).map(|i| (i * i) as f64).collect();
        let mut src = chunk(&values, 6);
        let mut valid = ValidityMask::all_valid(36);
        // (1, 1) lies in the 4x4 window of (2.7, 2.7) but not in its 2x2 one
        valid.set_invalid(7);
        src.unified_valid = Some(valid);
        assert_eq!(cubic(&src, 0, 2.7, 2.7), bilinear(&src, 0, 2.7, 2.7));
    }
}
