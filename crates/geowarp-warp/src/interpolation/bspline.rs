use super::bilinear::bilinear;
use crate::accessor::{PixelValue, SourceChunk};

#[inline]
fn cube_pos(x: f64) -> f64 {
    if x > 0.0 {
        x * x * x
    } else {
        0.0
    }
}

/// Cubic B-spline basis function.
#[inline]
pub(crate) fn bspline(x: f64) -> f64 {
    (cube_pos(x + 2.0) - 4.0 * cube_pos(x + 1.0) + 6.0 * cube_pos(x) - 4.0 * cube_pos(x - 1.0))
        / 6.0
}

/// Kernel for cubic B-spline resampling
///
/// Weights each pixel of the 4x4 neighborhood by the B-spline basis of its
/// distance to `(x, y)`, skipping pixels without density. The result is
/// normalized by the weight sum unless it is already within 1e-5 of one.
/// Falls back to [`bilinear`] when the neighborhood is not entirely inside the chunk.
///
/// # Arguments
///
/// * `src` - The source chunk.
/// * `band` - The band to read.
/// * `x` - The x coordinate relative to the chunk.
/// * `y` - The y coordinate relative to the chunk.
pub(crate) fn cubic_spline(src: &SourceChunk, band: usize, x: f64, y: f64) -> Option<PixelValue> {
    let (width, height) = (src.width() as i64, src.height() as i64);
    let ix = (x - 0.5).floor() as i64;
    let iy = (y - 0.5).floor() as i64;
    let dx = x - 0.5 - ix as f64;
    let dy = y - 0.5 - iy as f64;

    if ix - 1 < 0 || ix + 2 >= width || iy - 1 < 0 || iy + 2 >= height {
        return bilinear(src, band, x, y);
    }

    let mut acc = PixelValue::default();
    let mut weight_sum = 0.0;
    for i in -1..=2i64 {
        let weight_x = bspline(i as f64 - dx);
        for j in -1..=2i64 {
            let weight_y = bspline(dy - j as f64);
            let offset = ((iy + j) * width + ix + i) as usize;
            let Some(value) = src.read(band, offset) else {
                continue;
            };
            if value.density < 1e-9 {
                continue;
            }
            let weight = weight_x * weight_y;
            acc.real += value.real * weight;
            acc.imag += value.imag * weight;
            acc.density += value.density * weight;
            weight_sum += weight;
        }
    }

    if weight_sum < 0.000001 || acc.density < 0.000001 {
        return None;
    }
    if !(0.99999..=1.00001).contains(&weight_sum) {
        acc.real /= weight_sum;
        acc.imag /= weight_sum;
        acc.density /= weight_sum;
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geowarp_raster::ValidityMask;

    use super::{bspline, cubic_spline};
    use crate::interpolation::test_utils::chunk;

    #[test]
    fn basis_values() {
        assert_relative_eq!(bspline(0.0), 2.0 / 3.0);
        assert_relative_eq!(bspline(1.0), 1.0 / 6.0);
        assert_relative_eq!(bspline(-1.0), 1.0 / 6.0);
        assert_eq!(bspline(2.0), 0.0);
        assert_eq!(bspline(-2.5), 0.0);
    }

    #[test]
    fn basis_partition_of_unity() {
        for t in [0.0, 0.1, 0.5, 0.93] {
            let sum: f64 = (-1..=2).map(|i| bspline(i as f64 - t)).sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn smooths_a_spike() {
        let mut values = vec![0.0; 49];
        values[24] = 6.0;
        let src = chunk(&values, 7);
        let v = cubic_spline(&src, 0, 3.5, 3.5).unwrap_or_default();
        // 6 * B(0) * B(0)
        assert_relative_eq!(v.real, 6.0 * 4.0 / 9.0, epsilon = 1e-12);
    }

    #[test]
    fn renormalizes_over_invalid_pixels() {
        let mut src = chunk(&[5.0; 49], 7);
        let mut valid = ValidityMask::all_valid(49);
        valid.set_invalid(24);
        src.unified_valid = Some(valid);
        let v = cubic_spline(&src, 0, 3.5, 3.5).unwrap_or_default();
        assert_relative_eq!(v.real, 5.0, epsilon = 1e-12);
        assert_relative_eq!(v.density, 1.0, epsilon = 1e-12);
    }
}
