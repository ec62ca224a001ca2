use crate::accessor::{PixelValue, SourceChunk};

/// Kernel for bilinear resampling
///
/// Accumulates the valid corners of the 2x2 neighborhood around `(x, y)` and
/// normalizes by the weight actually used, so pixels next to invalid or
/// out-of-chunk corners still resolve.
///
/// # Arguments
///
/// * `src` - The source chunk.
/// * `band` - The band to read.
/// * `x` - The x coordinate relative to the chunk.
/// * `y` - The y coordinate relative to the chunk.
///
/// # Returns
///
/// The interpolated value, or `None` when the used weight is below 1e-5.
pub(crate) fn bilinear(src: &SourceChunk, band: usize, x: f64, y: f64) -> Option<PixelValue> {
    let (width, height) = (src.width() as i64, src.height() as i64);

    let ix = (x - 0.5).floor() as i64;
    let iy = (y - 0.5).floor() as i64;
    let ratio_x = 1.5 - (x - ix as f64);
    let ratio_y = 1.5 - (y - iy as f64);

    let corners = [
        (ix, iy, ratio_x * ratio_y),
        (ix + 1, iy, (1.0 - ratio_x) * ratio_y),
        (ix + 1, iy + 1, (1.0 - ratio_x) * (1.0 - ratio_y)),
        (ix, iy + 1, ratio_x * (1.0 - ratio_y)),
    ];

    let mut acc = PixelValue::default();
    let mut divisor = 0.0;
    for (cx, cy, weight) in corners {
        if cx < 0 || cy < 0 || cx >= width || cy >= height {
            continue;
        }
        let Some(value) = src.read(band, (cy * width + cx) as usize) else {
            continue;
        };
        if value.density <= 1e-9 {
            continue;
        }
        divisor += weight;
        acc.real += value.real * weight;
        acc.imag += value.imag * weight;
        acc.density += value.density * weight;
    }

    if divisor == 1.0 {
        Some(acc)
    } else if divisor < 0.00001 {
        None
    } else {
        Some(PixelValue {
            density: acc.density / divisor,
            real: acc.real / divisor,
            imag: acc.imag / divisor,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geowarp_raster::ValidityMask;

    use super::bilinear;
    use crate::interpolation::test_utils::chunk;

    #[test]
    fn on_grid_is_exact() {
        let src = chunk(&[1.0, 2.0, 3.0, 4.0], 2);
        let v = bilinear(&src, 0, 1.5, 0.5);
        assert_eq!(v.map(|v| (v.real, v.density)), Some((2.0, 1.0)));
    }

    #[test]
    fn mean_between_centers() {
        let src = chunk(&[10.0, 20.0, 50.0, 60.0], 2);
        let v = bilinear(&src, 0, 1.0, 1.0).map(|v| v.real).unwrap_or_default();
        assert_relative_eq!(v, 35.0);
        let v = bilinear(&src, 0, 0.75, 0.5).map(|v| v.real).unwrap_or_default();
        assert_relative_eq!(v, 12.5);
    }

    #[test]
    fn renormalizes_over_invalid_corners() {
        let mut src = chunk(&[10.0, 20.0, 50.0, 60.0], 2);
        let mut valid = ValidityMask::all_valid(4);
        valid.set_invalid(3);
        src.unified_valid = Some(valid);
        let v = bilinear(&src, 0, 1.0, 1.0).unwrap_or_default();
        assert_relative_eq!(v.real, 80.0 / 3.0);
        assert_relative_eq!(v.density, 1.0);
    }

    #[test]
    fn outside_has_no_contribution() {
        let src = chunk(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(bilinear(&src, 0, -1.0, 0.5), None);
        // half a pixel beyond the edge still sees the edge pixel
        assert_eq!(bilinear(&src, 0, -0.25, 0.5).map(|v| v.real), Some(1.0));
    }
}
