use crate::accessor::{PixelValue, SourceChunk};

/// Chunk pixel containing the coordinate, or `None` outside the chunk.
#[inline]
pub(crate) fn nearest_pixel(width: usize, height: usize, x: f64, y: f64) -> Option<(usize, usize)> {
    let (fx, fy) = ((x + 1e-10).floor(), (y + 1e-10).floor());
    // written so that NaN fails the test
    if !(fx >= 0.0 && fy >= 0.0 && fx < width as f64 && fy < height as f64) {
        return None;
    }
    Some((fx as usize, fy as usize))
}

/// Kernel for nearest neighbour resampling
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
/// The pixel containing `(x, y)`, if valid.
pub(crate) fn nearest(src: &SourceChunk, band: usize, x: f64, y: f64) -> Option<PixelValue> {
    let (ix, iy) = nearest_pixel(src.width(), src.height(), x, y)?;
    src.read(band, iy * src.width() + ix)
}

#[cfg(test)]
mod tests {
    use super::{nearest, nearest_pixel};
    use crate::interpolation::test_utils::chunk;

    #[test]
    fn picks_containing_pixel() {
        let src = chunk(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(nearest(&src, 0, 0.5, 0.5).map(|v| v.real), Some(1.0));
        assert_eq!(nearest(&src, 0, 1.0, 0.99).map(|v| v.real), Some(2.0));
        assert_eq!(nearest(&src, 0, 1.9999999999999, 1.2).map(|v| v.real), Some(4.0));
        assert_eq!(nearest(&src, 0, 2.0, 0.5), None);
        assert_eq!(nearest(&src, 0, -0.1, 0.5), None);
    }

    #[test]
    fn nan_is_outside() {
        assert_eq!(nearest_pixel(4, 4, f64::NAN, 1.0), None);
        assert_eq!(nearest_pixel(4, 4, 1.0, f64::INFINITY), None);
    }
}
