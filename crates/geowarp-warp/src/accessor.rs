//! Masked, typed access to single pixels of the chunks a warp kernel works on.
//!
//! Reads honor the per-band and unified validity bitmaps and the unified
//! density array of the source chunk. Writes composite partially transparent
//! values over the existing destination pixel.

use geowarp_raster::{DensityMask, RasterBuffer, ValidityMask, Window};

/// Densities at or above this are written without blending.
pub const OPAQUE_DENSITY: f64 = 0.9999;

/// Densities below this are dropped on write and ignored when overlaying.
pub const MIN_WRITE_DENSITY: f64 = 0.0001;

/// A sampled pixel: density plus real and imaginary parts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelValue {
    /// Coverage/opacity of the sample in `[0, 1]`.
    pub density: f64,
    /// Real part.
    pub real: f64,
    /// Imaginary part, 0 for real working types.
    pub imag: f64,
}

/// The source side of one warp chunk.
#[derive(Debug, Clone)]
pub struct SourceChunk {
    /// Band data of the source window.
    pub buffer: RasterBuffer,
    /// Column of the window in the source raster.
    pub x_off: usize,
    /// Row of the window in the source raster.
    pub y_off: usize,
    /// Optional validity bitmap per band. Empty when no band has one.
    pub band_valid: Vec<Option<ValidityMask>>,
    /// Optional validity bitmap applying to every band.
    pub unified_valid: Option<ValidityMask>,
    /// Optional density applying to every band.
    pub unified_density: Option<DensityMask>,
}

impl SourceChunk {
    /// Create a source chunk without masks.
    pub fn new(buffer: RasterBuffer, x_off: usize, y_off: usize) -> Self {
        Self {
            buffer,
            x_off,
            y_off,
            band_valid: Vec::new(),
            unified_valid: None,
            unified_density: None,
        }
    }

    /// The window this chunk covers in the source raster.
    pub fn window(&self) -> Window {
        Window::new(self.x_off, self.y_off, self.width(), self.height())
    }

    /// Width of the chunk in pixels.
    pub fn width(&self) -> usize {
        self.buffer.width()
    }

    /// Height of the chunk in pixels.
    pub fn height(&self) -> usize {
        self.buffer.height()
    }

    /// Whether any mask or density array is attached.
    pub fn has_masks(&self) -> bool {
        self.unified_valid.is_some()
            || self.unified_density.is_some()
            || self.band_valid.iter().any(Option::is_some)
    }

    /// Read pixel `offset` of `band`.
    ///
    /// Returns `None` when the pixel is excluded by the unified or band
    /// validity bitmap or has zero density.
    #[inline]
    pub fn read(&self, band: usize, offset: usize) -> Option<PixelValue> {
        if let Some(valid) = &self.unified_valid {
            if !valid.is_valid(offset) {
                return None;
            }
        }
        if let Some(Some(valid)) = self.band_valid.get(band) {
            if !valid.is_valid(offset) {
                return None;
            }
        }
        let density = match &self.unified_density {
            Some(density) => density.get(offset) as f64,
            None => 1.0,
        };
        if density == 0.0 {
            return None;
        }
        let (real, imag) = self.buffer.get(band, offset);
        Some(PixelValue {
            density,
            real,
            imag,
        })
    }
}

/// The destination side of one warp chunk.
#[derive(Debug, Clone)]
pub struct DestinationChunk {
    /// Band data of the destination window.
    pub buffer: RasterBuffer,
    /// Column of the window in the destination raster.
    pub x_off: usize,
    /// Row of the window in the destination raster.
    pub y_off: usize,
    /// Optional bitmap of pixels holding data.
    pub valid: Option<ValidityMask>,
    /// Optional density of the pixels.
    pub density: Option<DensityMask>,
    /// Optional nodata value (real part) per band that written values must avoid.
    pub nodata: Option<Vec<f64>>,
}

impl DestinationChunk {
    /// Create a destination chunk without masks.
    pub fn new(buffer: RasterBuffer, x_off: usize, y_off: usize) -> Self {
        Self {
            buffer,
            x_off,
            y_off,
            valid: None,
            density: None,
            nodata: None,
        }
    }

    /// The window this chunk covers in the destination raster.
    pub fn window(&self) -> Window {
        Window::new(self.x_off, self.y_off, self.width(), self.height())
    }

    /// Width of the chunk in pixels.
    pub fn width(&self) -> usize {
        self.buffer.width()
    }

    /// Height of the chunk in pixels.
    pub fn height(&self) -> usize {
        self.buffer.height()
    }

    /// Whether pixel `offset` is marked as holding data. False without a bitmap.
    #[inline]
    pub fn is_valid(&self, offset: usize) -> bool {
        self.valid.as_ref().is_some_and(|v| v.is_valid(offset))
    }

    /// Mark pixel `offset` as holding data, if a bitmap is attached.
    #[inline]
    pub fn mark_valid(&mut self, offset: usize) {
        if let Some(valid) = &mut self.valid {
            valid.set_valid(offset);
        }
    }

    /// Write a sample with the given density to pixel `offset` of `band`.
    ///
    /// Opaque samples overwrite the pixel. Partially transparent samples are
    /// blended with the existing value, weighted by the existing density
    /// (from the density array, else 0 for pixels not marked valid, else 1).
    /// Samples with density below [`MIN_WRITE_DENSITY`] leave the pixel untouched.
    ///
    /// # Example
    ///
    /// ```
    /// use geowarp_raster::{RasterBuffer, RasterSize, WorkingType};
    /// use geowarp_warp::accessor::DestinationChunk;
    ///
    /// let buffer = RasterBuffer::from_vec(
    ///     WorkingType::Float32,
    ///     RasterSize { width: 1, height: 1 },
    ///     1,
    ///     vec![10.0f32],
    /// )
    /// .unwrap();
    /// let mut dst = DestinationChunk::new(buffer, 0, 0);
    /// dst.write(0, 0, 0.5, 30.0, 0.0);
    /// assert_eq!(dst.buffer.get(0, 0), (20.0, 0.0));
    /// ```
    #[inline]
    pub fn write(&mut self, band: usize, offset: usize, density: f64, real: f64, imag: f64) {
        let (mut real, mut imag) = (real, imag);
        if density < OPAQUE_DENSITY {
            if density < MIN_WRITE_DENSITY {
                return;
            }
            let existing_density = match &self.density {
                Some(d) => d.get(offset) as f64,
                None => match &self.valid {
                    Some(v) if !v.is_valid(offset) => 0.0,
                    _ => 1.0,
                },
            };
            let influence = (1.0 - density) * existing_density;
            let (dst_real, dst_imag) = self.buffer.get(band, offset);
            let total = density + influence;
            real = (real * density + dst_real * influence) / total;
            imag = (imag * density + dst_imag * influence) / total;
        }
        let nodata = self.nodata.as_ref().and_then(|n| n.get(band).copied());
        self.buffer.set_avoiding(band, offset, real, imag, nodata);
    }

    /// Composite `density` over the destination density of pixel `offset`.
    #[inline]
    pub fn overlay_density(&mut self, offset: usize, density: f64) {
        if density < MIN_WRITE_DENSITY {
            return;
        }
        if let Some(dst) = &mut self.density {
            let old = dst.get(offset) as f64;
            dst.set(offset, (1.0 - (1.0 - density) * (1.0 - old)) as f32);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geowarp_raster::{
        DensityMask, RasterBuffer, RasterError, RasterSize, ValidityMask, WorkingType,
    };

    use super::{DestinationChunk, PixelValue, SourceChunk};

    fn single_band(values: Vec<f32>, width: usize) -> Result<RasterBuffer, RasterError> {
        let height = values.len() / width;
        RasterBuffer::from_vec(
            WorkingType::Float32,
            RasterSize { width, height },
            1,
            values,
        )
    }

    #[test]
    fn read_honors_masks() -> Result<(), RasterError> {
        let mut src = SourceChunk::new(single_band(vec![1.0, 2.0, 3.0, 4.0], 2)?, 0, 0);
        assert_eq!(
            src.read(0, 1),
            Some(PixelValue {
                density: 1.0,
                real: 2.0,
                imag: 0.0
            })
        );

        let mut unified = ValidityMask::all_valid(4);
        unified.set_invalid(0);
        src.unified_valid = Some(unified);
        let mut band = ValidityMask::all_valid(4);
        band.set_invalid(1);
        src.band_valid = vec![Some(band)];
        src.unified_density = Some(DensityMask::from_vec(vec![1.0, 1.0, 0.0, 0.5]));

        assert_eq!(src.read(0, 0), None);
        assert_eq!(src.read(0, 1), None);
        assert_eq!(src.read(0, 2), None);
        assert_eq!(src.read(0, 3).map(|v| v.density), Some(0.5));
        assert!(src.has_masks());
        Ok(())
    }

    #[test]
    fn blend_half_density() -> Result<(), RasterError> {
        let mut dst = DestinationChunk::new(single_band(vec![8.0], 1)?, 0, 0);
        dst.density = Some(DensityMask::filled(1, 1.0));
        dst.write(0, 0, 0.5, 4.0, 0.0);
        assert_eq!(dst.buffer.get(0, 0), (6.0, 0.0));
        Ok(())
    }

    #[test]
    fn blend_over_invalid_pixel_replaces() -> Result<(), RasterError> {
        let mut dst = DestinationChunk::new(single_band(vec![100.0], 1)?, 0, 0);
        dst.valid = Some(ValidityMask::all_invalid(1));
        dst.write(0, 0, 0.25, 4.0, 0.0);
        assert_eq!(dst.buffer.get(0, 0), (4.0, 0.0));
        Ok(())
    }

    #[test]
    fn tiny_density_is_dropped() -> Result<(), RasterError> {
        let mut dst = DestinationChunk::new(single_band(vec![8.0], 1)?, 0, 0);
        dst.density = Some(DensityMask::filled(1, 0.5));
        dst.write(0, 0, 0.00005, 100.0, 0.0);
        dst.overlay_density(0, 0.00005);
        assert_eq!(dst.buffer.get(0, 0), (8.0, 0.0));
        assert_eq!(dst.density.as_ref().map(|d| d.get(0)), Some(0.5));
        Ok(())
    }

    #[test]
    fn overlay_density_accumulates() -> Result<(), RasterError> {
        let mut dst = DestinationChunk::new(single_band(vec![0.0], 1)?, 0, 0);
        dst.density = Some(DensityMask::filled(1, 0.5));
        dst.overlay_density(0, 0.5);
        assert_relative_eq!(dst.density.as_ref().map_or(0.0, |d| d.get(0)), 0.75);
        Ok(())
    }

    #[test]
    fn write_avoids_nodata() -> Result<(), RasterError> {
        let buffer = RasterBuffer::new(WorkingType::Byte, RasterSize { width: 2, height: 1 }, 1);
        let mut dst = DestinationChunk::new(buffer, 0, 0);
        dst.nodata = Some(vec![0.0]);
        dst.write(0, 0, 1.0, 0.2, 0.0);
        dst.write(0, 1, 1.0, 254.6, 0.0);
        assert_eq!(dst.buffer.as_slice::<u8>(), Some(&[1u8, 255][..]));
        Ok(())
    }

    #[test]
    fn valid_bits() -> Result<(), RasterError> {
        let mut dst = DestinationChunk::new(single_band(vec![0.0; 4], 2)?, 0, 0);
        dst.mark_valid(2);
        assert!(!dst.is_valid(2));
        dst.valid = Some(ValidityMask::all_invalid(4));
        dst.mark_valid(2);
        assert!(dst.is_valid(2));
        assert!(!dst.is_valid(1));
        Ok(())
    }
}
