use std::sync::RwLock;

use geowarp_raster::{RasterBuffer, RasterError, RasterSize, Window, WorkingType};

/// Read access to a source raster.
///
/// Band indices are 1-based.
pub trait RasterReader: Send + Sync {
    /// Size of the raster in pixels.
    fn size(&self) -> RasterSize;

    /// Number of bands.
    fn band_count(&self) -> usize;

    /// Native numeric type of `band`.
    fn band_type(&self, band: usize) -> Result<WorkingType, RasterError>;

    /// Read `window` of `bands` into a new buffer of `working_type`.
    ///
    /// Pixels of the window outside the raster are returned with a fill value.
    fn read_window(
        &self,
        bands: &[usize],
        window: Window,
        working_type: WorkingType,
    ) -> Result<RasterBuffer, RasterError>;
}

/// Write access to a destination raster.
///
/// Implementations must accept concurrent writes of disjoint windows.
pub trait RasterWriter: RasterReader {
    /// Write `buffer` into `window` of `bands`. The buffer holds one band per entry of `bands`.
    fn write_window(
        &self,
        bands: &[usize],
        window: Window,
        buffer: &RasterBuffer,
    ) -> Result<(), RasterError>;
}

/// A raster held in memory behind a lock.
///
/// Reads convert to the requested working type with the usual clamping and
/// rounding rules, as do writes into the native type.
///
/// # Example
///
/// ```
/// use geowarp_raster::{RasterBuffer, RasterSize, Window, WorkingType};
/// use geowarp_warp::raster_io::{MemRaster, RasterReader};
///
/// let data = RasterBuffer::from_vec(
///     WorkingType::Byte,
///     RasterSize { width: 2, height: 1 },
///     1,
///     vec![1u8, 2],
/// )
/// .unwrap();
/// let raster = MemRaster::new(data);
///
/// // the second column lies outside the raster
/// let window = raster.read_window(&[1], Window::new(1, 0, 2, 1), WorkingType::Float32).unwrap();
/// assert_eq!(window.as_slice::<f32>(), Some(&[2.0f32, 0.0][..]));
/// ```
#[derive(Debug)]
pub struct MemRaster {
    data: RwLock<RasterBuffer>,
    fill: f64,
}

impl MemRaster {
    /// Wrap a buffer; out of bounds reads return 0.
    pub fn new(data: RasterBuffer) -> Self {
        Self::with_fill(data, 0.0)
    }

    /// Wrap a buffer; out of bounds reads return `fill`.
    pub fn with_fill(data: RasterBuffer, fill: f64) -> Self {
        Self {
            data: RwLock::new(data),
            fill,
        }
    }

    /// Create a raster of `band_count` bands of zeros.
    pub fn zeros(working_type: WorkingType, size: RasterSize, band_count: usize) -> Self {
        Self::new(RasterBuffer::new(working_type, size, band_count))
    }

    /// A copy of the current content.
    pub fn snapshot(&self) -> Result<RasterBuffer, RasterError> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(data.clone())
    }

    fn check_bands(bands: &[usize], band_count: usize) -> Result<(), RasterError> {
        match bands.iter().find(|&&b| b == 0 || b > band_count) {
            Some(&band) => Err(RasterError::BandOutOfRange(band, band_count)),
            None => Ok(()),
        }
    }
}

fn poisoned() -> RasterError {
    RasterError::Io("raster lock poisoned".into())
}

impl RasterReader for MemRaster {
    fn size(&self) -> RasterSize {
        self.data.read().map(|d| d.size()).unwrap_or_default()
    }

    fn band_count(&self) -> usize {
        self.data.read().map(|d| d.band_count()).unwrap_or_default()
    }

    fn band_type(&self, band: usize) -> Result<WorkingType, RasterError> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Self::check_bands(&[band], data.band_count())?;
        Ok(data.working_type())
    }

    fn read_window(
        &self,
        bands: &[usize],
        window: Window,
        working_type: WorkingType,
    ) -> Result<RasterBuffer, RasterError> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Self::check_bands(bands, data.band_count())?;

        let mut out = RasterBuffer::new(working_type, window.size(), bands.len());
        let (width, height) = (data.width(), data.height());
        for (i, &band) in bands.iter().enumerate() {
            out.fill_band(i, self.fill, 0.0)?;
            for row in 0..window.height {
                let y = window.y_off + row;
                if y >= height {
                    break;
                }
                for col in 0..window.width.min(width.saturating_sub(window.x_off)) {
                    let (re, im) = data.get(band - 1, y * width + window.x_off + col);
                    out.set(i, row * window.width + col, re, im);
                }
            }
        }
        Ok(out)
    }
}

impl RasterWriter for MemRaster {
    fn write_window(
        &self,
        bands: &[usize],
        window: Window,
        buffer: &RasterBuffer,
    ) -> Result<(), RasterError> {
        let mut data = self.data.write().map_err(|_| poisoned())?;
        Self::check_bands(bands, data.band_count())?;
        if buffer.band_count() != bands.len() {
            return Err(RasterError::BandOutOfRange(bands.len(), buffer.band_count()));
        }
        if buffer.size() != window.size() {
            return Err(RasterError::InvalidDataLength(
                buffer.pixel_count(),
                window.pixel_count(),
            ));
        }
        if !window.fits(data.size()) {
            return Err(RasterError::WindowOutOfBounds {
                window,
                size: data.size(),
            });
        }

        let width = data.width();
        for (i, &band) in bands.iter().enumerate() {
            for row in 0..window.height {
                let dst_row = (window.y_off + row) * width + window.x_off;
                for col in 0..window.width {
                    let (re, im) = buffer.get(i, row * window.width + col);
                    data.set(band - 1, dst_row + col, re, im);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use geowarp_raster::{RasterBuffer, RasterError, RasterSize, Window, WorkingType};

    use super::{MemRaster, RasterReader, RasterWriter};

    fn raster() -> Result<MemRaster, RasterError> {
        let data = RasterBuffer::from_vec(
            WorkingType::Int16,
            RasterSize { width: 3, height: 2 },
            2,
            vec![1i16, 2, 3, 4, 5, 6, -1, -2, -3, -4, -5, -6],
        )?;
        Ok(MemRaster::with_fill(data, 99.0))
    }

    #[test]
    fn read_converts_and_fills() -> Result<(), RasterError> {
        let raster = raster()?;
        assert_eq!(raster.size(), RasterSize { width: 3, height: 2 });
        assert_eq!(raster.band_type(2)?, WorkingType::Int16);

        let out = raster.read_window(&[2, 1], Window::new(1, 1, 3, 2), WorkingType::Float64)?;
        assert_eq!(out.band::<f64>(0), Some(&[-5.0, -6.0, 99.0, 99.0, 99.0, 99.0][..]));
        assert_eq!(out.band::<f64>(1), Some(&[5.0, 6.0, 99.0, 99.0, 99.0, 99.0][..]));
        Ok(())
    }

    #[test]
    fn read_clamps_to_working_type() -> Result<(), RasterError> {
        let raster = raster()?;
        let out = raster.read_window(&[2], Window::new(0, 0, 2, 1), WorkingType::Byte)?;
        assert_eq!(out.as_slice::<u8>(), Some(&[0u8, 0][..]));
        Ok(())
    }

    #[test]
    fn write_window_round_trips_region() -> Result<(), RasterError> {
        let raster = raster()?;
        let patch = RasterBuffer::from_vec(
            WorkingType::Float32,
            RasterSize { width: 2, height: 1 },
            1,
            vec![7.6f32, -8.0],
        )?;
        raster.write_window(&[1], Window::new(1, 0, 2, 1), &patch)?;
        let data = raster.snapshot()?;
        assert_eq!(data.band::<i16>(0), Some(&[1i16, 8, -8, 4, 5, 6][..]));
        Ok(())
    }

    #[test]
    fn rejects_bad_requests() -> Result<(), RasterError> {
        let raster = raster()?;
        assert_eq!(
            raster.band_type(3),
            Err(RasterError::BandOutOfRange(3, 2))
        );
        let patch = RasterBuffer::new(WorkingType::Int16, RasterSize { width: 2, height: 2 }, 1);
        assert!(matches!(
            raster.write_window(&[1], Window::new(2, 0, 2, 2), &patch),
            Err(RasterError::WindowOutOfBounds { .. })
        ));
        Ok(())
    }
}
