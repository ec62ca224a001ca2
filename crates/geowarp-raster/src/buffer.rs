use crate::dtype::{Sample, WorkingType};
use crate::error::RasterError;
use crate::window::RasterSize;

/// Typed backing storage of a [`RasterBuffer`].
///
/// Complex variants interleave the real and imaginary parts of each pixel.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub enum BandStorage {
    Byte(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    CInt16(Vec<i16>),
    CInt32(Vec<i32>),
    CFloat32(Vec<f32>),
    CFloat64(Vec<f64>),
}

macro_rules! with_storage {
    ($storage:expr, $data:ident => $body:expr) => {
        match $storage {
            BandStorage::Byte($data) => $body,
            BandStorage::Int16($data) | BandStorage::CInt16($data) => $body,
            BandStorage::UInt16($data) => $body,
            BandStorage::Int32($data) | BandStorage::CInt32($data) => $body,
            BandStorage::UInt32($data) => $body,
            BandStorage::Float32($data) | BandStorage::CFloat32($data) => $body,
            BandStorage::Float64($data) | BandStorage::CFloat64($data) => $body,
        }
    };
}

impl BandStorage {
    fn zeros(working_type: WorkingType, len: usize) -> Self {
        match working_type {
            WorkingType::Byte => BandStorage::Byte(vec![0; len]),
            WorkingType::Int16 => BandStorage::Int16(vec![0; len]),
            WorkingType::UInt16 => BandStorage::UInt16(vec![0; len]),
            WorkingType::Int32 => BandStorage::Int32(vec![0; len]),
            WorkingType::UInt32 => BandStorage::UInt32(vec![0; len]),
            WorkingType::Float32 => BandStorage::Float32(vec![0.0; len]),
            WorkingType::Float64 => BandStorage::Float64(vec![0.0; len]),
            WorkingType::CInt16 => BandStorage::CInt16(vec![0; len]),
            WorkingType::CInt32 => BandStorage::CInt32(vec![0; len]),
            WorkingType::CFloat32 => BandStorage::CFloat32(vec![0.0; len]),
            WorkingType::CFloat64 => BandStorage::CFloat64(vec![0.0; len]),
        }
    }

    fn len(&self) -> usize {
        with_storage!(self, data => data.len())
    }
}

/// A multi-band raster chunk held in memory.
///
/// Samples are laid out band-major: band `b`, pixel offset `o` (row-major
/// inside the band) lives at element `(b * width * height + o) * components`.
///
/// # Examples
///
/// ```
/// use geowarp_raster::{RasterBuffer, RasterSize, WorkingType};
///
/// let buffer = RasterBuffer::from_vec(
///     WorkingType::CInt16,
///     RasterSize { width: 2, height: 1 },
///     1,
///     vec![1i16, -1, 2, -2],
/// )
/// .unwrap();
///
/// assert_eq!(buffer.get(0, 1), (2.0, -2.0));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RasterBuffer {
    working_type: WorkingType,
    size: RasterSize,
    band_count: usize,
    storage: BandStorage,
}

impl RasterBuffer {
    /// Create a zero-filled buffer.
    pub fn new(working_type: WorkingType, size: RasterSize, band_count: usize) -> Self {
        let len = size.pixel_count() * band_count * working_type.components();
        Self {
            working_type,
            size,
            band_count,
            storage: BandStorage::zeros(working_type, len),
        }
    }

    /// Create a buffer from a flat band-major vector of samples.
    ///
    /// # Errors
    ///
    /// Fails when `T` cannot back `working_type` or when the vector length does
    /// not match the buffer geometry.
    pub fn from_vec<T: Sample>(
        working_type: WorkingType,
        size: RasterSize,
        band_count: usize,
        data: Vec<T>,
    ) -> Result<Self, RasterError> {
        let expected = size.pixel_count() * band_count * working_type.components();
        if data.len() != expected {
            return Err(RasterError::InvalidDataLength(data.len(), expected));
        }
        let storage = T::wrap(data, working_type).ok_or(RasterError::TypeMismatch {
            sample: std::any::type_name::<T>(),
            working_type,
        })?;
        Ok(Self {
            working_type,
            size,
            band_count,
            storage,
        })
    }

    /// Working type of the samples.
    pub fn working_type(&self) -> WorkingType {
        self.working_type
    }

    /// Size of one band.
    pub fn size(&self) -> RasterSize {
        self.size
    }

    /// Width of one band in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Height of one band in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Number of bands.
    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Number of pixels in one band.
    pub fn pixel_count(&self) -> usize {
        self.size.pixel_count()
    }

    /// Size of the buffer contents in bytes.
    pub fn size_bytes(&self) -> usize {
        self.storage.len() * self.working_type.component_bits() / 8
    }

    #[inline]
    fn index(&self, band: usize, offset: usize) -> usize {
        (band * self.size.pixel_count() + offset) * self.working_type.components()
    }

    /// Read the real and imaginary parts of a pixel.
    ///
    /// The imaginary part is 0 for real working types.
    ///
    /// # Panics
    ///
    /// Panics if `band` or `offset` is out of range.
    #[inline]
    pub fn get(&self, band: usize, offset: usize) -> (f64, f64) {
        let idx = self.index(band, offset);
        let complex = self.working_type.is_complex();
        with_storage!(&self.storage, data => {
            if complex {
                (data[idx].as_f64(), data[idx + 1].as_f64())
            } else {
                (data[idx].as_f64(), 0.0)
            }
        })
    }

    /// Write the real and imaginary parts of a pixel.
    ///
    /// Integer types clamp to their range and round half up. The imaginary
    /// part is dropped for real working types.
    ///
    /// # Panics
    ///
    /// Panics if `band` or `offset` is out of range.
    #[inline]
    pub fn set(&mut self, band: usize, offset: usize, real: f64, imag: f64) {
        self.set_avoiding(band, offset, real, imag, None);
    }

    /// Write a pixel, moving real integer results off `nodata`.
    ///
    /// When the rounded value of a real integer band equals `nodata` it is
    /// stored as `nodata + 1` at the type minimum and `nodata - 1` otherwise,
    /// so that written pixels never read back as missing.
    #[inline]
    pub fn set_avoiding(
        &mut self,
        band: usize,
        offset: usize,
        real: f64,
        imag: f64,
        nodata: Option<f64>,
    ) {
        let idx = self.index(band, offset);
        let complex = self.working_type.is_complex();
        with_storage!(&mut self.storage, data => {
            if complex {
                data[idx] = Sample::from_f64(real);
                data[idx + 1] = Sample::from_f64(imag);
            } else {
                let value = Sample::from_f64(real);
                data[idx] = match nodata {
                    Some(nodata) => Sample::avoid(value, nodata),
                    None => value,
                };
            }
        })
    }

    /// Fill a whole band with one value.
    ///
    /// # Errors
    ///
    /// Fails when `band` is out of range.
    pub fn fill_band(&mut self, band: usize, real: f64, imag: f64) -> Result<(), RasterError> {
        if band >= self.band_count {
            return Err(RasterError::BandOutOfRange(band, self.band_count));
        }
        let components = self.working_type.components();
        let start = self.index(band, 0);
        let end = start + self.pixel_count() * components;
        with_storage!(&mut self.storage, data => {
            let re = Sample::from_f64(real);
            let im = Sample::from_f64(imag);
            for px in data[start..end].chunks_exact_mut(components) {
                px[0] = re;
                if components == 2 {
                    px[1] = im;
                }
            }
        });
        Ok(())
    }

    /// Borrow all samples as a typed slice.
    ///
    /// Returns `None` when `T` does not back the working type.
    pub fn as_slice<T: Sample>(&self) -> Option<&[T]> {
        T::view(&self.storage)
    }

    /// Mutably borrow all samples as a typed slice.
    pub fn as_slice_mut<T: Sample>(&mut self) -> Option<&mut [T]> {
        T::view_mut(&mut self.storage)
    }

    /// Borrow the samples of one band as a typed slice.
    pub fn band<T: Sample>(&self, band: usize) -> Option<&[T]> {
        if band >= self.band_count {
            return None;
        }
        let start = self.index(band, 0);
        let len = self.pixel_count() * self.working_type.components();
        T::view(&self.storage).map(|data| &data[start..start + len])
    }
}
