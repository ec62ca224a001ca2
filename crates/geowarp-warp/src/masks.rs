//! Mask generators building the validity bitmaps and density arrays of a chunk.
//!
//! A [`MaskGenerator`] is invoked once per chunk with the chunk window and its
//! band data and fills either a [`ValidityMask`] or a [`DensityMask`]. The
//! built-in generators cover nodata values and alpha bands; cutlines are
//! supplied by the caller as their own generator.

use std::sync::Arc;

use geowarp_raster::{DensityMask, RasterBuffer, ValidityMask, Window, WorkingType};

use crate::error::WarpError;
use crate::options::NoData;
use crate::raster_io::RasterReader;

/// The chunk a mask is generated for.
#[derive(Debug, Clone, Copy)]
pub struct MaskContext<'a> {
    /// Window of the chunk in its raster.
    pub window: Window,
    /// Band data of the chunk in the working type.
    pub data: &'a RasterBuffer,
    /// Band of `data` the mask is for, or `None` for a mask applying to all bands.
    pub band: Option<usize>,
    /// Blend distance in pixels, used by cutline generators.
    pub blend_distance: f64,
}

/// The array a generator fills.
#[derive(Debug)]
pub enum MaskBuffer<'a> {
    /// A validity bitmap, initialized to all valid.
    Validity(&'a mut ValidityMask),
    /// A density array.
    Density(&'a mut DensityMask),
}

/// What a generator found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskCoverage {
    /// The mask excludes or weakens some pixels.
    Partial,
    /// Every pixel is valid (or fully opaque); the mask may be discarded.
    AllValid,
}

/// Builds a validity or density mask for one chunk.
pub trait MaskGenerator: Send + Sync {
    /// Fill `mask` for the chunk described by `context`.
    fn generate(
        &self,
        context: &MaskContext<'_>,
        mask: MaskBuffer<'_>,
    ) -> Result<MaskCoverage, WarpError>;
}

impl<T: MaskGenerator + ?Sized> MaskGenerator for Arc<T> {
    fn generate(
        &self,
        context: &MaskContext<'_>,
        mask: MaskBuffer<'_>,
    ) -> Result<MaskCoverage, WarpError> {
        (**self).generate(context, mask)
    }
}

/// Marks invalid the pixels of one band equal to a nodata value.
///
/// # Example
///
/// ```
/// use geowarp_raster::{RasterBuffer, RasterSize, ValidityMask, Window, WorkingType};
/// use geowarp_warp::masks::{MaskBuffer, MaskContext, MaskCoverage, MaskGenerator, NoDataMasker};
/// use geowarp_warp::NoData;
///
/// let size = RasterSize { width: 3, height: 1 };
/// let data = RasterBuffer::from_vec(WorkingType::Byte, size, 1, vec![0u8, 5, 0]).unwrap();
/// let context = MaskContext {
///     window: Window::full(size),
///     data: &data,
///     band: Some(0),
///     blend_distance: 0.0,
/// };
///
/// let mut mask = ValidityMask::all_valid(3);
/// let coverage = NoDataMasker::new(NoData::from(0.0))
///     .generate(&context, MaskBuffer::Validity(&mut mask))
///     .unwrap();
/// assert_eq!(coverage, MaskCoverage::Partial);
/// assert_eq!(mask.count_valid(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoDataMasker {
    nodata: NoData,
}

impl NoDataMasker {
    /// Create a masker for `nodata`.
    pub fn new(nodata: NoData) -> Self {
        Self { nodata }
    }

    /// Whether sample `(real, imag)` of `working_type` is the nodata value.
    ///
    /// `None` means no sample of this type can be nodata.
    fn matcher(&self, working_type: WorkingType) -> Option<impl Fn(f64, f64) -> bool> {
        let NoData { real, imag } = self.nodata;
        let integer = working_type.is_integer();
        if integer {
            let representable = real >= working_type.min_value()
                && real <= working_type.max_value() + 0.000001
                && (working_type.is_complex() || imag == 0.0);
            if !representable {
                return None;
            }
        } else if !working_type.is_complex() && imag != 0.0 {
            return None;
        }

        let real = if integer { (real + 0.000001).floor() } else { real };
        let imag = if integer { (imag + 0.000001).floor() } else { imag };
        let float32 = matches!(working_type, WorkingType::Float32 | WorkingType::CFloat32);
        let complex = working_type.is_complex();
        Some(move |re: f64, im: f64| {
            let matches = |value: f64, nodata: f64| {
                if integer {
                    value == nodata
                } else if float32 {
                    nodata_equal(value, nodata as f32 as f64)
                } else {
                    nodata_equal(value, nodata)
                }
            };
            matches(re, real) && (!complex || matches(im, imag))
        })
    }
}

/// Equality of floating samples with a relative tolerance. NaN matches NaN.
fn nodata_equal(value: f64, nodata: f64) -> bool {
    if nodata.is_nan() {
        return value.is_nan();
    }
    value == nodata
        || (value - nodata).abs() < 1e-10
        || (nodata != 0.0 && (1.0 - value / nodata).abs() < 1e-10)
}

impl MaskGenerator for NoDataMasker {
    fn generate(
        &self,
        context: &MaskContext<'_>,
        mask: MaskBuffer<'_>,
    ) -> Result<MaskCoverage, WarpError> {
        let MaskBuffer::Validity(mask) = mask else {
            return Err(WarpError::Configuration(
                "nodata masks are validity bitmaps".into(),
            ));
        };
        let band = context.band.ok_or_else(|| {
            WarpError::Configuration("nodata masks are generated per band".into())
        })?;
        let pixels = context.data.pixel_count();
        if band >= context.data.band_count() || mask.len() != pixels {
            return Err(WarpError::Configuration(
                "nodata mask does not match the chunk".into(),
            ));
        }

        let Some(is_nodata) = self.matcher(context.data.working_type()) else {
            return Ok(MaskCoverage::AllValid);
        };
        let mut all_valid = true;
        for offset in 0..pixels {
            let (re, im) = context.data.get(band, offset);
            if is_nodata(re, im) {
                all_valid = false;
                mask.set_invalid(offset);
            }
        }
        Ok(if all_valid {
            MaskCoverage::AllValid
        } else {
            MaskCoverage::Partial
        })
    }
}

/// Builds density from an alpha band: `alpha / alpha_max`, at most 1.
///
/// The alpha band is read from `raster` over the chunk window, not taken from
/// the chunk data.
pub struct AlphaMasker<R: RasterReader + ?Sized> {
    raster: Arc<R>,
    band: usize,
    alpha_max: f64,
}

impl<R: RasterReader + ?Sized> AlphaMasker<R> {
    /// Create a masker for the 1-based alpha `band` of `raster`.
    pub fn new(raster: Arc<R>, band: usize, alpha_max: f64) -> Self {
        Self {
            raster,
            band,
            alpha_max,
        }
    }

    /// Write `density` back to the alpha band as `density * alpha_max`.
    pub(crate) fn store(
        &self,
        window: Window,
        density: &DensityMask,
    ) -> Result<(), WarpError>
    where
        R: crate::raster_io::RasterWriter,
    {
        let values: Vec<f32> = density
            .as_slice()
            .iter()
            .map(|&d| (d as f64 * self.alpha_max) as f32)
            .collect();
        let buffer = RasterBuffer::from_vec(WorkingType::Float32, window.size(), 1, values)?;
        self.raster.write_window(&[self.band], window, &buffer)?;
        Ok(())
    }
}

impl<R: RasterReader + ?Sized> MaskGenerator for AlphaMasker<R> {
    fn generate(
        &self,
        context: &MaskContext<'_>,
        mask: MaskBuffer<'_>,
    ) -> Result<MaskCoverage, WarpError> {
        let MaskBuffer::Density(density) = mask else {
            return Err(WarpError::Configuration("alpha masks are density arrays".into()));
        };
        if density.len() != context.window.pixel_count() {
            return Err(WarpError::Configuration(
                "alpha mask does not match the chunk".into(),
            ));
        }

        let alpha = self
            .raster
            .read_window(&[self.band], context.window, WorkingType::Float32)?;
        let alpha = alpha
            .as_slice::<f32>()
            .ok_or_else(|| WarpError::Configuration("alpha band was not read as Float32".into()))?;

        let inv_alpha_max = (1.0 / self.alpha_max) as f32;
        let mut all_opaque = true;
        for (d, &a) in density.as_mut_slice().iter_mut().zip(alpha) {
            let value = a * inv_alpha_max;
            *d = if value >= 1.0 {
                1.0
            } else {
                all_opaque = false;
                value.max(0.0)
            };
        }
        Ok(if all_opaque {
            MaskCoverage::AllValid
        } else {
            MaskCoverage::Partial
        })
    }
}
