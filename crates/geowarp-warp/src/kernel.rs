use geowarp_raster::{Sample, WorkingType};
use log::debug;

use crate::accessor::{DestinationChunk, SourceChunk};
use crate::error::WarpError;
use crate::interpolation::{resample, ResampleAlg};
use crate::progress::ScaledProgress;
use crate::transformer::{TransformDirection, Transformer};

/// Skip threshold for the unified source density of the pixel under a destination pixel.
const MIN_SOURCE_DENSITY: f64 = 0.00001;

/// Band results with a density below this are not written.
const MIN_BAND_DENSITY: f64 = 0.0000000001;

/// Lifecycle of a [`WarpKernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    /// Constructed, not yet validated.
    Created,
    /// Passed [`WarpKernel::validate`].
    Validated,
    /// Inside [`WarpKernel::perform_warp`].
    Running,
    /// The warp finished.
    Completed,
    /// Validation or the warp failed.
    Failed,
    /// The progress callback stopped the warp.
    Cancelled,
}

/// Low level warper for one chunk held in memory.
///
/// The kernel owns no data: it borrows a [`SourceChunk`] and mutates a
/// [`DestinationChunk`]. For every destination scanline it transforms the
/// pixel centers to source space in one batch, resamples each band and writes
/// the results with density compositing.
///
/// # Example
///
/// ```
/// use geowarp_raster::{RasterBuffer, RasterSize, WorkingType};
/// use geowarp_warp::accessor::{DestinationChunk, SourceChunk};
/// use geowarp_warp::kernel::{KernelState, WarpKernel};
/// use geowarp_warp::transformer::IdentityTransformer;
/// use geowarp_warp::ResampleAlg;
///
/// let size = RasterSize { width: 2, height: 2 };
/// let src = SourceChunk::new(
///     RasterBuffer::from_vec(WorkingType::Byte, size, 1, vec![1u8, 2, 3, 4]).unwrap(),
///     0,
///     0,
/// );
/// let mut dst = DestinationChunk::new(RasterBuffer::new(WorkingType::Byte, size, 1), 0, 0);
///
/// let mut kernel = WarpKernel::new(ResampleAlg::Nearest, &src, &mut dst, &IdentityTransformer);
/// kernel.perform_warp().unwrap();
/// assert_eq!(kernel.state(), KernelState::Completed);
/// assert_eq!(dst.buffer.as_slice::<u8>(), Some(&[1u8, 2, 3, 4][..]));
/// ```
pub struct WarpKernel<'a> {
    /// Resampling algorithm.
    pub resample_alg: ResampleAlg,
    /// Source chunk with its masks.
    pub src: &'a SourceChunk,
    /// Destination chunk with its masks.
    pub dst: &'a mut DestinationChunk,
    /// Destination to source transformer.
    pub transformer: &'a dyn Transformer,
    /// Progress reporting for this kernel run.
    pub progress: ScaledProgress,
    /// Always run the general case, even when a fast path applies.
    pub use_general_case: bool,
    state: KernelState,
}

impl<'a> WarpKernel<'a> {
    /// Create a kernel over the given chunks.
    pub fn new(
        resample_alg: ResampleAlg,
        src: &'a SourceChunk,
        dst: &'a mut DestinationChunk,
        transformer: &'a dyn Transformer,
    ) -> Self {
        Self {
            resample_alg,
            src,
            dst,
            transformer,
            progress: ScaledProgress::default(),
            use_general_case: false,
            state: KernelState::Created,
        }
    }

    /// Report progress through `progress`.
    pub fn with_progress(mut self, progress: ScaledProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> KernelState {
        self.state
    }

    /// Check that the chunks are structurally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`WarpError::Configuration`] describing the first inconsistency.
    pub fn validate(&mut self) -> Result<(), WarpError> {
        let bands = self.src.buffer.band_count();
        if bands == 0 {
            return Err(WarpError::Configuration("warp kernel has no bands".into()));
        }
        if self.dst.buffer.band_count() != bands {
            return Err(WarpError::Configuration(format!(
                "source has {bands} bands but destination has {}",
                self.dst.buffer.band_count()
            )));
        }
        if self.src.buffer.working_type() != self.dst.buffer.working_type() {
            return Err(WarpError::Configuration(format!(
                "source working type {:?} differs from destination working type {:?}",
                self.src.buffer.working_type(),
                self.dst.buffer.working_type()
            )));
        }

        let src_pixels = self.src.buffer.pixel_count();
        let dst_pixels = self.dst.buffer.pixel_count();
        if !self.src.band_valid.is_empty() && self.src.band_valid.len() != bands {
            return Err(WarpError::Configuration(format!(
                "{} band validity masks for {bands} bands",
                self.src.band_valid.len()
            )));
        }
        let band_masks_fit = self
            .src
            .band_valid
            .iter()
            .flatten()
            .all(|m| m.len() == src_pixels);
        let src_masks_fit = band_masks_fit
            && self.src.unified_valid.as_ref().map_or(true, |m| m.len() == src_pixels)
            && self.src.unified_density.as_ref().map_or(true, |m| m.len() == src_pixels);
        if !src_masks_fit {
            return Err(WarpError::Configuration(
                "source mask size does not match the source chunk".into(),
            ));
        }
        let dst_masks_fit = self.dst.valid.as_ref().map_or(true, |m| m.len() == dst_pixels)
            && self.dst.density.as_ref().map_or(true, |m| m.len() == dst_pixels);
        if !dst_masks_fit {
            return Err(WarpError::Configuration(
                "destination mask size does not match the destination chunk".into(),
            ));
        }
        if let Some(nodata) = &self.dst.nodata {
            if nodata.len() != bands {
                return Err(WarpError::Configuration(format!(
                    "{} destination nodata values for {bands} bands",
                    nodata.len()
                )));
            }
        }
        if !self.progress.base().is_finite() || !self.progress.scale().is_finite() {
            return Err(WarpError::Configuration("progress range is not finite".into()));
        }

        self.state = KernelState::Validated;
        Ok(())
    }

    /// Warp the source chunk into the destination chunk.
    ///
    /// Validates first if needed. A kernel runs at most once.
    ///
    /// # Errors
    ///
    /// * [`WarpError::Configuration`] when validation fails or the kernel already ran.
    /// * [`WarpError::Transform`] when a scanline batch cannot be transformed.
    /// * [`WarpError::UserCancelled`] when the progress callback returns `false`.
    pub fn perform_warp(&mut self) -> Result<(), WarpError> {
        match self.state {
            KernelState::Created => {
                if let Err(err) = self.validate() {
                    self.state = KernelState::Failed;
                    return Err(err);
                }
            }
            KernelState::Validated => {}
            state => {
                return Err(WarpError::Configuration(format!(
                    "warp kernel cannot run in state {state:?}"
                )))
            }
        }

        self.state = KernelState::Running;
        let result = self.dispatch();
        self.state = match &result {
            Ok(()) => KernelState::Completed,
            Err(WarpError::UserCancelled) => KernelState::Cancelled,
            Err(_) => KernelState::Failed,
        };
        result
    }

    fn dispatch(&mut self) -> Result<(), WarpError> {
        if self.dst.buffer.pixel_count() == 0 || self.src.buffer.pixel_count() == 0 {
            debug!(
                "warp kernel: nothing to do for src {} dst {}",
                self.src.window(),
                self.dst.window()
            );
            return report(&self.progress, 1.0);
        }

        let no_masks = !self.src.has_masks()
            && self.dst.valid.is_none()
            && self.dst.density.is_none()
            && self.dst.nodata.is_none();
        if !self.use_general_case && self.resample_alg == ResampleAlg::Nearest && no_masks {
            match self.src.buffer.working_type() {
                WorkingType::Byte => return self.nearest_no_masks::<u8>(),
                WorkingType::Int16 => return self.nearest_no_masks::<i16>(),
                WorkingType::UInt16 => return self.nearest_no_masks::<u16>(),
                WorkingType::Int32 => return self.nearest_no_masks::<i32>(),
                WorkingType::UInt32 => return self.nearest_no_masks::<u32>(),
                WorkingType::Float32 => return self.nearest_no_masks::<f32>(),
                WorkingType::Float64 => return self.nearest_no_masks::<f64>(),
                _ => {}
            }
        }
        self.general_case()
    }

    /// Source window grown by the resampling radius: `(min_x, max_x, min_y, max_y)`.
    fn source_bounds(&self) -> (f64, f64, f64, f64) {
        let margin = self.resample_alg.radius() as f64;
        let (x_off, y_off) = (self.src.x_off as f64, self.src.y_off as f64);
        (
            x_off - margin,
            x_off + self.src.width() as f64 + margin,
            y_off - margin,
            y_off + self.src.height() as f64 + margin,
        )
    }

    /// Nearest neighbour for real working types without any mask.
    ///
    /// Copies samples between the typed slices; equivalent to the general case
    /// for this configuration.
    fn nearest_no_masks<T: Sample>(&mut self) -> Result<(), WarpError> {
        debug!(
            "warp kernel: nearest no-mask path, src {} dst {}",
            self.src.window(),
            self.dst.window()
        );
        let (min_x, max_x, min_y, max_y) = self.source_bounds();
        let (src_w, src_h) = (self.src.width(), self.src.height());
        let src_pixels = self.src.buffer.pixel_count();
        let (dst_w, dst_h) = (self.dst.width(), self.dst.height());
        let (dst_x_off, dst_y_off) = (self.dst.x_off, self.dst.y_off);
        let dst_pixels = self.dst.buffer.pixel_count();
        let bands = self.src.buffer.band_count();
        let src_origin = (self.src.x_off, self.src.y_off);

        let src_data = self.src.buffer.as_slice::<T>().ok_or_else(|| {
            WarpError::Configuration("source buffer does not hold the working type".into())
        })?;
        let dst_data = self.dst.buffer.as_slice_mut::<T>().ok_or_else(|| {
            WarpError::Configuration("destination buffer does not hold the working type".into())
        })?;

        let mut scanline = Scanline::new(dst_w);
        report(&self.progress, 0.0)?;
        for row in 0..dst_h {
            scanline.transform(self.transformer, dst_x_off, dst_y_off, row)?;
            for col in 0..dst_w {
                if !scanline.success[col] {
                    continue;
                }
                let (x, y) = (scanline.x[col], scanline.y[col]);
                if !(x >= min_x && x < max_x && y >= min_y && y < max_y) {
                    continue;
                }
                let Some(src_offset) = source_offset(src_origin, src_w, src_h, x, y) else {
                    continue;
                };
                let dst_offset = row * dst_w + col;
                for band in 0..bands {
                    dst_data[band * dst_pixels + dst_offset] =
                        src_data[band * src_pixels + src_offset];
                }
            }
            report(&self.progress, (row + 1) as f64 / dst_h as f64)?;
        }
        Ok(())
    }

    /// Reference path handling every working type, algorithm and mask combination.
    fn general_case(&mut self) -> Result<(), WarpError> {
        debug!(
            "warp kernel: general case ({:?}), src {} dst {}",
            self.resample_alg,
            self.src.window(),
            self.dst.window()
        );
        let (min_x, max_x, min_y, max_y) = self.source_bounds();
        let src = self.src;
        let (src_w, src_h) = (src.width(), src.height());
        let src_origin = (src.x_off, src.y_off);
        let (dst_w, dst_h) = (self.dst.width(), self.dst.height());
        let (dst_x_off, dst_y_off) = (self.dst.x_off, self.dst.y_off);
        let bands = src.buffer.band_count();

        let mut scanline = Scanline::new(dst_w);
        report(&self.progress, 0.0)?;
        for row in 0..dst_h {
            scanline.transform(self.transformer, dst_x_off, dst_y_off, row)?;
            for col in 0..dst_w {
                if !scanline.success[col] {
                    continue;
                }
                let (x, y) = (scanline.x[col], scanline.y[col]);
                if !(x >= min_x && x < max_x && y >= min_y && y < max_y) {
                    continue;
                }
                let dst_offset = row * dst_w + col;
                if self.dst.is_valid(dst_offset) {
                    continue;
                }

                // cheap rejection on the pixel under the point
                let src_offset = source_offset(src_origin, src_w, src_h, x, y);
                let mut density = 1.0;
                if let Some(offset) = src_offset {
                    if let Some(unified) = &src.unified_density {
                        density = unified.get(offset) as f64;
                        if density < MIN_SOURCE_DENSITY {
                            continue;
                        }
                    }
                    if let Some(valid) = &src.unified_valid {
                        if !valid.is_valid(offset) {
                            continue;
                        }
                    }
                }

                let (local_x, local_y) = (x - src.x_off as f64, y - src.y_off as f64);
                let mut has_density = false;
                for band in 0..bands {
                    let value = match self.resample_alg {
                        ResampleAlg::Nearest => src_offset.and_then(|o| src.read(band, o)),
                        alg => resample(src, alg, band, local_x, local_y),
                    };
                    let Some(value) = value else {
                        continue;
                    };
                    if value.density < MIN_BAND_DENSITY {
                        continue;
                    }
                    has_density = true;
                    self.dst
                        .write(band, dst_offset, value.density, value.real, value.imag);
                }
                if !has_density {
                    continue;
                }

                self.dst.overlay_density(dst_offset, density);
                self.dst.mark_valid(dst_offset);
            }
            report(&self.progress, (row + 1) as f64 / dst_h as f64)?;
        }
        Ok(())
    }
}

/// Offset of the source pixel under `(x, y)` by truncation, if inside the chunk.
#[inline]
fn source_offset(origin: (usize, usize), width: usize, height: usize, x: f64, y: f64) -> Option<usize> {
    // truncation, not floor: the (-1, 0) margin band before the first raster row or column
    // pre-filters against that row or column
    let ix = (x + 1e-10) as i64 - origin.0 as i64;
    let iy = (y + 1e-10) as i64 - origin.1 as i64;
    if ix < 0 || iy < 0 || ix >= width as i64 || iy >= height as i64 {
        return None;
    }
    Some(iy as usize * width + ix as usize)
}

fn report(progress: &ScaledProgress, fraction: f64) -> Result<(), WarpError> {
    if progress.report(fraction) {
        Ok(())
    } else {
        Err(WarpError::UserCancelled)
    }
}

/// Coordinate buffers for one destination scanline.
struct Scanline {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    success: Vec<bool>,
}

impl Scanline {
    fn new(width: usize) -> Self {
        Self {
            x: vec![0.0; width],
            y: vec![0.0; width],
            z: vec![0.0; width],
            success: vec![false; width],
        }
    }

    /// Fill with the pixel centers of destination `row` and map them to source space.
    fn transform(
        &mut self,
        transformer: &dyn Transformer,
        x_off: usize,
        y_off: usize,
        row: usize,
    ) -> Result<(), WarpError> {
        let y = row as f64 + 0.5 + y_off as f64;
        for (i, x) in self.x.iter_mut().enumerate() {
            *x = i as f64 + 0.5 + x_off as f64;
        }
        self.y.fill(y);
        self.z.fill(0.0);
        self.success.fill(false);
        transformer.transform(
            TransformDirection::DstToSrc,
            &mut self.x,
            &mut self.y,
            &mut self.z,
            &mut self.success,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use geowarp_raster::{DensityMask, RasterBuffer, RasterError, RasterSize, ValidityMask, WorkingType};
    use rand::Rng;

    use super::{source_offset, KernelState, WarpKernel};
    use crate::accessor::{DestinationChunk, SourceChunk};
    use crate::error::{TransformError, WarpError};
    use crate::interpolation::ResampleAlg;
    use crate::progress::{ProgressFn, ScaledProgress};
    use crate::transformer::{AffineTransformer, FnTransformer, IdentityTransformer, TransformDirection};

    fn byte_chunk(values: Vec<u8>, width: usize) -> Result<RasterBuffer, RasterError> {
        let height = values.len() / width;
        RasterBuffer::from_vec(WorkingType::Byte, RasterSize { width, height }, 1, values)
    }

    #[test]
    fn validate_rejects_band_mismatch() -> Result<(), RasterError> {
        let size = RasterSize { width: 2, height: 2 };
        let src = SourceChunk::new(RasterBuffer::new(WorkingType::Byte, size, 2), 0, 0);
        let mut dst = DestinationChunk::new(RasterBuffer::new(WorkingType::Byte, size, 1), 0, 0);
        let mut kernel = WarpKernel::new(ResampleAlg::Nearest, &src, &mut dst, &IdentityTransformer);
        assert!(matches!(kernel.validate(), Err(WarpError::Configuration(_))));
        assert_eq!(kernel.state(), KernelState::Created);
        assert!(matches!(kernel.perform_warp(), Err(WarpError::Configuration(_))));
        assert_eq!(kernel.state(), KernelState::Failed);
        Ok(())
    }

    #[test]
    fn validate_rejects_mask_size() -> Result<(), RasterError> {
        let size = RasterSize { width: 2, height: 2 };
        let mut src = SourceChunk::new(RasterBuffer::new(WorkingType::Float32, size, 1), 0, 0);
        src.unified_density = Some(DensityMask::filled(3, 1.0));
        let mut dst = DestinationChunk::new(RasterBuffer::new(WorkingType::Float32, size, 1), 0, 0);
        let mut kernel = WarpKernel::new(ResampleAlg::Bilinear, &src, &mut dst, &IdentityTransformer);
        assert!(matches!(kernel.validate(), Err(WarpError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn runs_once() -> Result<(), Box<dyn std::error::Error>> {
        let src = SourceChunk::new(byte_chunk(vec![1, 2, 3, 4], 2)?, 0, 0);
        let mut dst = DestinationChunk::new(byte_chunk(vec![0; 4], 2)?, 0, 0);
        let mut kernel = WarpKernel::new(ResampleAlg::Bilinear, &src, &mut dst, &IdentityTransformer);
        kernel.validate()?;
        assert_eq!(kernel.state(), KernelState::Validated);
        kernel.perform_warp()?;
        assert_eq!(kernel.state(), KernelState::Completed);
        assert!(matches!(kernel.perform_warp(), Err(WarpError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn fast_path_matches_general_case() -> Result<(), Box<dyn std::error::Error>> {
        let mut rng = rand::rng();
        let values: Vec<i16> = (0..12 * 9 * 2).map(|_| rng.random_range(-500..500)).collect();
        let src = SourceChunk::new(
            RasterBuffer::from_vec(WorkingType::Int16, RasterSize { width: 12, height: 9 }, 2, values)?,
            3,
            1,
        );
        let transformer = AffineTransformer::rotation((5.0, 5.0), (9.0, 5.5), 30.0, 0.9)?;

        let run = |general: bool| -> Result<RasterBuffer, WarpError> {
            let buffer = RasterBuffer::new(WorkingType::Int16, RasterSize { width: 10, height: 10 }, 2);
            let mut dst = DestinationChunk::new(buffer, 0, 0);
            let mut kernel = WarpKernel::new(ResampleAlg::Nearest, &src, &mut dst, &transformer);
            kernel.use_general_case = general;
            kernel.perform_warp()?;
            Ok(dst.buffer)
        };
        let fast = run(false)?;
        assert_eq!(fast, run(true)?);
        assert!(fast.band::<i16>(1).is_some_and(|b| b.iter().any(|&v| v != 0)));
        Ok(())
    }

    #[test]
    fn skips_written_and_failed_pixels() -> Result<(), Box<dyn std::error::Error>> {
        let src = SourceChunk::new(byte_chunk(vec![9; 4], 2)?, 0, 0);
        let mut dst = DestinationChunk::new(byte_chunk(vec![0; 4], 2)?, 0, 0);
        let mut valid = ValidityMask::all_invalid(4);
        valid.set_valid(0);
        dst.valid = Some(valid);
        // fail every point of the second column
        let transformer = FnTransformer::new(
            |_dir: TransformDirection, x: &mut [f64], _y: &mut [f64], _z: &mut [f64], ok: &mut [bool]| {
                for (x, ok) in x.iter().zip(ok.iter_mut()) {
                    *ok = *x < 1.0;
                }
                Ok(())
            },
        );
        WarpKernel::new(ResampleAlg::Nearest, &src, &mut dst, &transformer).perform_warp()?;
        assert_eq!(dst.buffer.as_slice::<u8>(), Some(&[0u8, 0, 9, 0][..]));
        assert_eq!(dst.valid.as_ref().map(|v| v.count_valid()), Some(2));
        Ok(())
    }

    #[test]
    fn source_density_controls_blending() -> Result<(), Box<dyn std::error::Error>> {
        let mut src = SourceChunk::new(
            RasterBuffer::from_vec(WorkingType::Float32, RasterSize { width: 2, height: 1 }, 1, vec![10.0f32, 10.0])?,
            0,
            0,
        );
        src.unified_density = Some(DensityMask::from_vec(vec![0.5, 0.000001]));
        let dst_buffer =
            RasterBuffer::from_vec(WorkingType::Float32, RasterSize { width: 2, height: 1 }, 1, vec![2.0f32, 2.0])?;
        let mut dst = DestinationChunk::new(dst_buffer, 0, 0);
        dst.density = Some(DensityMask::filled(2, 1.0));
        WarpKernel::new(ResampleAlg::Nearest, &src, &mut dst, &IdentityTransformer).perform_warp()?;
        // second pixel is below the source density threshold
        assert_eq!(dst.buffer.as_slice::<f32>(), Some(&[6.0f32, 2.0][..]));
        Ok(())
    }

    #[test]
    fn transform_failure_aborts() -> Result<(), RasterError> {
        let src = SourceChunk::new(byte_chunk(vec![1; 4], 2)?, 0, 0);
        let mut dst = DestinationChunk::new(byte_chunk(vec![0; 4], 2)?, 0, 0);
        let transformer = FnTransformer::new(
            |_dir: TransformDirection, _x: &mut [f64], _y: &mut [f64], _z: &mut [f64], _ok: &mut [bool]| {
                Err(TransformError::Failed("no projection".into()))
            },
        );
        let mut kernel = WarpKernel::new(ResampleAlg::Bilinear, &src, &mut dst, &transformer);
        assert!(matches!(kernel.perform_warp(), Err(WarpError::Transform(_))));
        assert_eq!(kernel.state(), KernelState::Failed);
        Ok(())
    }

    #[test]
    fn cancellation_after_first_scanline() -> Result<(), RasterError> {
        let src = SourceChunk::new(byte_chunk(vec![7; 16], 4)?, 0, 0);
        let mut dst = DestinationChunk::new(byte_chunk(vec![0; 16], 4)?, 0, 0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        // the first call reports the start, the second the end of scanline 0
        let callback: Arc<ProgressFn> =
            Arc::new(move |_f: f64, _: &str| counter.fetch_add(1, Ordering::SeqCst) < 1);
        let mut kernel = WarpKernel::new(ResampleAlg::Bilinear, &src, &mut dst, &IdentityTransformer)
            .with_progress(ScaledProgress::full(Some(callback)));
        assert_eq!(kernel.perform_warp(), Err(WarpError::UserCancelled));
        assert_eq!(kernel.state(), KernelState::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            dst.buffer.as_slice::<u8>(),
            Some(&[7u8, 7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0][..])
        );
        Ok(())
    }

    #[test]
    fn margin_band_offsets_map_to_first_pixel() {
        // chunk at (2, 3) of size 4x2
        assert_eq!(source_offset((2, 3), 4, 2, 1.5, 3.5), None);
        assert_eq!(source_offset((2, 3), 4, 2, 2.5, 3.5), Some(0));
        assert_eq!(source_offset((2, 3), 4, 2, 5.9, 4.9), Some(7));
        assert_eq!(source_offset((2, 3), 4, 2, 6.0, 3.5), None);
        // chunk at the raster origin: (-1, 0) truncates onto column and row 0
        assert_eq!(source_offset((0, 0), 4, 2, -0.5, -0.99), Some(0));
        assert_eq!(source_offset((0, 0), 4, 2, -1.5, 0.5), None);
    }
}
