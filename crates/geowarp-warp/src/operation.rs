//! High level warping: planning memory-bounded chunks and warping them
//! between a source and a destination raster.
//!
//! A [`WarpOperation`] turns a destination window into a list of chunks whose
//! source and destination buffers fit the memory budget. Each chunk reads its
//! source window, builds its masks, runs a [`WarpKernel`] and writes its
//! destination window back. Chunks never overlap in the destination and may
//! run concurrently.

use std::sync::Arc;

use geowarp_raster::{
    DensityMask, RasterBuffer, RasterSize, ValidityMask, Window, WorkingType,
};
use log::{debug, warn};

use crate::accessor::{DestinationChunk, SourceChunk};
use crate::chunk::{ChunkDescriptor, SourceWindow};
use crate::error::{TransformError, WarpError};
use crate::kernel::WarpKernel;
use crate::masks::{AlphaMasker, MaskBuffer, MaskContext, MaskCoverage, MaskGenerator, NoDataMasker};
use crate::options::{InitDest, WarpOptions};
use crate::parallel::{try_for_each_indexed, ExecutionStrategy};
use crate::progress::{ChunkProgress, ScaledProgress};
use crate::raster_io::RasterWriter;
use crate::transformer::TransformDirection;

/// Fewest probe points that must transform to derive a source window.
const MIN_PROBE_SUCCESSES: usize = 5;

/// Source margin added when some probe points failed, unless overridden.
const FAILED_PROBE_EXTRA: f64 = 10.0;

/// A validated warp between two rasters.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use geowarp_raster::{RasterBuffer, RasterSize, Window, WorkingType};
/// use geowarp_warp::raster_io::{MemRaster, RasterWriter};
/// use geowarp_warp::transformer::AffineTransformer;
/// use geowarp_warp::{ResampleAlg, WarpOperation, WarpOptions};
///
/// let src = RasterBuffer::from_vec(
///     WorkingType::Byte,
///     RasterSize { width: 4, height: 4 },
///     1,
///     (1..=16).map(|v| v as u8 * 10).collect::<Vec<_>>(),
/// )
/// .unwrap();
/// let dst = Arc::new(MemRaster::zeros(WorkingType::Byte, RasterSize { width: 2, height: 2 }, 1));
///
/// // every destination pixel covers a 2x2 block of source pixels
/// let transformer = AffineTransformer::from_dst_to_src([0.0, 2.0, 0.0, 0.0, 0.0, 2.0]).unwrap();
/// let mut options = WarpOptions::new(
///     Arc::new(MemRaster::new(src)),
///     Some(dst.clone() as Arc<dyn RasterWriter>),
///     Arc::new(transformer),
/// );
/// options.resample_alg = ResampleAlg::Bilinear;
///
/// let operation = WarpOperation::new(options).unwrap();
/// operation.chunk_and_warp_image(Window::new(0, 0, 2, 2)).unwrap();
///
/// let out = dst.snapshot().unwrap();
/// assert_eq!(out.as_slice::<u8>(), Some(&[35u8, 55, 115, 135][..]));
/// ```
pub struct WarpOperation {
    options: WarpOptions,
    working_type: WorkingType,
}

impl WarpOperation {
    /// Validate `options` and resolve the working type.
    ///
    /// # Errors
    ///
    /// Returns [`WarpError::Configuration`] for inconsistent options.
    pub fn new(options: WarpOptions) -> Result<Self, WarpError> {
        options.validate()?;
        let working_type = options.resolve_working_type()?;
        debug!(
            "warp operation: {} bands, {:?}, working type {:?}, memory limit {} bytes",
            options.band_count(),
            options.resample_alg,
            working_type,
            options.memory_limit_bytes()
        );
        Ok(Self {
            options,
            working_type,
        })
    }

    /// The options of this operation.
    pub fn options(&self) -> &WarpOptions {
        &self.options
    }

    /// The working type chunks are processed in.
    pub fn working_type(&self) -> WorkingType {
        self.working_type
    }

    /// Warp `dst_window` of the destination raster, one chunk after another.
    ///
    /// # Errors
    ///
    /// Stops at the first failing chunk. Chunks already written stay written.
    pub fn chunk_and_warp_image(&self, dst_window: Window) -> Result<(), WarpError> {
        self.run_chunks(dst_window, ExecutionStrategy::Serial)
    }

    /// Warp `dst_window` of the destination raster with the configured
    /// [`WarpOptions::execution`] strategy.
    ///
    /// # Errors
    ///
    /// Returns one of the chunk failures; chunks not yet started are skipped.
    pub fn chunk_and_warp_multi(&self, dst_window: Window) -> Result<(), WarpError> {
        self.run_chunks(dst_window, self.options.execution)
    }

    fn run_chunks(&self, dst_window: Window, strategy: ExecutionStrategy) -> Result<(), WarpError> {
        let dst = self.destination()?;
        if !dst_window.fits(dst.size()) {
            return Err(WarpError::Configuration(format!(
                "destination window {dst_window} exceeds the destination raster {}",
                dst.size()
            )));
        }

        let chunks = self.collect_chunk_list(dst_window)?;
        debug!("warping {dst_window} in {} chunks with {strategy:?}", chunks.len());
        debug_assert!(
            chunks.iter().enumerate().all(|(i, a)| chunks[i + 1..]
                .iter()
                .all(|b| !a.dst.overlaps(&b.dst))),
            "chunk destination windows overlap"
        );

        let total: usize = chunks.iter().map(|c| c.dst.pixel_count()).sum();
        let weights = chunks
            .iter()
            .map(|c| match total {
                0 => 0.0,
                total => c.dst.pixel_count() as f64 / total as f64,
            })
            .collect();
        let progress = Arc::new(ChunkProgress::new(self.options.progress.clone(), weights));

        try_for_each_indexed(strategy, &chunks, |i, chunk| {
            if progress.is_cancelled() {
                return Err(WarpError::UserCancelled);
            }
            let chunk_progress = ScaledProgress::full(Some(progress.chunk_callback(i)));
            self.warp_region(chunk.dst, Some(chunk.src), chunk_progress)
        })?;

        if progress.finish() {
            Ok(())
        } else {
            Err(WarpError::UserCancelled)
        }
    }

    /// Split `dst_window` into chunks fitting the memory budget.
    ///
    /// Chunks are sorted top to bottom, then left to right. Regions whose
    /// source window cannot be computed because too few probe points
    /// transform are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Fails when even a single destination pixel exceeds the memory budget,
    /// or when the transformer fails.
    pub fn collect_chunk_list(&self, dst_window: Window) -> Result<Vec<ChunkDescriptor>, WarpError> {
        let mut chunks = Vec::new();
        self.collect_chunks(dst_window, &mut chunks)?;
        chunks.sort_by_key(|c| (c.dst.y_off, c.dst.x_off));
        Ok(chunks)
    }

    fn collect_chunks(&self, dst: Window, chunks: &mut Vec<ChunkDescriptor>) -> Result<(), WarpError> {
        if dst.is_empty() {
            return Ok(());
        }
        let src = match self.compute_source_window(dst) {
            Ok(src) => src,
            Err(WarpError::Transform(err @ TransformError::TooFewPoints { .. })) => {
                warn!("unable to compute source region for destination window {dst}, skipping: {err}");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if src.is_empty() && self.options.skip_no_source {
            return Ok(());
        }

        let memory_bytes = self.estimate_memory(dst, src.window);
        let over_budget = memory_bytes > self.options.memory_limit_bytes();
        let sparse_source = self.options.src_fill_ratio_heuristics
            && src.fill_ratio > 0.0
            && src.fill_ratio < 0.5
            && (dst.width > 100 || dst.height > 100);

        if over_budget && dst.pixel_count() == 1 {
            return Err(WarpError::Configuration(format!(
                "a single destination pixel needs {memory_bytes} bytes, over the memory limit of {}",
                self.options.memory_limit_bytes()
            )));
        }
        if over_budget || sparse_source {
            let (first, second) = if dst.width > dst.height {
                let half = dst.width / 2;
                (
                    Window::new(dst.x_off, dst.y_off, half, dst.height),
                    Window::new(dst.x_off + half, dst.y_off, dst.width - half, dst.height),
                )
            } else {
                let half = dst.height / 2;
                (
                    Window::new(dst.x_off, dst.y_off, dst.width, half),
                    Window::new(dst.x_off, dst.y_off + half, dst.width, dst.height - half),
                )
            };
            self.collect_chunks(first, chunks)?;
            return self.collect_chunks(second, chunks);
        }

        debug!(
            "chunk dst {dst} src {} fill ratio {:.3}, {memory_bytes} bytes",
            src.window, src.fill_ratio
        );
        chunks.push(ChunkDescriptor {
            dst,
            src,
            memory_bytes,
        });
        Ok(())
    }

    /// Bytes of buffers and masks needed to warp `dst` from `src`.
    fn estimate_memory(&self, dst: Window, src: Window) -> usize {
        let opts = &self.options;
        let bands = opts.band_count();
        let sample_bits = self.working_type.size_bits() * bands;

        let mut src_bits = sample_bits;
        if opts.src_alpha_band.is_some() || opts.cutline.is_some() {
            src_bits += 32;
        }
        if opts.src_nodata.is_some() {
            src_bits += bands;
        }

        let mut dst_bits = sample_bits;
        if opts.dst_nodata.is_some() {
            dst_bits += bands;
        }
        if opts.dst_alpha_band.is_some() {
            dst_bits += 32;
        }

        (src_bits * src.pixel_count() + dst_bits * dst.pixel_count()).div_ceil(8)
    }

    /// Compute the source window needed to warp `dst_window`.
    ///
    /// Points along the edges of the destination window are transformed to
    /// source space (a full grid when any of them fails or when
    /// [`WarpOptions::sample_grid`] is set). Their bounding box, grown by the
    /// resampling margin, is clipped to the source raster.
    ///
    /// # Errors
    ///
    /// Fails with [`TransformError::TooFewPoints`] when fewer than five probe
    /// points transform, or with the transformer's own error.
    pub fn compute_source_window(&self, dst_window: Window) -> Result<SourceWindow, WarpError> {
        let opts = &self.options;
        let steps = opts.sample_steps.max(2);
        let mut use_grid = opts.sample_grid;

        let (bounds, failed, total) = loop {
            let (mut x, mut y) = probe_points(dst_window, steps, use_grid);
            let total = x.len();
            let mut z = vec![0.0; total];
            let mut success = vec![false; total];
            opts.transformer.transform(
                TransformDirection::DstToSrc,
                &mut x,
                &mut y,
                &mut z,
                &mut success,
            )?;

            let mut bounds: Option<[f64; 4]> = None;
            let mut failed = 0;
            for ((&x, &y), &ok) in x.iter().zip(&y).zip(&success) {
                if !ok || !x.is_finite() || !y.is_finite() {
                    failed += 1;
                    continue;
                }
                bounds = Some(match bounds {
                    None => [x, y, x, y],
                    Some([min_x, min_y, max_x, max_y]) => {
                        [min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y)]
                    }
                });
            }
            if failed > 0 && !use_grid {
                use_grid = true;
                continue;
            }
            break (bounds, failed, total);
        };

        let succeeded = total - failed;
        let bounds = match bounds {
            Some(bounds) if succeeded >= MIN_PROBE_SUCCESSES => bounds,
            _ => return Err(TransformError::TooFewPoints { succeeded, total }.into()),
        };
        if failed > 0 {
            debug!("{failed} of {total} probe points failed to transform for {dst_window}");
        }
        let [min_x, min_y, max_x, max_y] = bounds.map(round_if_close);

        let radius = opts.resample_alg.radius() as f64;
        let extra = match opts.source_extra {
            Some(extra) => extra as f64,
            None if failed > 0 => FAILED_PROBE_EXTRA,
            None => 0.0,
        };
        let x_radius = scaled_radius(radius, dst_window.width, max_x - min_x) + extra;
        let y_radius = scaled_radius(radius, dst_window.height, max_y - min_y) + extra;

        let raster = opts.src.size();
        let (raster_w, raster_h) = (raster.width as f64, raster.height as f64);
        if min_x > raster_w + x_radius
            || max_x < -x_radius
            || min_y > raster_h + y_radius
            || max_y < -y_radius
        {
            return Ok(SourceWindow::default());
        }

        let (x_off, width, extra_width) = clip_axis(min_x, max_x, x_radius, raster_w);
        let (y_off, height, extra_height) = clip_axis(min_y, max_y, y_radius, raster_h);
        let window = Window::new(x_off, y_off, width, height);
        let fill_ratio = window.pixel_count() as f64
            / ((max_x - min_x + 2.0 * x_radius) * (max_y - min_y + 2.0 * y_radius)).max(1.0);

        Ok(SourceWindow {
            window,
            extra_width,
            extra_height,
            fill_ratio,
        })
    }

    /// Warp one chunk: read, mask, warp and write `dst_window`.
    ///
    /// The source window is computed when `src` is `None`. Progress of this
    /// chunk alone is reported through `progress`.
    ///
    /// # Errors
    ///
    /// Any read, write, transform or kernel failure, or cancellation.
    pub fn warp_region(
        &self,
        dst_window: Window,
        src: Option<SourceWindow>,
        progress: ScaledProgress,
    ) -> Result<(), WarpError> {
        let opts = &self.options;
        let dst = self.destination()?;

        let mut buffer = match opts.init_dest {
            Some(_) => self.create_destination_buffer(dst_window.size())?,
            None => dst.read_window(&opts.dst_bands, dst_window, self.working_type)?,
        };

        let alpha = opts
            .dst_alpha_band
            .map(|band| AlphaMasker::new(Arc::clone(dst), band, opts.dst_alpha_max));
        let dst_density = match &alpha {
            Some(_) if opts.init_dest.is_some() => {
                Some(DensityMask::filled(dst_window.pixel_count(), 0.0))
            }
            Some(masker) => {
                let mut density = DensityMask::filled(dst_window.pixel_count(), 0.0);
                let context = MaskContext {
                    window: dst_window,
                    data: &buffer,
                    band: None,
                    blend_distance: 0.0,
                };
                masker.generate(&context, MaskBuffer::Density(&mut density))?;
                Some(density)
            }
            None => None,
        };

        let dst_density = self.warp_into(dst_window, &mut buffer, src, dst_density, progress)?;

        if let (Some(masker), Some(density)) = (&alpha, &dst_density) {
            masker.store(dst_window, density)?;
        }
        dst.write_window(&opts.dst_bands, dst_window, &buffer)?;
        Ok(())
    }

    /// Warp into a caller provided destination buffer of `dst_window`'s size,
    /// without reading or writing the destination raster.
    ///
    /// The buffer must hold every warped band in the working type. The source
    /// window is computed when `src` is `None`.
    ///
    /// # Errors
    ///
    /// Any read, transform or kernel failure, or cancellation. The buffer holds
    /// whatever was written before the failure.
    pub fn warp_region_to_buffer(
        &self,
        dst_window: Window,
        buffer: &mut RasterBuffer,
        src: Option<SourceWindow>,
        progress: ScaledProgress,
    ) -> Result<(), WarpError> {
        self.warp_into(dst_window, buffer, src, None, progress)?;
        Ok(())
    }

    /// Allocate a destination buffer of `size` initialized per [`WarpOptions::init_dest`].
    ///
    /// # Errors
    ///
    /// Fails when an initialization value does not match a band.
    pub fn create_destination_buffer(&self, size: RasterSize) -> Result<RasterBuffer, WarpError> {
        let opts = &self.options;
        let mut buffer = RasterBuffer::new(self.working_type, size, opts.band_count());
        let values = match &opts.init_dest {
            Some(InitDest::NoData) => opts.dst_nodata.as_deref(),
            Some(InitDest::Values(values)) => Some(values.as_slice()),
            None => None,
        };
        for (band, value) in values.unwrap_or_default().iter().enumerate() {
            buffer.fill_band(band, value.real, value.imag)?;
        }
        Ok(buffer)
    }

    fn destination(&self) -> Result<&Arc<dyn RasterWriter>, WarpError> {
        self.options
            .dst
            .as_ref()
            .ok_or_else(|| WarpError::Configuration("no destination raster".into()))
    }

    fn warp_into(
        &self,
        dst_window: Window,
        buffer: &mut RasterBuffer,
        src: Option<SourceWindow>,
        dst_density: Option<DensityMask>,
        progress: ScaledProgress,
    ) -> Result<Option<DensityMask>, WarpError> {
        if buffer.working_type() != self.working_type
            || buffer.band_count() != self.options.band_count()
            || buffer.size() != dst_window.size()
        {
            return Err(WarpError::Configuration(format!(
                "destination buffer ({:?}, {} bands, {}) does not match {:?}, {} bands, {}",
                buffer.working_type(),
                buffer.band_count(),
                buffer.size(),
                self.working_type,
                self.options.band_count(),
                dst_window.size()
            )));
        }

        let src = match src {
            Some(src) => src,
            None => self.compute_source_window(dst_window)?,
        };
        let source = self.source_chunk(src.window)?;

        let placeholder = RasterBuffer::new(self.working_type, RasterSize::default(), 0);
        let mut dst = DestinationChunk::new(
            std::mem::replace(buffer, placeholder),
            dst_window.x_off,
            dst_window.y_off,
        );
        dst.density = dst_density;

        let result = self.run_kernel(&source, &mut dst, progress);
        *buffer = dst.buffer;
        result?;
        Ok(dst.density)
    }

    fn run_kernel(
        &self,
        source: &SourceChunk,
        dst: &mut DestinationChunk,
        progress: ScaledProgress,
    ) -> Result<(), WarpError> {
        if let Some(nodata) = &self.options.dst_nodata {
            let pixels = dst.buffer.pixel_count();
            let window = dst.window();
            let mut valid = ValidityMask::all_invalid(pixels);
            for (band, value) in nodata.iter().enumerate() {
                let mut band_valid = ValidityMask::all_valid(pixels);
                let context = MaskContext {
                    window,
                    data: &dst.buffer,
                    band: Some(band),
                    blend_distance: 0.0,
                };
                NoDataMasker::new(*value).generate(&context, MaskBuffer::Validity(&mut band_valid))?;
                valid.union_with(&band_valid);
            }
            dst.valid = Some(valid);
            dst.nodata = Some(nodata.iter().map(|n| n.real).collect());
        }

        let mut kernel = WarpKernel::new(
            self.options.resample_alg,
            source,
            dst,
            self.options.transformer.as_ref(),
        )
        .with_progress(progress);
        kernel.use_general_case = self.options.use_general_case;
        kernel.perform_warp()
    }

    /// Read `window` of the source and build its masks.
    fn source_chunk(&self, window: Window) -> Result<SourceChunk, WarpError> {
        let opts = &self.options;
        let data = opts.src.read_window(&opts.src_bands, window, self.working_type)?;
        let mut chunk = SourceChunk::new(data, window.x_off, window.y_off);
        let pixels = window.pixel_count();
        if pixels == 0 {
            return Ok(chunk);
        }

        if let Some(band) = opts.src_alpha_band {
            let masker = AlphaMasker::new(Arc::clone(&opts.src), band, opts.src_alpha_max);
            let mut density = DensityMask::filled(pixels, 1.0);
            let context = MaskContext {
                window,
                data: &chunk.buffer,
                band: None,
                blend_distance: 0.0,
            };
            match masker.generate(&context, MaskBuffer::Density(&mut density))? {
                MaskCoverage::AllValid => debug!("source alpha opaque over {window}, density dropped"),
                MaskCoverage::Partial => chunk.unified_density = Some(density),
            }
        }

        if let Some(cutline) = &opts.cutline {
            let had_density = chunk.unified_density.is_some();
            let mut density = chunk
                .unified_density
                .take()
                .unwrap_or_else(|| DensityMask::filled(pixels, 1.0));
            let context = MaskContext {
                window,
                data: &chunk.buffer,
                band: None,
                blend_distance: cutline.blend_distance,
            };
            let coverage = cutline
                .generator
                .generate(&context, MaskBuffer::Density(&mut density))?;
            if had_density || coverage == MaskCoverage::Partial {
                chunk.unified_density = Some(density);
            }
        }

        if let Some(nodata) = &opts.src_nodata {
            let mut masks = Vec::with_capacity(nodata.len());
            for (band, value) in nodata.iter().enumerate() {
                let mut mask = ValidityMask::all_valid(pixels);
                let context = MaskContext {
                    window,
                    data: &chunk.buffer,
                    band: Some(band),
                    blend_distance: 0.0,
                };
                let coverage =
                    NoDataMasker::new(*value).generate(&context, MaskBuffer::Validity(&mut mask))?;
                masks.push((coverage == MaskCoverage::Partial).then_some(mask));
            }

            if masks.iter().all(Option::is_none) {
                debug!("no source nodata over {window}, validity masks dropped");
            } else if opts.unified_src_nodata {
                // invalid only where every band holds nodata
                if masks.iter().all(Option::is_some) {
                    let mut unified = ValidityMask::all_invalid(pixels);
                    for mask in masks.iter().flatten() {
                        unified.union_with(mask);
                    }
                    chunk.unified_valid = Some(unified);
                }
            } else if masks.len() == 1 {
                chunk.unified_valid = masks.pop().flatten();
            } else {
                chunk.band_valid = masks;
            }
        }
        Ok(chunk)
    }
}

/// Probe points on the edges of `window`, or on a grid covering it.
fn probe_points(window: Window, steps: usize, grid: bool) -> (Vec<f64>, Vec<f64>) {
    let step = 1.0 / (steps - 1) as f64;
    let ratio = |i: usize| if i == steps - 1 { 1.0 } else { i as f64 * step };
    let (x_off, y_off) = (window.x_off as f64, window.y_off as f64);
    let (width, height) = (window.width as f64, window.height as f64);

    let mut x = Vec::new();
    let mut y = Vec::new();
    if grid {
        // the grid also covers the centers of the outermost pixels
        let grid_ratio = |i: usize, size: f64| match i {
            0 => 0.5 / size,
            i if i <= steps => ratio(i - 1),
            _ => 1.0 - 0.5 / size,
        };
        for iy in 0..steps + 2 {
            let ry = grid_ratio(iy, height);
            for ix in 0..steps + 2 {
                x.push(x_off + grid_ratio(ix, width) * width);
                y.push(y_off + ry * height);
            }
        }
    } else {
        for i in 0..steps {
            let r = ratio(i);
            for (px, py) in [
                (x_off + r * width, y_off),
                (x_off + r * width, y_off + height),
                (x_off, y_off + r * height),
                (x_off + width, y_off + r * height),
            ] {
                x.push(px);
                y.push(py);
            }
        }
    }
    (x, y)
}

fn round_if_close(value: f64) -> f64 {
    let rounded = value.round();
    if (rounded - value).abs() < 1e-6 {
        rounded
    } else {
        value
    }
}

/// Resampling radius grown for downsampling transforms.
fn scaled_radius(radius: f64, dst_size: usize, src_extent: f64) -> f64 {
    let scale = (dst_size as f64 / src_extent).max(1e-3);
    if scale < 1.0 {
        (radius / scale).ceil()
    } else {
        radius
    }
}

/// Clip `[min, max]` grown by `radius` to `[0, raster_size]`: `(offset, size, extra size)`.
fn clip_axis(min: f64, max: f64, radius: f64, raster_size: f64) -> (usize, usize, f64) {
    let (start, end) = if max.ceil().min(raster_size) - min.max(0.0).floor() > 0.9 * raster_size {
        // nearly the whole raster
        (0.0, raster_size)
    } else {
        let start = (min.floor() - radius).clamp(0.0, raster_size);
        let end = (max.ceil() + radius).clamp(start, raster_size);
        (start, end)
    };
    let size = end - start;
    let raw = (max.min(raster_size) - min.max(0.0)).max(0.0);
    (start as usize, size as usize, (size - raw).max(0.0))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use geowarp_raster::{RasterBuffer, RasterSize, Window, WorkingType};

    use super::{clip_axis, probe_points, WarpOperation};
    use crate::error::{TransformError, WarpError};
    use crate::interpolation::ResampleAlg;
    use crate::options::{InitDest, NoData, WarpOptions};
    use crate::progress::ScaledProgress;
    use crate::raster_io::{MemRaster, RasterWriter};
    use crate::transformer::{AffineTransformer, FnTransformer, IdentityTransformer, TransformDirection};

    fn options(size: RasterSize, transformer: Arc<dyn crate::transformer::Transformer>) -> WarpOptions {
        let dst: Arc<dyn RasterWriter> = Arc::new(MemRaster::zeros(WorkingType::Byte, size, 1));
        WarpOptions::new(
            Arc::new(MemRaster::zeros(WorkingType::Byte, size, 1)),
            Some(dst),
            transformer,
        )
    }

    #[test]
    fn probe_layouts() {
        let (x, y) = probe_points(Window::new(10, 20, 4, 2), 3, false);
        assert_eq!(x.len(), 12);
        assert_eq!((x[0], y[0]), (10.0, 20.0));
        assert_eq!((x[11], y[11]), (14.0, 22.0));

        let (x, y) = probe_points(Window::new(0, 0, 4, 4), 3, true);
        assert_eq!(x.len(), 25);
        assert_eq!((x[0], y[0]), (0.5, 0.5));
        assert_eq!((x[24], y[24]), (3.5, 3.5));
    }

    #[test]
    fn clipping() {
        // fully inside: margin kept on both sides
        assert_eq!(clip_axis(10.2, 20.7, 2.0, 100.0), (8, 15, 15.0 - (20.7 - 10.2)));
        // clipped at 0 and at the raster edge
        let (off, size, _) = clip_axis(-3.0, 50.0, 1.0, 60.0);
        assert_eq!((off, size), (0, 51));
        let (off, size, _) = clip_axis(55.5, 70.0, 1.0, 60.0);
        assert_eq!((off, size), (54, 6));
    }

    #[test]
    fn identity_source_window() -> Result<(), WarpError> {
        let size = RasterSize { width: 50, height: 40 };
        let mut opts = options(size, Arc::new(IdentityTransformer));
        opts.resample_alg = ResampleAlg::Bilinear;
        let op = WarpOperation::new(opts)?;
        let src = op.compute_source_window(Window::new(10, 5, 8, 4))?;
        assert_eq!(src.window, Window::new(9, 4, 10, 6));
        assert_eq!(src.extra_width, 2.0);

        let src = op.compute_source_window(Window::new(0, 0, 50, 40))?;
        assert_eq!(src.window, Window::new(0, 0, 50, 40));
        assert_eq!(src.fill_ratio, 2000.0 / (52.0 * 42.0));
        Ok(())
    }

    #[test]
    fn source_window_outside_raster_is_empty() -> Result<(), WarpError> {
        let size = RasterSize { width: 10, height: 10 };
        let shift = AffineTransformer::from_dst_to_src([100.0, 1.0, 0.0, 0.0, 0.0, 1.0])
            .map_err(WarpError::from)?;
        let op = WarpOperation::new(options(size, Arc::new(shift)))?;
        let src = op.compute_source_window(Window::new(0, 0, 10, 10))?;
        assert!(src.is_empty());
        Ok(())
    }

    #[test]
    fn too_few_points() -> Result<(), WarpError> {
        let size = RasterSize { width: 10, height: 10 };
        let failing = FnTransformer::new(
            |_dir: TransformDirection, _x: &mut [f64], _y: &mut [f64], _z: &mut [f64], ok: &mut [bool]| {
                ok.fill(false);
                Ok(())
            },
        );
        let op = WarpOperation::new(options(size, Arc::new(failing)))?;
        assert!(matches!(
            op.compute_source_window(Window::new(0, 0, 10, 10)),
            Err(WarpError::Transform(TransformError::TooFewPoints { succeeded: 0, .. }))
        ));
        // the region is skipped rather than failing the whole operation
        assert_eq!(op.collect_chunk_list(Window::new(0, 0, 10, 10))?, vec![]);
        Ok(())
    }

    #[test]
    fn chunks_split_and_sort() -> Result<(), WarpError> {
        let size = RasterSize { width: 64, height: 32 };
        let mut opts = options(size, Arc::new(IdentityTransformer));
        opts.memory_limit = 1200;
        let op = WarpOperation::new(opts)?;
        let chunks = op.collect_chunk_list(Window::full(size))?;
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.memory_bytes <= 1200));
        let covered: usize = chunks.iter().map(|c| c.dst.pixel_count()).sum();
        assert_eq!(covered, size.pixel_count());
        assert!(chunks
            .windows(2)
            .all(|w| (w[0].dst.y_off, w[0].dst.x_off) < (w[1].dst.y_off, w[1].dst.x_off)));
        Ok(())
    }

    #[test]
    fn budget_below_one_pixel() -> Result<(), WarpError> {
        let size = RasterSize { width: 4, height: 4 };
        let mut opts = options(size, Arc::new(IdentityTransformer));
        opts.memory_limit = 1;
        let op = WarpOperation::new(opts)?;
        assert!(matches!(
            op.collect_chunk_list(Window::full(size)),
            Err(WarpError::Configuration(_))
        ));
        Ok(())
    }

    #[test]
    fn destination_buffer_initialization() -> Result<(), WarpError> {
        let size = RasterSize { width: 2, height: 1 };
        let mut opts = options(size, Arc::new(IdentityTransformer));
        opts.dst_nodata = Some(vec![NoData::from(7.0)]);
        opts.init_dest = Some(InitDest::NoData);
        let op = WarpOperation::new(opts.clone())?;
        let buffer = op.create_destination_buffer(size)?;
        assert_eq!(buffer.as_slice::<u8>(), Some(&[7u8, 7][..]));

        opts.init_dest = Some(InitDest::Values(vec![NoData::from(3.0)]));
        let op = WarpOperation::new(opts)?;
        assert_eq!(op.create_destination_buffer(size)?.as_slice::<u8>(), Some(&[3u8, 3][..]));
        Ok(())
    }

    #[test]
    fn warp_region_to_buffer_restores_buffer() -> Result<(), Box<dyn std::error::Error>> {
        let size = RasterSize { width: 3, height: 1 };
        let src = RasterBuffer::from_vec(WorkingType::Byte, size, 1, vec![4u8, 5, 6])?;
        let mut opts = WarpOptions::new(Arc::new(MemRaster::new(src)), None, Arc::new(IdentityTransformer));
        opts.working_type = Some(WorkingType::Byte);
        let op = WarpOperation::new(opts)?;

        let mut buffer = RasterBuffer::new(WorkingType::Byte, size, 1);
        op.warp_region_to_buffer(Window::full(size), &mut buffer, None, ScaledProgress::default())?;
        assert_eq!(buffer.as_slice::<u8>(), Some(&[4u8, 5, 6][..]));

        let mut wrong = RasterBuffer::new(WorkingType::Float32, size, 1);
        assert!(matches!(
            op.warp_region_to_buffer(Window::full(size), &mut wrong, None, ScaledProgress::default()),
            Err(WarpError::Configuration(_))
        ));
        assert!(matches!(
            op.chunk_and_warp_image(Window::full(size)),
            Err(WarpError::Configuration(_))
        ));
        Ok(())
    }
}
