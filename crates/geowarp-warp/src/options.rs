use std::sync::Arc;

use geowarp_raster::WorkingType;

use crate::error::WarpError;
use crate::interpolation::ResampleAlg;
use crate::masks::MaskGenerator;
use crate::parallel::ExecutionStrategy;
use crate::progress::ProgressFn;
use crate::raster_io::{RasterReader, RasterWriter};
use crate::transformer::Transformer;

/// Memory budget used when [`WarpOptions::memory_limit`] is 0: 64 MiB.
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Number of samples per edge used to find the source window.
pub const DEFAULT_SAMPLE_STEPS: usize = 21;

/// A nodata value with real and imaginary parts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoData {
    /// Real part.
    pub real: f64,
    /// Imaginary part, 0 for real bands.
    pub imag: f64,
}

impl NoData {
    /// Create a nodata value.
    pub fn new(real: f64, imag: f64) -> Self {
        Self { real, imag }
    }

    /// The smallest working type representing this value exactly.
    pub fn working_type(&self) -> WorkingType {
        let real = value_type(self.real);
        if self.imag == 0.0 {
            real
        } else {
            real.union(value_type(self.imag)).to_complex()
        }
    }
}

impl From<f64> for NoData {
    fn from(real: f64) -> Self {
        Self { real, imag: 0.0 }
    }
}

fn value_type(value: f64) -> WorkingType {
    if value.is_nan() || value.is_infinite() {
        return WorkingType::Float32;
    }
    if value.fract() == 0.0 {
        let integer_types = [
            WorkingType::Byte,
            WorkingType::Int16,
            WorkingType::UInt16,
            WorkingType::Int32,
            WorkingType::UInt32,
        ];
        if let Some(t) = integer_types
            .into_iter()
            .find(|t| value >= t.min_value() && value <= t.max_value())
        {
            return t;
        }
    }
    if value as f32 as f64 == value {
        WorkingType::Float32
    } else {
        WorkingType::Float64
    }
}

/// How destination chunks are initialized before warping.
#[derive(Debug, Clone, PartialEq)]
pub enum InitDest {
    /// Fill every band with its destination nodata value (0 without one).
    NoData,
    /// Fill each band with an explicit value.
    Values(Vec<NoData>),
}

/// A caller supplied cutline: a generator of source density plus its blend distance.
#[derive(Clone)]
pub struct Cutline {
    /// Fills a source density array, multiplying into the values already there.
    pub generator: Arc<dyn MaskGenerator>,
    /// Distance in pixels over which the cutline edge is blended.
    pub blend_distance: f64,
}

/// Configuration of a [`crate::WarpOperation`].
#[derive(Clone)]
pub struct WarpOptions {
    /// Raster read from.
    pub src: Arc<dyn RasterReader>,
    /// Raster written to. Only [`crate::WarpOperation::warp_region_to_buffer`] works without one.
    pub dst: Option<Arc<dyn RasterWriter>>,
    /// Destination to source transformer.
    pub transformer: Arc<dyn Transformer>,
    /// Resampling algorithm.
    pub resample_alg: ResampleAlg,
    /// Working type of the kernel; resolved from the bands and nodata values when `None`.
    pub working_type: Option<WorkingType>,
    /// 1-based source bands.
    pub src_bands: Vec<usize>,
    /// 1-based destination bands, one per source band.
    pub dst_bands: Vec<usize>,
    /// Source nodata value per band.
    pub src_nodata: Option<Vec<NoData>>,
    /// Destination nodata value per band.
    pub dst_nodata: Option<Vec<NoData>>,
    /// Memory budget in bytes per chunk, 0 for [`DEFAULT_MEMORY_LIMIT`].
    pub memory_limit: usize,
    /// Progress callback, returning `false` to cancel.
    pub progress: Option<Arc<ProgressFn>>,
    /// Cutline restricting the source.
    pub cutline: Option<Cutline>,
    /// 1-based source alpha band.
    pub src_alpha_band: Option<usize>,
    /// 1-based destination alpha band.
    pub dst_alpha_band: Option<usize>,
    /// Source alpha value meaning fully opaque.
    pub src_alpha_max: f64,
    /// Destination alpha value meaning fully opaque.
    pub dst_alpha_max: f64,
    /// Initialization of destination chunks; `None` reads them from the destination.
    pub init_dest: Option<InitDest>,
    /// A source pixel is nodata only if every band holds its nodata value.
    pub unified_src_nodata: bool,
    /// Always sample a full grid when computing source windows.
    pub sample_grid: bool,
    /// Samples per edge (and per grid axis) when computing source windows.
    pub sample_steps: usize,
    /// Extra source margin in pixels.
    pub source_extra: Option<usize>,
    /// Drop chunks whose source window is empty.
    pub skip_no_source: bool,
    /// Split large chunks whose source window is mostly outside the source raster.
    pub src_fill_ratio_heuristics: bool,
    /// Always run the general kernel path.
    pub use_general_case: bool,
    /// Chunk scheduling of [`crate::WarpOperation::chunk_and_warp_multi`].
    pub execution: ExecutionStrategy,
}

impl WarpOptions {
    /// Options warping every band of `src` into the same bands of `dst`.
    pub fn new(
        src: Arc<dyn RasterReader>,
        dst: Option<Arc<dyn RasterWriter>>,
        transformer: Arc<dyn Transformer>,
    ) -> Self {
        let bands: Vec<usize> = (1..=src.band_count()).collect();
        Self {
            src,
            dst,
            transformer,
            resample_alg: ResampleAlg::default(),
            working_type: None,
            src_bands: bands.clone(),
            dst_bands: bands,
            src_nodata: None,
            dst_nodata: None,
            memory_limit: 0,
            progress: None,
            cutline: None,
            src_alpha_band: None,
            dst_alpha_band: None,
            src_alpha_max: 255.0,
            dst_alpha_max: 255.0,
            init_dest: None,
            unified_src_nodata: false,
            sample_grid: false,
            sample_steps: DEFAULT_SAMPLE_STEPS,
            source_extra: None,
            skip_no_source: false,
            src_fill_ratio_heuristics: true,
            use_general_case: false,
            execution: ExecutionStrategy::default(),
        }
    }

    /// Number of bands warped.
    pub fn band_count(&self) -> usize {
        self.src_bands.len()
    }

    /// The memory budget in bytes.
    pub fn memory_limit_bytes(&self) -> usize {
        if self.memory_limit == 0 {
            DEFAULT_MEMORY_LIMIT
        } else {
            self.memory_limit
        }
    }

    /// Check the options for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`WarpError::Configuration`] naming the first problem found.
    pub fn validate(&self) -> Result<(), WarpError> {
        let bands = self.band_count();
        if bands == 0 {
            return Err(config("no bands to warp"));
        }
        if self.dst_bands.len() != bands {
            return Err(config(format!(
                "{bands} source bands but {} destination bands",
                self.dst_bands.len()
            )));
        }
        check_bands("source", &self.src_bands, self.src.band_count())?;
        if let Some(dst) = &self.dst {
            check_bands("destination", &self.dst_bands, dst.band_count())?;
        }

        for (name, nodata) in [("source", &self.src_nodata), ("destination", &self.dst_nodata)] {
            if let Some(values) = nodata {
                if values.len() != bands {
                    return Err(config(format!(
                        "{} {name} nodata values for {bands} bands",
                        values.len()
                    )));
                }
            }
        }
        if let Some(InitDest::Values(values)) = &self.init_dest {
            if values.len() != bands {
                return Err(config(format!(
                    "{} initialization values for {bands} bands",
                    values.len()
                )));
            }
        }

        if let Some(band) = self.src_alpha_band {
            check_bands("source alpha", &[band], self.src.band_count())?;
        }
        if let Some(band) = self.dst_alpha_band {
            match &self.dst {
                Some(dst) => check_bands("destination alpha", &[band], dst.band_count())?,
                None => return Err(config("a destination alpha band needs a destination raster")),
            }
        }
        for alpha_max in [self.src_alpha_max, self.dst_alpha_max] {
            if !(alpha_max.is_finite() && alpha_max > 0.0) {
                return Err(config(format!("alpha maximum must be positive, got {alpha_max}")));
            }
        }
        if let Some(cutline) = &self.cutline {
            if !(cutline.blend_distance.is_finite() && cutline.blend_distance >= 0.0) {
                return Err(config(format!(
                    "cutline blend distance must be >= 0, got {}",
                    cutline.blend_distance
                )));
            }
        }

        if self.sample_steps < 2 {
            return Err(config(format!(
                "sample steps must be >= 2, got {}",
                self.sample_steps
            )));
        }
        if self.execution == ExecutionStrategy::Fixed(0) {
            return Err(config("thread count must be > 0"));
        }
        Ok(())
    }

    /// The working type of the kernel.
    ///
    /// Either the configured one or the smallest type representing every
    /// source and destination band and nodata value.
    ///
    /// # Errors
    ///
    /// Fails when a band type cannot be queried.
    pub fn resolve_working_type(&self) -> Result<WorkingType, WarpError> {
        if let Some(working_type) = self.working_type {
            return Ok(working_type);
        }

        let mut working_type = WorkingType::Byte;
        for &band in &self.src_bands {
            working_type = working_type.union(self.src.band_type(band)?);
        }
        if let Some(dst) = &self.dst {
            for &band in &self.dst_bands {
                working_type = working_type.union(dst.band_type(band)?);
            }
        }
        for nodata in [&self.src_nodata, &self.dst_nodata].into_iter().flatten() {
            for value in nodata {
                working_type = working_type.union(value.working_type());
            }
        }
        Ok(working_type)
    }
}

fn config(message: impl Into<String>) -> WarpError {
    WarpError::Configuration(message.into())
}

fn check_bands(name: &str, bands: &[usize], band_count: usize) -> Result<(), WarpError> {
    match bands.iter().find(|&&b| b == 0 || b > band_count) {
        Some(band) => Err(config(format!(
            "{name} band {band} is out of range 1..={band_count}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use geowarp_raster::{RasterSize, WorkingType};

    use super::{InitDest, NoData, WarpOptions, DEFAULT_MEMORY_LIMIT};
    use crate::error::WarpError;
    use crate::parallel::ExecutionStrategy;
    use crate::raster_io::{MemRaster, RasterWriter};
    use crate::transformer::IdentityTransformer;

    fn options(src_type: WorkingType, dst_type: WorkingType) -> WarpOptions {
        let size = RasterSize { width: 4, height: 4 };
        let dst: Arc<dyn RasterWriter> = Arc::new(MemRaster::zeros(dst_type, size, 2));
        WarpOptions::new(
            Arc::new(MemRaster::zeros(src_type, size, 2)),
            Some(dst),
            Arc::new(IdentityTransformer),
        )
    }

    #[test]
    fn defaults() {
        let opts = options(WorkingType::Byte, WorkingType::Byte);
        assert_eq!(opts.src_bands, vec![1, 2]);
        assert_eq!(opts.dst_bands, vec![1, 2]);
        assert_eq!(opts.memory_limit_bytes(), DEFAULT_MEMORY_LIMIT);
        assert_eq!(opts.sample_steps, 21);
        assert!(opts.src_fill_ratio_heuristics);
        assert_eq!(opts.validate(), Ok(()));
    }

    #[test]
    fn validation_errors() {
        let mut opts = options(WorkingType::Byte, WorkingType::Byte);
        opts.dst_bands = vec![1];
        assert!(matches!(opts.validate(), Err(WarpError::Configuration(_))));

        let mut opts = options(WorkingType::Byte, WorkingType::Byte);
        opts.src_bands = vec![1, 3];
        assert!(matches!(opts.validate(), Err(WarpError::Configuration(_))));

        let mut opts = options(WorkingType::Byte, WorkingType::Byte);
        opts.src_nodata = Some(vec![NoData::from(0.0)]);
        assert!(matches!(opts.validate(), Err(WarpError::Configuration(_))));

        let mut opts = options(WorkingType::Byte, WorkingType::Byte);
        opts.init_dest = Some(InitDest::Values(vec![NoData::from(1.0)]));
        assert!(matches!(opts.validate(), Err(WarpError::Configuration(_))));

        let mut opts = options(WorkingType::Byte, WorkingType::Byte);
        opts.sample_steps = 1;
        assert!(matches!(opts.validate(), Err(WarpError::Configuration(_))));

        let mut opts = options(WorkingType::Byte, WorkingType::Byte);
        opts.execution = ExecutionStrategy::Fixed(0);
        assert!(matches!(opts.validate(), Err(WarpError::Configuration(_))));

        let mut opts = options(WorkingType::Byte, WorkingType::Byte);
        opts.dst = None;
        opts.dst_alpha_band = Some(2);
        assert!(matches!(opts.validate(), Err(WarpError::Configuration(_))));
    }

    #[test]
    fn working_type_resolution() -> Result<(), WarpError> {
        let opts = options(WorkingType::Byte, WorkingType::Byte);
        assert_eq!(opts.resolve_working_type()?, WorkingType::Byte);

        let mut opts = options(WorkingType::Byte, WorkingType::UInt16);
        assert_eq!(opts.resolve_working_type()?, WorkingType::UInt16);
        opts.dst_nodata = Some(vec![NoData::from(-1.0), NoData::from(0.0)]);
        assert_eq!(opts.resolve_working_type()?, WorkingType::Int32);

        let mut opts = options(WorkingType::Byte, WorkingType::Byte);
        opts.src_nodata = Some(vec![NoData::from(0.5), NoData::from(0.0)]);
        assert_eq!(opts.resolve_working_type()?, WorkingType::Float32);

        opts.working_type = Some(WorkingType::Float64);
        assert_eq!(opts.resolve_working_type()?, WorkingType::Float64);
        Ok(())
    }

    #[test]
    fn nodata_types() {
        assert_eq!(NoData::from(0.0).working_type(), WorkingType::Byte);
        assert_eq!(NoData::from(-32768.0).working_type(), WorkingType::Int16);
        assert_eq!(NoData::from(65535.0).working_type(), WorkingType::UInt16);
        assert_eq!(NoData::from(f64::NAN).working_type(), WorkingType::Float32);
        assert_eq!(NoData::from(0.1).working_type(), WorkingType::Float64);
        assert_eq!(NoData::new(1.0, 2.0).working_type(), WorkingType::CInt16);
    }
}
