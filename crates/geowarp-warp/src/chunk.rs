use geowarp_raster::Window;

/// The source region needed to warp one destination window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SourceWindow {
    /// Window in the source raster, clipped to it. Empty when nothing is needed.
    pub window: Window,
    /// Columns read beyond the transformed footprint clipped to the raster.
    pub extra_width: f64,
    /// Rows read beyond the transformed footprint clipped to the raster.
    pub extra_height: f64,
    /// Clipped area over unclipped area of the window with its margin.
    pub fill_ratio: f64,
}

impl SourceWindow {
    /// Whether no source pixel is needed.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

/// One unit of work of a chunked warp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkDescriptor {
    /// Destination window of the chunk.
    pub dst: Window,
    /// Source window read for the chunk.
    pub src: SourceWindow,
    /// Estimated bytes of buffers and masks for the chunk.
    pub memory_bytes: usize,
}
