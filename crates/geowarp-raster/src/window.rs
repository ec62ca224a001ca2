/// Raster size in pixels
///
/// # Examples
///
/// ```
/// use geowarp_raster::RasterSize;
///
/// let size = RasterSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(size.pixel_count(), 200);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RasterSize {
    /// Width of the raster in pixels
    pub width: usize,
    /// Height of the raster in pixels
    pub height: usize,
}

impl RasterSize {
    /// Number of pixels covered by the size.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Whether the size covers no pixel at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for RasterSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<[usize; 2]> for RasterSize {
    fn from(size: [usize; 2]) -> Self {
        RasterSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// A rectangular region of a raster, in pixel/line coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Window {
    /// Column of the top left pixel.
    pub x_off: usize,
    /// Row of the top left pixel.
    pub y_off: usize,
    /// Width of the window in pixels.
    pub width: usize,
    /// Height of the window in pixels.
    pub height: usize,
}

impl Window {
    /// Create a new window.
    pub fn new(x_off: usize, y_off: usize, width: usize, height: usize) -> Self {
        Self {
            x_off,
            y_off,
            width,
            height,
        }
    }

    /// Window covering a whole raster.
    pub fn full(size: RasterSize) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    /// Size of the window.
    pub fn size(&self) -> RasterSize {
        RasterSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Number of pixels in the window.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Whether the window covers no pixel at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the window lies completely inside a raster of the given size.
    pub fn fits(&self, size: RasterSize) -> bool {
        self.x_off + self.width <= size.width && self.y_off + self.height <= size.height
    }

    /// Whether two windows share at least one pixel.
    pub fn overlaps(&self, other: &Window) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x_off < other.x_off + other.width
            && other.x_off < self.x_off + self.width
            && self.y_off < other.y_off + other.height
            && other.y_off < self.y_off + self.height
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{},{},{}x{}",
            self.x_off, self.y_off, self.width, self.height
        )
    }
}
