use std::sync::Arc;

use crate::error::TransformError;

/// Direction of a coordinate transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformDirection {
    /// Destination pixel/line to source pixel/line. The warp kernel only uses this direction.
    DstToSrc,
    /// Source pixel/line to destination pixel/line.
    SrcToDst,
}

/// Batch mapping between destination and source pixel/line space.
///
/// Coordinates are transformed in place. `success[i]` reports whether point `i`
/// could be transformed; a failed point is routine and simply skipped by the
/// kernel. Returning an error means the whole batch failed.
pub trait Transformer: Send + Sync {
    /// Transform a batch of points in place.
    ///
    /// # Arguments
    ///
    /// * `direction` - The direction of the transformation.
    /// * `x` - The x (pixel) coordinates.
    /// * `y` - The y (line) coordinates.
    /// * `z` - The z coordinates, passed through by planar transformers.
    /// * `success` - Per point success flags.
    ///
    /// # Errors
    ///
    /// Returns an error when the batch as a whole cannot be transformed.
    fn transform(
        &self,
        direction: TransformDirection,
        x: &mut [f64],
        y: &mut [f64],
        z: &mut [f64],
        success: &mut [bool],
    ) -> Result<(), TransformError>;
}

impl<T: Transformer + ?Sized> Transformer for Arc<T> {
    fn transform(
        &self,
        direction: TransformDirection,
        x: &mut [f64],
        y: &mut [f64],
        z: &mut [f64],
        success: &mut [bool],
    ) -> Result<(), TransformError> {
        (**self).transform(direction, x, y, z, success)
    }
}

fn check_lengths(x: &[f64], y: &[f64], z: &[f64], success: &[bool]) -> Result<(), TransformError> {
    let n = x.len();
    if y.len() != n || z.len() != n || success.len() != n {
        return Err(TransformError::LengthMismatch(
            n,
            y.len(),
            z.len(),
            success.len(),
        ));
    }
    Ok(())
}

/// Maps every point onto itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn transform(
        &self,
        _direction: TransformDirection,
        x: &mut [f64],
        y: &mut [f64],
        z: &mut [f64],
        success: &mut [bool],
    ) -> Result<(), TransformError> {
        check_lengths(x, y, z, success)?;
        success.fill(true);
        Ok(())
    }
}

/// Inverts a six coefficient affine geotransform.
///
/// The geotransform maps pixel/line to georeferenced coordinates as
/// `X = gt[0] + px * gt[1] + py * gt[2]` and `Y = gt[3] + px * gt[4] + py * gt[5]`.
///
/// # Errors
///
/// Returns [`TransformError::SingularMatrix`] when the linear part is not invertible.
///
/// # Example
///
/// ```
/// use geowarp_warp::transformer::invert_geotransform;
///
/// let gt = [100.0, 2.0, 0.0, 50.0, 0.0, -2.0];
/// let inv = invert_geotransform(&gt).unwrap();
/// assert_eq!(inv, [-50.0, 0.5, 0.0, 25.0, 0.0, -0.5]);
/// ```
pub fn invert_geotransform(gt: &[f64; 6]) -> Result<[f64; 6], TransformError> {
    let determinant = gt[1] * gt[5] - gt[2] * gt[4];
    if determinant == 0.0 || !determinant.is_finite() {
        return Err(TransformError::SingularMatrix(determinant));
    }
    let inv_det = 1.0 / determinant;

    let a = gt[5] * inv_det;
    let b = -gt[2] * inv_det;
    let d = -gt[4] * inv_det;
    let e = gt[1] * inv_det;

    Ok([
        -(a * gt[0] + b * gt[3]),
        a,
        b,
        -(d * gt[0] + e * gt[3]),
        d,
        e,
    ])
}

/// Composes two geotransforms so that the result applies `second` after `first`.
pub fn compose_geotransforms(first: &[f64; 6], second: &[f64; 6]) -> [f64; 6] {
    [
        second[0] + second[1] * first[0] + second[2] * first[3],
        second[1] * first[1] + second[2] * first[4],
        second[1] * first[2] + second[2] * first[5],
        second[3] + second[4] * first[0] + second[5] * first[3],
        second[4] * first[1] + second[5] * first[4],
        second[4] * first[2] + second[5] * first[5],
    ]
}

#[inline]
fn apply(m: &[f64; 6], x: f64, y: f64) -> (f64, f64) {
    (m[0] + m[1] * x + m[2] * y, m[3] + m[4] * x + m[5] * y)
}

/// Affine mapping between destination and source pixel/line space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransformer {
    dst_to_src: [f64; 6],
    src_to_dst: [f64; 6],
}

impl AffineTransformer {
    /// Create a transformer from the geotransforms of the source and destination rasters.
    ///
    /// Both geotransforms must be expressed in the same georeferenced coordinate system.
    ///
    /// # Errors
    ///
    /// Fails when either geotransform is not invertible.
    pub fn new(src_geotransform: [f64; 6], dst_geotransform: [f64; 6]) -> Result<Self, TransformError> {
        let src_inv = invert_geotransform(&src_geotransform)?;
        let dst_inv = invert_geotransform(&dst_geotransform)?;
        Ok(Self {
            dst_to_src: compose_geotransforms(&dst_geotransform, &src_inv),
            src_to_dst: compose_geotransforms(&src_geotransform, &dst_inv),
        })
    }

    /// Create a transformer from a direct destination-to-source matrix.
    ///
    /// The matrix uses the geotransform coefficient order.
    ///
    /// # Errors
    ///
    /// Fails when the matrix is not invertible.
    pub fn from_dst_to_src(matrix: [f64; 6]) -> Result<Self, TransformError> {
        Ok(Self {
            dst_to_src: matrix,
            src_to_dst: invert_geotransform(&matrix)?,
        })
    }

    /// Destination pixels rotated by `angle` degrees around `dst_center` and
    /// scaled by `scale`, landing on `src_center` in the source.
    ///
    /// # Errors
    ///
    /// Fails when `scale` is zero.
    pub fn rotation(
        dst_center: (f64, f64),
        src_center: (f64, f64),
        angle: f64,
        scale: f64,
    ) -> Result<Self, TransformError> {
        let (sin, cos) = angle.to_radians().sin_cos();
        let (a, b) = (scale * cos, scale * sin);
        Self::from_dst_to_src([
            src_center.0 - a * dst_center.0 + b * dst_center.1,
            a,
            -b,
            src_center.1 - b * dst_center.0 - a * dst_center.1,
            b,
            a,
        ])
    }

    /// The destination-to-source matrix.
    pub fn dst_to_src(&self) -> &[f64; 6] {
        &self.dst_to_src
    }

    /// The source-to-destination matrix.
    pub fn src_to_dst(&self) -> &[f64; 6] {
        &self.src_to_dst
    }
}

impl Transformer for AffineTransformer {
    fn transform(
        &self,
        direction: TransformDirection,
        x: &mut [f64],
        y: &mut [f64],
        z: &mut [f64],
        success: &mut [bool],
    ) -> Result<(), TransformError> {
        check_lengths(x, y, z, success)?;
        let m = match direction {
            TransformDirection::DstToSrc => &self.dst_to_src,
            TransformDirection::SrcToDst => &self.src_to_dst,
        };
        for ((px, py), ok) in x.iter_mut().zip(y.iter_mut()).zip(success.iter_mut()) {
            (*px, *py) = apply(m, *px, *py);
            *ok = true;
        }
        Ok(())
    }
}

/// Wraps a closure as a [`Transformer`].
///
/// # Example
///
/// ```
/// use geowarp_warp::transformer::{FnTransformer, TransformDirection, Transformer};
///
/// let shift = FnTransformer::new(|_dir: TransformDirection, x: &mut [f64], _y: &mut [f64], _z: &mut [f64], ok: &mut [bool]| {
///     x.iter_mut().for_each(|v| *v += 1.0);
///     ok.fill(true);
///     Ok(())
/// });
///
/// let (mut x, mut y, mut z, mut ok) = ([0.5], [0.5], [0.0], [false]);
/// shift.transform(TransformDirection::DstToSrc, &mut x, &mut y, &mut z, &mut ok).unwrap();
/// assert_eq!(x, [1.5]);
/// ```
pub struct FnTransformer<F> {
    func: F,
}

impl<F> FnTransformer<F>
where
    F: Fn(TransformDirection, &mut [f64], &mut [f64], &mut [f64], &mut [bool]) -> Result<(), TransformError>
        + Send
        + Sync,
{
    /// Wrap a closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Transformer for FnTransformer<F>
where
    F: Fn(TransformDirection, &mut [f64], &mut [f64], &mut [f64], &mut [bool]) -> Result<(), TransformError>
        + Send
        + Sync,
{
    fn transform(
        &self,
        direction: TransformDirection,
        x: &mut [f64],
        y: &mut [f64],
        z: &mut [f64],
        success: &mut [bool],
    ) -> Result<(), TransformError> {
        check_lengths(x, y, z, success)?;
        (self.func)(direction, x, y, z, success)
    }
}

/// Approximates an expensive transformer by linear interpolation along a batch.
///
/// Batches whose points lie on one horizontal line (a destination scanline) are
/// transformed exactly at both ends and at the middle; when the middle point
/// deviates from the straight line by no more than `max_error` pixels the
/// remaining points are interpolated, otherwise the batch is split in two and
/// each half is handled the same way.
#[derive(Clone)]
pub struct ApproxTransformer {
    base: Arc<dyn Transformer>,
    max_error: f64,
}

impl ApproxTransformer {
    /// Default interpolation tolerance in pixels.
    pub const DEFAULT_MAX_ERROR: f64 = 0.125;

    /// Wrap `base`, allowing at most `max_error` pixels of interpolation error.
    pub fn new(base: Arc<dyn Transformer>, max_error: f64) -> Self {
        Self { base, max_error }
    }

    /// The interpolation tolerance in pixels.
    pub fn max_error(&self) -> f64 {
        self.max_error
    }

    fn transform_span(
        &self,
        direction: TransformDirection,
        x: &mut [f64],
        y: &mut [f64],
        z: &mut [f64],
        success: &mut [bool],
    ) -> Result<(), TransformError> {
        let n = x.len();
        if n < 5 || y[0] != y[n - 1] || z[0] != z[n - 1] || x[0] == x[n - 1] {
            return self.base.transform(direction, x, y, z, success);
        }

        let mid = (n - 1) / 2;
        let mut sx = [x[0], x[mid], x[n - 1]];
        let mut sy = [y[0], y[mid], y[n - 1]];
        let mut sz = [z[0], z[mid], z[n - 1]];
        let mut ok = [false; 3];
        self.base
            .transform(direction, &mut sx, &mut sy, &mut sz, &mut ok)?;
        if !ok.iter().all(|&o| o) {
            return self.base.transform(direction, x, y, z, success);
        }

        let (x0, span) = (x[0], x[n - 1] - x[0]);
        let t_mid = (x[mid] - x0) / span;
        let error = (sx[0] + t_mid * (sx[2] - sx[0]) - sx[1]).abs()
            + (sy[0] + t_mid * (sy[2] - sy[0]) - sy[1]).abs();

        if error > self.max_error {
            let (x_lo, x_hi) = x.split_at_mut(mid);
            let (y_lo, y_hi) = y.split_at_mut(mid);
            let (z_lo, z_hi) = z.split_at_mut(mid);
            let (s_lo, s_hi) = success.split_at_mut(mid);
            self.transform_span(direction, x_lo, y_lo, z_lo, s_lo)?;
            return self.transform_span(direction, x_hi, y_hi, z_hi, s_hi);
        }

        for i in 0..n {
            let t = (x[i] - x0) / span;
            x[i] = sx[0] + t * (sx[2] - sx[0]);
            y[i] = sy[0] + t * (sy[2] - sy[0]);
            z[i] = sz[0] + t * (sz[2] - sz[0]);
            success[i] = true;
        }
        Ok(())
    }
}

impl Transformer for ApproxTransformer {
    fn transform(
        &self,
        direction: TransformDirection,
        x: &mut [f64],
        y: &mut [f64],
        z: &mut [f64],
        success: &mut [bool],
    ) -> Result<(), TransformError> {
        check_lengths(x, y, z, success)?;
        self.transform_span(direction, x, y, z, success)
    }
}
