/// A packed validity bitmap with one bit per pixel.
///
/// Pixel `o` lives in word `o >> 5`, bit `o & 0x1f`. A set bit means valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidityMask {
    words: Vec<u32>,
    len: usize,
}

impl ValidityMask {
    /// Create a mask with every pixel valid.
    pub fn all_valid(len: usize) -> Self {
        let mut mask = Self {
            words: vec![u32::MAX; len.div_ceil(32)],
            len,
        };
        mask.clear_tail();
        mask
    }

    /// Create a mask with every pixel invalid.
    pub fn all_invalid(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(32)],
            len,
        }
    }

    // keep the padding bits of the last word at zero so word-wise counts stay exact
    fn clear_tail(&mut self) {
        let rem = self.len & 0x1f;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u32 << rem) - 1;
            }
        }
    }

    /// Number of pixels covered by the mask.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the mask covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether pixel `offset` is valid.
    #[inline]
    pub fn is_valid(&self, offset: usize) -> bool {
        self.words[offset >> 5] & (1 << (offset & 0x1f)) != 0
    }

    /// Mark pixel `offset` valid.
    #[inline]
    pub fn set_valid(&mut self, offset: usize) {
        self.words[offset >> 5] |= 1 << (offset & 0x1f);
    }

    /// Mark pixel `offset` invalid.
    #[inline]
    pub fn set_invalid(&mut self, offset: usize) {
        self.words[offset >> 5] &= !(1 << (offset & 0x1f));
    }

    /// Number of valid pixels.
    pub fn count_valid(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether every pixel is valid.
    pub fn is_all_valid(&self) -> bool {
        self.count_valid() == self.len
    }

    /// Mark valid every pixel that is valid in `other`.
    pub fn union_with(&mut self, other: &ValidityMask) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
        self.clear_tail();
    }
}

/// A per-pixel density (coverage/opacity) array.
///
/// 0 is fully transparent, 1 fully opaque.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityMask {
    values: Vec<f32>,
}

impl DensityMask {
    /// Create a density mask with every pixel set to `value`.
    pub fn filled(len: usize, value: f32) -> Self {
        Self {
            values: vec![value; len],
        }
    }

    /// Create a density mask from raw values.
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Number of pixels covered by the mask.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the mask covers no pixel.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Density of pixel `offset`.
    #[inline]
    pub fn get(&self, offset: usize) -> f32 {
        self.values[offset]
    }

    /// Set the density of pixel `offset`.
    #[inline]
    pub fn set(&mut self, offset: usize, value: f32) {
        self.values[offset] = value;
    }

    /// The raw values.
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// The raw values, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.values
    }
}

#[cfg(test)]
mod tests {
    use super::{DensityMask, ValidityMask};

    #[test]
    fn bit_addressing() {
        let mut mask = ValidityMask::all_invalid(70);
        mask.set_valid(0);
        mask.set_valid(33);
        mask.set_valid(69);
        assert_eq!(mask.words, vec![1, 2, 32]);
        assert!(mask.is_valid(33));
        assert!(!mask.is_valid(32));
        mask.set_invalid(33);
        assert_eq!(mask.count_valid(), 2);
    }

    #[test]
    fn all_valid_counts_exactly() {
        let mut mask = ValidityMask::all_valid(40);
        assert_eq!(mask.count_valid(), 40);
        assert!(mask.is_all_valid());
        mask.set_invalid(39);
        assert!(!mask.is_all_valid());
    }

    #[test]
    fn union_keeps_both() {
        let mut a = ValidityMask::all_invalid(8);
        let mut b = ValidityMask::all_invalid(8);
        a.set_valid(1);
        b.set_valid(2);
        a.union_with(&b);
        assert!(a.is_valid(1) && a.is_valid(2));
        assert_eq!(a.count_valid(), 2);
    }

    #[test]
    fn density_values() {
        let mut density = DensityMask::filled(3, 1.0);
        density.set(1, 0.25);
        assert_eq!(density.as_slice(), &[1.0, 0.25, 1.0]);
        assert_eq!(DensityMask::from_vec(vec![0.5]).get(0), 0.5);
    }
}
