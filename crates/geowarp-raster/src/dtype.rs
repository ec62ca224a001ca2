use num_traits::{Bounded, NumCast, ToPrimitive};

use crate::buffer::BandStorage;

/// The numeric type all bands share while a kernel runs.
///
/// Complex types store two interleaved components per pixel, real part first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkingType {
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,
    /// Complex with signed 16-bit integer components.
    CInt16,
    /// Complex with signed 32-bit integer components.
    CInt32,
    /// Complex with 32-bit floating point components.
    CFloat32,
    /// Complex with 64-bit floating point components.
    CFloat64,
}

impl WorkingType {
    /// Every supported working type.
    pub const ALL: [WorkingType; 11] = [
        WorkingType::Byte,
        WorkingType::Int16,
        WorkingType::UInt16,
        WorkingType::Int32,
        WorkingType::UInt32,
        WorkingType::Float32,
        WorkingType::Float64,
        WorkingType::CInt16,
        WorkingType::CInt32,
        WorkingType::CFloat32,
        WorkingType::CFloat64,
    ];

    /// Bits of one component (the real or imaginary part).
    pub fn component_bits(&self) -> usize {
        match self {
            WorkingType::Byte => 8,
            WorkingType::Int16 | WorkingType::UInt16 | WorkingType::CInt16 => 16,
            WorkingType::Int32
            | WorkingType::UInt32
            | WorkingType::Float32
            | WorkingType::CInt32
            | WorkingType::CFloat32 => 32,
            WorkingType::Float64 | WorkingType::CFloat64 => 64,
        }
    }

    /// Bits of one pixel, both components included.
    pub fn size_bits(&self) -> usize {
        self.component_bits() * self.components()
    }

    /// Bytes of one pixel, both components included.
    pub fn size_bytes(&self) -> usize {
        self.size_bits() / 8
    }

    /// Number of stored components per pixel: 2 for complex types, 1 otherwise.
    pub fn components(&self) -> usize {
        if self.is_complex() {
            2
        } else {
            1
        }
    }

    /// Whether the type has an imaginary component.
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            WorkingType::CInt16
                | WorkingType::CInt32
                | WorkingType::CFloat32
                | WorkingType::CFloat64
        )
    }

    /// Whether the components are integers.
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Whether the components are floating point.
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            WorkingType::Float32
                | WorkingType::Float64
                | WorkingType::CFloat32
                | WorkingType::CFloat64
        )
    }

    /// Whether the components can hold negative values.
    pub fn is_signed(&self) -> bool {
        !matches!(
            self,
            WorkingType::Byte | WorkingType::UInt16 | WorkingType::UInt32
        )
    }

    /// Smallest representable component value.
    pub fn min_value(&self) -> f64 {
        match self {
            WorkingType::Byte => u8::MIN as f64,
            WorkingType::Int16 | WorkingType::CInt16 => i16::MIN as f64,
            WorkingType::UInt16 => u16::MIN as f64,
            WorkingType::Int32 | WorkingType::CInt32 => i32::MIN as f64,
            WorkingType::UInt32 => u32::MIN as f64,
            WorkingType::Float32 | WorkingType::CFloat32 => f32::MIN as f64,
            WorkingType::Float64 | WorkingType::CFloat64 => f64::MIN,
        }
    }

    /// Largest representable component value.
    pub fn max_value(&self) -> f64 {
        match self {
            WorkingType::Byte => u8::MAX as f64,
            WorkingType::Int16 | WorkingType::CInt16 => i16::MAX as f64,
            WorkingType::UInt16 => u16::MAX as f64,
            WorkingType::Int32 | WorkingType::CInt32 => i32::MAX as f64,
            WorkingType::UInt32 => u32::MAX as f64,
            WorkingType::Float32 | WorkingType::CFloat32 => f32::MAX as f64,
            WorkingType::Float64 | WorkingType::CFloat64 => f64::MAX,
        }
    }

    /// Smallest working type able to represent every value of both `self` and `other`.
    ///
    /// Used to pick the working type when source and destination bands differ.
    ///
    /// # Examples
    ///
    /// ```
    /// use geowarp_raster::WorkingType;
    ///
    /// assert_eq!(WorkingType::Byte.union(WorkingType::Int16), WorkingType::Int16);
    /// assert_eq!(WorkingType::UInt16.union(WorkingType::Int16), WorkingType::Int32);
    /// assert_eq!(WorkingType::Int32.union(WorkingType::Float32), WorkingType::Float64);
    /// assert_eq!(WorkingType::Float32.union(WorkingType::CInt16), WorkingType::CFloat32);
    /// ```
    pub fn union(self, other: WorkingType) -> WorkingType {
        let complex = self.is_complex() || other.is_complex();
        let floating = self.is_float() || other.is_float();
        let signed = self.is_signed() || other.is_signed();

        // bits needed by the integer members, unsigned ones widened when mixed with signed
        let mut int_bits = 0;
        let mut float_bits = 0;
        for t in [self, other] {
            if t.is_float() {
                float_bits = float_bits.max(t.component_bits());
            } else if signed && !floating && !t.is_signed() {
                int_bits = int_bits.max(t.component_bits() * 2);
            } else {
                int_bits = int_bits.max(t.component_bits());
            }
        }

        let real = if floating {
            if float_bits <= 32 && int_bits <= 16 {
                WorkingType::Float32
            } else {
                WorkingType::Float64
            }
        } else {
            match (signed, int_bits) {
                (false, 8) => WorkingType::Byte,
                (false, 16) => WorkingType::UInt16,
                (false, 32) => WorkingType::UInt32,
                (true, b) if b <= 16 => WorkingType::Int16,
                (true, b) if b <= 32 => WorkingType::Int32,
                _ => WorkingType::Float64,
            }
        };

        if complex {
            real.to_complex()
        } else {
            real
        }
    }

    /// Complex type holding the values of this type in its real part.
    pub fn to_complex(self) -> WorkingType {
        match self {
            WorkingType::Byte | WorkingType::Int16 | WorkingType::CInt16 => WorkingType::CInt16,
            WorkingType::UInt16 | WorkingType::Int32 | WorkingType::CInt32 => WorkingType::CInt32,
            WorkingType::Float32 | WorkingType::CFloat32 => WorkingType::CFloat32,
            WorkingType::UInt32 | WorkingType::Float64 | WorkingType::CFloat64 => {
                WorkingType::CFloat64
            }
        }
    }
}

/// A primitive component type a [`crate::RasterBuffer`] can be backed by.
///
/// Conversions from `f64` follow the write rules of the warp kernel: integer
/// types clamp to their range and round half up, floating types cast directly.
pub trait Sample: Copy + Default + PartialEq + Bounded + NumCast + Send + Sync + 'static {
    /// Whether the component type is an integer.
    const IS_INTEGER: bool;

    /// Real working type stored with this component type.
    const REAL_TYPE: WorkingType;

    /// Complex working type stored with this component type, if any.
    const COMPLEX_TYPE: Option<WorkingType>;

    /// Widen the sample to `f64`.
    fn as_f64(self) -> f64;

    /// Convert an `f64` to the sample type with clamping and rounding.
    fn from_f64(value: f64) -> Self;

    /// Whether this component type backs the given working type.
    fn backs(working_type: WorkingType) -> bool {
        working_type == Self::REAL_TYPE || Some(working_type) == Self::COMPLEX_TYPE
    }

    /// Wrap a vector of samples into the storage for the given working type.
    fn wrap(data: Vec<Self>, working_type: WorkingType) -> Option<BandStorage>;

    /// Borrow the samples out of a storage of the matching component type.
    fn view(storage: &BandStorage) -> Option<&[Self]>;

    /// Mutably borrow the samples out of a storage of the matching component type.
    fn view_mut(storage: &mut BandStorage) -> Option<&mut [Self]>;

    /// Move a stored value off the destination nodata value.
    ///
    /// Integer samples equal to `nodata` become `nodata + 1` when they sit at
    /// the type minimum and `nodata - 1` otherwise. Floating samples are kept.
    fn avoid(self, nodata: f64) -> Self {
        if !Self::IS_INTEGER || self.as_f64() != nodata {
            return self;
        }
        if self == Self::min_value() {
            Self::from_f64(nodata + 1.0)
        } else {
            Self::from_f64(nodata - 1.0)
        }
    }
}

fn round_clamped<T: Bounded + NumCast + Default>(value: f64) -> T {
    let lo = T::min_value().to_f64().unwrap_or(f64::MIN);
    let hi = T::max_value().to_f64().unwrap_or(f64::MAX);
    if value < lo {
        T::min_value()
    } else if value > hi {
        T::max_value()
    } else {
        // NaN falls through every comparison and lands on the default value
        NumCast::from((value + 0.5).floor()).unwrap_or_default()
    }
}

macro_rules! impl_sample {
    ($t:ty, $integer:expr, $real:ident, $complex:expr, [$($variant:ident),+]) => {
        impl Sample for $t {
            const IS_INTEGER: bool = $integer;
            const REAL_TYPE: WorkingType = WorkingType::$real;
            const COMPLEX_TYPE: Option<WorkingType> = $complex;

            #[inline]
            fn as_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                if $integer {
                    round_clamped::<$t>(value)
                } else {
                    value as $t
                }
            }

            fn wrap(data: Vec<Self>, working_type: WorkingType) -> Option<BandStorage> {
                match working_type {
                    $(WorkingType::$variant => Some(BandStorage::$variant(data)),)+
                    _ => None,
                }
            }

            fn view(storage: &BandStorage) -> Option<&[Self]> {
                match storage {
                    $(BandStorage::$variant(data) => Some(data.as_slice()),)+
                    _ => None,
                }
            }

            fn view_mut(storage: &mut BandStorage) -> Option<&mut [Self]> {
                match storage {
                    $(BandStorage::$variant(data) => Some(data.as_mut_slice()),)+
                    _ => None,
                }
            }
        }
    };
}

impl_sample!(u8, true, Byte, None, [Byte]);
impl_sample!(i16, true, Int16, Some(WorkingType::CInt16), [Int16, CInt16]);
impl_sample!(u16, true, UInt16, None, [UInt16]);
impl_sample!(i32, true, Int32, Some(WorkingType::CInt32), [Int32, CInt32]);
impl_sample!(u32, true, UInt32, None, [UInt32]);
impl_sample!(f32, false, Float32, Some(WorkingType::CFloat32), [Float32, CFloat32]);
impl_sample!(f64, false, Float64, Some(WorkingType::CFloat64), [Float64, CFloat64]);
