//! Element types for the Tessel kernel IR.
//!
//! Sizes are tracked in bits so that sub-byte formats (`S4`, `U4`, `F4E2M1`, ...)
//! are exact. Byte sizes round up.

pub mod ext;

#[cfg(any(test, feature = "proptest"))]
pub mod proptest_gen;


/// Address space for pointer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum AddrSpace {
    /// Global/device memory.
    Global,
    /// Shared local memory, scoped to a thread group.
    Slm,
}

/// Scalar data types.
#[derive(Debug, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr, strum::AsRefStr)]
#[derive(enumset::EnumSetType)]
#[cfg_attr(feature = "proptest", derive(proptest_derive::Arbitrary))]
#[enumset(repr = "u32")]
#[strum(serialize_all = "lowercase")]
pub enum ScalarDType {
    Bool = 0,

    S4 = 1,
    U4 = 2,
    S8 = 3,
    U8 = 4,
    S16 = 5,
    U16 = 6,
    S32 = 7,
    U32 = 8,
    S64 = 9,
    U64 = 10,

    /// 4-bit float, 2 exponent bits and 1 mantissa bit.
    F4E2M1 = 11,
    /// 4-bit float, 3 exponent bits and no mantissa.
    F4E3M0 = 12,
    /// 8-bit float, e5m2.
    BF8 = 13,
    /// 8-bit float, e4m3.
    HF8 = 14,
    F16 = 15,
    BF16 = 16,
    /// 19-bit float stored in 32 bits.
    TF32 = 17,
    F32 = 18,
    F64 = 19,

    /// Void type for statements and untyped buffers.
    Void = 20,
}

/// Data type including scalars, vectors and pointers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DType {
    /// Scalar type (single value).
    Scalar(ScalarDType),

    /// Vector type (SIMD).
    Vector { scalar: ScalarDType, count: usize },

    /// Pointer type.
    Ptr { base: Box<DType>, addrspace: AddrSpace, mutable: bool },
}

impl ScalarDType {
    pub const fn bits(&self) -> usize {
        match self {
            Self::Bool => 8,
            Self::S4 | Self::U4 | Self::F4E2M1 | Self::F4E3M0 => 4,
            Self::S8 | Self::U8 | Self::BF8 | Self::HF8 => 8,
            Self::S16 | Self::U16 | Self::F16 | Self::BF16 => 16,
            Self::S32 | Self::U32 | Self::F32 | Self::TF32 => 32,
            Self::S64 | Self::U64 | Self::F64 => 64,
            Self::Void => 0,
        }
    }

    /// Storage size in bytes, rounded up for sub-byte formats.
    pub const fn bytes(&self) -> usize {
        self.bits().div_ceil(8)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::S4 | Self::S8 | Self::S16 | Self::S32 | Self::S64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::U4 | Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(
            self,
            Self::F4E2M1 | Self::F4E3M0 | Self::BF8 | Self::HF8 | Self::F16 | Self::BF16 | Self::TF32 | Self::F32 | Self::F64
        )
    }

    /// Narrow formats that only exist as storage types (no native arithmetic).
    pub const fn is_narrow(&self) -> bool {
        matches!(self, Self::S4 | Self::U4 | Self::F4E2M1 | Self::F4E3M0 | Self::BF8 | Self::HF8 | Self::TF32)
    }
}

impl From<ScalarDType> for DType {
    fn from(scalar: ScalarDType) -> Self {
        Self::Scalar(scalar)
    }
}

impl DType {
    // =========================================================================
    // Type Constructors
    // =========================================================================

    /// Create a vector type from this dtype.
    pub fn vec(&self, count: usize) -> Self {
        if count == 1 {
            return self.clone();
        }

        match self {
            Self::Scalar(s) if !matches!(s, ScalarDType::Void) => Self::Vector { scalar: *s, count },
            Self::Vector { .. } => panic!("Cannot vectorize an already vectorized type"),
            _ => self.clone(),
        }
    }

    /// Create a pointer type from this dtype.
    pub fn ptr(self, addrspace: AddrSpace) -> Self {
        match self {
            Self::Ptr { .. } => panic!("Cannot make a pointer from a pointer"),
            _ => Self::Ptr { base: Box::new(self), addrspace, mutable: false },
        }
    }

    /// Same type with the mutability flag set (pointers only; values are unchanged).
    pub fn with_mut(self) -> Self {
        match self {
            Self::Ptr { base, addrspace, .. } => Self::Ptr { base, addrspace, mutable: true },
            other => other,
        }
    }

    pub fn scalar(&self) -> Option<ScalarDType> {
        match self {
            Self::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Get the base scalar type (works for scalars, vectors and pointers).
    pub fn base(&self) -> ScalarDType {
        match self {
            Self::Scalar(s) => *s,
            Self::Vector { scalar, .. } => *scalar,
            Self::Ptr { base, .. } => base.base(),
        }
    }

    /// Get the vector count (1 for scalars).
    pub fn count(&self) -> usize {
        match self {
            Self::Vector { count, .. } => *count,
            _ => 1,
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector { .. })
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Self::Ptr { .. })
    }

    /// Pointer into shared local memory.
    pub fn is_slm(&self) -> bool {
        matches!(self, Self::Ptr { addrspace: AddrSpace::Slm, .. })
    }

    pub fn addrspace(&self) -> Option<AddrSpace> {
        match self {
            Self::Ptr { addrspace, .. } => Some(*addrspace),
            _ => None,
        }
    }

    // =========================================================================
    // Type Properties
    // =========================================================================

    pub fn bits(&self) -> usize {
        match self {
            Self::Scalar(s) => s.bits(),
            Self::Vector { scalar, count } => scalar.bits() * count,
            Self::Ptr { .. } => 64,
        }
    }

    pub fn bytes(&self) -> usize {
        self.bits().div_ceil(8)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.scalar(), Some(ScalarDType::Bool))
    }

    pub fn is_int(&self) -> bool {
        self.scalar().is_some_and(|s| s.is_int())
    }

    pub fn is_signed(&self) -> bool {
        self.scalar().is_some_and(|s| s.is_signed())
    }

    pub fn is_float(&self) -> bool {
        self.scalar().is_some_and(|s| s.is_float())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Scalar(ScalarDType::Void))
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{}", s.as_ref()),
            Self::Vector { scalar, count } => write!(f, "{}x{}", scalar.as_ref(), count),
            Self::Ptr { base, addrspace, mutable } => {
                write!(f, "{}{}*", if *mutable { "mut " } else { "" }, base)?;
                if *addrspace == AddrSpace::Slm { write!(f, "[slm]") } else { Ok(()) }
            }
        }
    }
}

// Legacy-style constants, used pervasively by the IR and tests.
#[allow(non_upper_case_globals)]
impl DType {
    pub const Bool: Self = Self::Scalar(ScalarDType::Bool);
    pub const S4: Self = Self::Scalar(ScalarDType::S4);
    pub const U4: Self = Self::Scalar(ScalarDType::U4);
    pub const S8: Self = Self::Scalar(ScalarDType::S8);
    pub const U8: Self = Self::Scalar(ScalarDType::U8);
    pub const S16: Self = Self::Scalar(ScalarDType::S16);
    pub const U16: Self = Self::Scalar(ScalarDType::U16);
    pub const S32: Self = Self::Scalar(ScalarDType::S32);
    pub const U32: Self = Self::Scalar(ScalarDType::U32);
    pub const S64: Self = Self::Scalar(ScalarDType::S64);
    pub const U64: Self = Self::Scalar(ScalarDType::U64);
    pub const F4E2M1: Self = Self::Scalar(ScalarDType::F4E2M1);
    pub const F4E3M0: Self = Self::Scalar(ScalarDType::F4E3M0);
    pub const BF8: Self = Self::Scalar(ScalarDType::BF8);
    pub const HF8: Self = Self::Scalar(ScalarDType::HF8);
    pub const F16: Self = Self::Scalar(ScalarDType::F16);
    pub const BF16: Self = Self::Scalar(ScalarDType::BF16);
    pub const TF32: Self = Self::Scalar(ScalarDType::TF32);
    pub const F32: Self = Self::Scalar(ScalarDType::F32);
    pub const F64: Self = Self::Scalar(ScalarDType::F64);
    pub const Void: Self = Self::Scalar(ScalarDType::Void);
}
