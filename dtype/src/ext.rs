use super::*;

/// Host types with a fixed IR element type.
pub trait HasDType {
    const DTYPE: DType;
}

macro_rules! impl_dtype_ext {
    ($($ty:ty => $dtype:expr),* $(,)?) => {
        $(impl HasDType for $ty { const DTYPE: DType = $dtype; })*
    };
}

impl_dtype_ext! {
    bool => DType::Bool,
    i8 => DType::S8, i16 => DType::S16, i32 => DType::S32, i64 => DType::S64,
    u8 => DType::U8, u16 => DType::U16, u32 => DType::U32, u64 => DType::U64,
    f32 => DType::F32, f64 => DType::F64,
}
