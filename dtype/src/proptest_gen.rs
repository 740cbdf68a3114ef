use crate::*;
use proptest::prelude::*;

#[rustfmt::skip]
impl ScalarDType {
    /// Element types a GEMM operand can be stored in.
    pub fn operand_generator() -> impl Strategy<Value = Self> {
        prop_oneof![
            Just(Self::S8), Just(Self::U8), Just(Self::S16), Just(Self::U16), Just(Self::S32),
            Just(Self::BF8), Just(Self::HF8), Just(Self::F16), Just(Self::BF16),
            Just(Self::TF32), Just(Self::F32)
        ]
    }

    pub fn scalar_generator() -> impl Strategy<Value = Self> {
        prop_oneof![
            Just(Self::Bool),
            Just(Self::S4), Just(Self::U4), Just(Self::S8), Just(Self::U8), Just(Self::S16), Just(Self::U16),
            Just(Self::S32), Just(Self::U32), Just(Self::S64), Just(Self::U64),
            Just(Self::F4E2M1), Just(Self::F4E3M0), Just(Self::BF8), Just(Self::HF8),
            Just(Self::F16), Just(Self::BF16), Just(Self::TF32), Just(Self::F32), Just(Self::F64)
        ]
    }
}
