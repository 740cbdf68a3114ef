//! GEMM problem description: element types and memory layout of A, B and C.

use bon::bon;
use tessel_ir::{DType, Dim};

/// Storage order of a matrix in device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::AsRefStr)]
pub enum MatrixLayout {
    /// Column-major: the first logical dimension is contiguous.
    #[default]
    N,
    /// Row-major: the second logical dimension is contiguous.
    T,
}

impl MatrixLayout {
    /// Dimensions of a `rows x cols` matrix ordered contiguous first.
    pub fn dims(self, rows: Dim, cols: Dim) -> [Dim; 2] {
        match self {
            Self::N => [rows, cols],
            Self::T => [cols, rows],
        }
    }
}

/// Layout and known alignment of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatrixAddressing {
    pub layout: MatrixLayout,
    /// Guaranteed byte alignment of every column (row for `T`), zero if unknown.
    pub alignment: i64,
}

impl MatrixAddressing {
    pub fn new(layout: MatrixLayout, alignment: i64) -> Self {
        Self { layout, alignment }
    }
}

/// `C = A * B` with `A: m x k`, `B: k x n`, `C: m x n`.
///
/// `ta`/`tb`/`tc` are the compute types, the `_ext` variants the types in
/// memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmProblem {
    pub ta: DType,
    pub tb: DType,
    pub tc: DType,
    pub ta_ext: DType,
    pub tb_ext: DType,
    pub tc_ext: DType,
    pub a: MatrixAddressing,
    pub b: MatrixAddressing,
    pub c: MatrixAddressing,
}

#[bon]
impl GemmProblem {
    /// Memory types default to the compute types.
    #[builder]
    pub fn builder(
        ta: DType,
        tb: DType,
        tc: DType,
        ta_ext: Option<DType>,
        tb_ext: Option<DType>,
        tc_ext: Option<DType>,
        #[builder(default)] a: MatrixAddressing,
        #[builder(default)] b: MatrixAddressing,
        #[builder(default)] c: MatrixAddressing,
    ) -> Self {
        Self {
            ta_ext: ta_ext.unwrap_or_else(|| ta.clone()),
            tb_ext: tb_ext.unwrap_or_else(|| tb.clone()),
            tc_ext: tc_ext.unwrap_or_else(|| tc.clone()),
            ta,
            tb,
            tc,
            a,
            b,
            c,
        }
    }

    pub fn has_type_conversion(&self) -> bool {
        self.ta != self.ta_ext || self.tb != self.tb_ext || self.tc != self.tc_ext
    }

    /// Memory dimensions of A, contiguous first.
    pub fn a_dims(&self) -> [Dim; 2] {
        self.a.layout.dims(Dim::M, Dim::K)
    }

    pub fn b_dims(&self) -> [Dim; 2] {
        self.b.layout.dims(Dim::K, Dim::N)
    }

    pub fn c_dims(&self) -> [Dim; 2] {
        self.c.layout.dims(Dim::M, Dim::N)
    }
}
