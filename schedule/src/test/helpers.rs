//! Test utilities for transfer, pipeline and kernel-build tests.

use tessel_ir::visit::{count, walk};
use tessel_ir::{
    AddrSpace, Builder, ConstraintSet, DType, Dim, DimMap, ExecConfig, Expr, GlobalTensor, Hw, KernelIface, SendStmt,
    Stmt, Tile,
};

use crate::config::BuildConfig;
use crate::gemm::{GemmBuild, GemmIrDesc, GemmProblem, GemmStrategy, build_ir_with};

pub const HW: Hw = Hw::XeHpc;

/// Kernel with a single f32 matrix `A` of extents `m x k` and pitch `lda`.
pub fn transfer_kernel(cset: impl FnOnce(&KernelIface) -> ConstraintSet) -> Builder {
    let iface = KernelIface::new()
        .with_arg("A", DType::F32.ptr(AddrSpace::Global))
        .with_arg("lda", DType::S32)
        .with_arg("m", DType::S32)
        .with_arg("k", DType::S32);
    let cset = cset(&iface);
    let mut b = Builder::new();
    b.declare_kernel(iface, ExecConfig::new(HW, 128, 16), cset).unwrap();
    b
}

/// Variable of argument `name` as an expression.
pub fn arg(iface: &KernelIface, name: &str) -> Expr {
    iface.find_arg(name).unwrap().expr()
}

/// Column-major tile of `A` at the matrix origin.
pub fn a_tile(b: &Builder, tile: Tile) -> GlobalTensor {
    GlobalTensor {
        buffer: b.arg("A").unwrap(),
        dtype: DType::F32,
        base_offset: Expr::int(0),
        idxs: DimMap::from([(Dim::M, Expr::int(0)), (Dim::K, Expr::int(0))]),
        strides: DimMap::from([(Dim::M, Expr::int(1)), (Dim::K, b.arg("lda").unwrap())]),
        sizes: DimMap::from([(Dim::M, b.arg("m").unwrap()), (Dim::K, b.arg("k").unwrap())]),
        tile,
    }
}

pub fn sends(stmt: &Stmt) -> Vec<&SendStmt> {
    let mut out = Vec::new();
    walk(stmt, &mut |s| {
        if let Stmt::Send(send) = s {
            out.push(send);
        }
    });
    out
}

pub fn count_ifs(stmt: &Stmt) -> usize {
    count(stmt, |s| matches!(s, Stmt::If { .. }))
}

pub fn count_whiles(stmt: &Stmt) -> usize {
    count(stmt, |s| matches!(s, Stmt::While { .. }))
}

pub fn f32_problem() -> GemmProblem {
    GemmProblem::builder().ta(DType::F32).tb(DType::F32).tc(DType::F32).build()
}

/// 32x4 f32 tile, K unrolled by 64 with double-buffered 32-deep loads and
/// prefetches running 64 ahead.
pub fn pipelined_strategy() -> GemmStrategy {
    GemmStrategy::builder()
        .unroll_m(32)
        .unroll_n(4)
        .unroll_k(64)
        .ka_load(32)
        .kb_load(32)
        .a_copies(2)
        .b_copies(2)
        .ka_prefetch(32)
        .kb_prefetch(32)
        .prefetch_a(64)
        .prefetch_b(64)
        .systolic(false)
        .build()
}

pub fn pipelined(tile_k: i64, copies: i64, k_blk: i64, prefetch: i64) -> GemmStrategy {
    GemmStrategy::builder()
        .unroll_m(32)
        .unroll_n(4)
        .unroll_k(k_blk)
        .ka_load(tile_k)
        .kb_load(tile_k)
        .a_copies(copies)
        .b_copies(copies)
        .ka_prefetch(tile_k)
        .kb_prefetch(tile_k)
        .prefetch_a(prefetch)
        .prefetch_b(prefetch)
        .systolic(false)
        .build()
}

pub fn no_simplify() -> BuildConfig {
    BuildConfig::builder().simplify(false).build()
}

pub fn build(strategy: GemmStrategy) -> GemmBuild {
    let desc = GemmIrDesc::new(f32_problem(), strategy, HW);
    build_ir_with(&desc, ConstraintSet::new(), &no_simplify()).unwrap()
}
