//! End-to-end GEMM compilation through the handoff.

use enumset::EnumSet;
use tessel_ir::{ConstraintSet, DType, Hw};
use tessel_schedule::gemm::{GemmIrDesc, GemmProblem, GemmStrategy};
use tessel_schedule::BuildConfig;

use crate::error::Error;
use crate::types::{ArgAccess, ArgKind, Capability};
use crate::{compile_gemm, compile_gemm_with, scan_ir};

pub fn f32_desc() -> GemmIrDesc {
    let problem = GemmProblem::builder().ta(DType::F32).tb(DType::F32).tc(DType::F32).build();
    let strategy = GemmStrategy::builder()
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
        .build();
    GemmIrDesc::new(problem, strategy, Hw::XeHpc)
}

/// f16 inputs accumulated in f32 on the matrix engine.
pub fn systolic_desc() -> GemmIrDesc {
    let problem = GemmProblem::builder().ta(DType::F16).tb(DType::F16).tc(DType::F32).build();
    let strategy = GemmStrategy::builder().unroll_m(16).unroll_n(8).unroll_k(32).systolic(true).build();
    GemmIrDesc::new(problem, strategy, Hw::XeHpc)
}

#[test]
fn test_mad_kernel_manifest() {
    let kernel = compile_gemm(&f32_desc()).unwrap();
    let manifest = &kernel.manifest;

    assert_eq!(manifest.name, "gemm_kernel");
    assert_eq!(manifest.args.len(), 12);
    assert_eq!(manifest.capabilities, EnumSet::empty());
    assert_eq!((manifest.slm_bytes, manifest.thread_group_size), (0, 0));
    assert_eq!((manifest.regs, manifest.simd), (128, 16));

    let kind = |name: &str| manifest.find_arg(name).map(|a| a.kind.clone());
    assert_eq!(kind("A"), Some(ArgKind::GlobalPtr { access: ArgAccess::Stateless, mutable: false }));
    assert_eq!(kind("C"), Some(ArgKind::GlobalPtr { access: ArgAccess::Stateless, mutable: true }));
    assert_eq!(kind("offset_A"), Some(ArgKind::Scalar(DType::S64)));
    assert_eq!(kind("k"), Some(ArgKind::Scalar(DType::S32)));

    let scan = scan_ir(&kernel.body);
    assert!(scan.mads > 0);
    assert_eq!(scan.dpas, 0);
}

#[test]
fn test_systolic_kernel_requests_matrix_engine() {
    let kernel = compile_gemm(&systolic_desc()).unwrap();
    assert!(kernel.manifest.capabilities.contains(Capability::Systolic));
    assert!(scan_ir(&kernel.body).dpas > 0);
}

#[test]
fn test_fixed_thread_group_lands_in_manifest() {
    let mut desc = f32_desc();
    desc.strategy.wg = [8, 4, 1];
    desc.strategy.fixed_wg = true;
    let kernel = compile_gemm(&desc).unwrap();
    assert_eq!(kernel.manifest.thread_group_size, 32);
    assert_eq!(kernel.ctx.thread_group_size, 32);
}

#[test]
fn test_caller_constraints_are_kept() {
    let desc = f32_desc();
    let k = desc.kernel_iface().find_arg("k").unwrap().clone();
    let cset = ConstraintSet::new().with(k.expr().eq_(16));
    let config = BuildConfig::builder().simplify(true).build();

    let kernel = compile_gemm_with(&desc, cset, &config).unwrap();
    assert_eq!(kernel.constraints.single_value(&k).and_then(|v| v.as_int()), Some(16));
}

#[test]
fn test_schedule_errors_pass_through() {
    let mut desc = f32_desc();
    desc.strategy.persistent = true;
    let err = compile_gemm(&desc).unwrap_err();
    assert!(matches!(err, Error::Schedule { source: tessel_schedule::Error::Unsupported { .. } }));
    assert!(!err.is_contract_violation());
}
